use std::sync::Arc;

use crate::{
    geometry::{Triangle, WorldBox, WorldPoint},
    scene::Primitive,
};

use super::BuildError;

/// Vertex position padded to 16 bytes.
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) struct BuildVertex {
    pub position: WorldPoint,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) struct BuildTriangle {
    /// Indices into the flat vertex buffer
    pub vertices: Triangle<u32>,
    pub primitive: u32,
    pub triangle: u32,
    pub alpha_tested: bool,
}

/// Flat copy of all scene triangles.
#[derive(Debug, Default)]
pub(super) struct BuildGeometry {
    pub vertices: Vec<BuildVertex>,
    pub triangles: Vec<BuildTriangle>,
}

impl BuildGeometry {
    pub fn extract(primitives: &[Arc<dyn Primitive>]) -> Result<BuildGeometry, BuildError> {
        let vertex_count: usize = primitives.iter().map(|p| p.vertex_count()).sum();
        let triangle_count: usize = primitives.iter().map(|p| p.triangle_count()).sum();
        if vertex_count > u32::MAX as usize || triangle_count > u32::MAX as usize {
            return Err(BuildError::TooManyTriangles {
                vertex_count,
                triangle_count,
            });
        }

        let mut ret = BuildGeometry {
            vertices: Vec::with_capacity(vertex_count),
            triangles: Vec::with_capacity(triangle_count),
        };

        for (primitive_index, primitive) in primitives.iter().enumerate() {
            let positions = primitive.positions();
            let base = ret.vertices.len() as u32;

            for (triangle_index, indices) in primitive.indices().iter().enumerate() {
                if let Some(&vertex) = indices.iter().find(|i| **i as usize >= positions.len()) {
                    return Err(BuildError::InvalidVertexIndex {
                        primitive: primitive_index,
                        triangle: triangle_index,
                        vertex,
                        vertex_count: positions.len(),
                    });
                }

                if !indices.map(|i| positions[*i as usize]).is_finite() {
                    log::warn!(
                        "Skipping triangle {triangle_index} of primitive {primitive_index} with non-finite vertices"
                    );
                    continue;
                }

                ret.triangles.push(BuildTriangle {
                    vertices: indices.map(|i| base + i),
                    primitive: primitive_index as u32,
                    triangle: triangle_index as u32,
                    alpha_tested: primitive.is_alpha_tested(triangle_index),
                });
            }

            ret.vertices
                .extend(positions.iter().map(|&position| BuildVertex { position }));
        }

        Ok(ret)
    }

    pub fn triangle(&self, triangle: &BuildTriangle) -> Triangle<WorldPoint> {
        triangle
            .vertices
            .map(|i| self.vertices[*i as usize].position)
    }

    pub fn bounding_box(&self, triangle: &BuildTriangle) -> WorldBox {
        self.triangle(triangle).bounding_box()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::TriangleMesh;

    use assert2::{assert, let_assert};

    fn single_triangle(offset: f32) -> TriangleMesh {
        TriangleMesh::new(
            vec![
                WorldPoint::new(offset, 0.0, 0.0),
                WorldPoint::new(offset + 1.0, 0.0, 0.0),
                WorldPoint::new(offset, 1.0, 0.0),
            ],
            vec![Triangle::new(0, 1, 2)],
        )
    }

    #[test]
    fn vertices_get_base_offsets() {
        let primitives: Vec<Arc<dyn Primitive>> = vec![
            Arc::new(single_triangle(0.0)),
            Arc::new(single_triangle(5.0)),
        ];
        let geometry = BuildGeometry::extract(&primitives).unwrap();

        assert!(geometry.vertices.len() == 6);
        assert!(geometry.triangles.len() == 2);
        assert!(geometry.triangles[1].vertices == Triangle::new(3, 4, 5));
        assert!(geometry.triangles[1].primitive == 1);
        assert!(geometry.triangles[1].triangle == 0);
        assert!(geometry.triangle(&geometry.triangles[1])[0] == WorldPoint::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn empty_input() {
        let geometry = BuildGeometry::extract(&[]).unwrap();
        assert!(geometry.vertices.is_empty());
        assert!(geometry.triangles.is_empty());
    }

    #[test]
    fn out_of_range_index_rejected() {
        let mesh = TriangleMesh::new(
            single_triangle(0.0).positions().to_vec(),
            vec![Triangle::new(0, 1, 2), Triangle::new(0, 1, 3)],
        );
        let primitives: Vec<Arc<dyn Primitive>> = vec![Arc::new(mesh)];

        let_assert!(
            Err(BuildError::InvalidVertexIndex {
                primitive: 0,
                triangle: 1,
                vertex: 3,
                vertex_count: 3
            }) = BuildGeometry::extract(&primitives)
        );
    }

    #[test]
    fn non_finite_triangles_skipped() {
        let mesh = TriangleMesh::new(
            vec![
                WorldPoint::new(0.0, 0.0, 0.0),
                WorldPoint::new(1.0, 0.0, 0.0),
                WorldPoint::new(0.0, 1.0, 0.0),
                WorldPoint::new(f32::NAN, 1.0, 0.0),
            ],
            vec![Triangle::new(0, 1, 3), Triangle::new(0, 1, 2)],
        );
        let primitives: Vec<Arc<dyn Primitive>> = vec![Arc::new(mesh)];
        let geometry = BuildGeometry::extract(&primitives).unwrap();

        assert!(geometry.triangles.len() == 1);
        assert!(geometry.triangles[0].triangle == 1);
    }

    #[test]
    fn alpha_flag_copied() {
        let primitives: Vec<Arc<dyn Primitive>> = vec![
            Arc::new(single_triangle(0.0)),
            Arc::new(single_triangle(2.0).with_alpha_mask(|_| true)),
        ];
        let geometry = BuildGeometry::extract(&primitives).unwrap();

        assert!(!geometry.triangles[0].alpha_tested);
        assert!(geometry.triangles[1].alpha_tested);
    }

    #[test]
    fn build_vertex_layout() {
        assert!(std::mem::size_of::<BuildVertex>() == 16);
        assert!(std::mem::align_of::<BuildVertex>() == 16);
    }
}
