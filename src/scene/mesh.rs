use std::{f32::consts::PI, fs, path::Path, sync::Arc};

use indexmap::IndexMap;
use nalgebra::{Affine3, Matrix3};
use thiserror::Error;

use super::Primitive;
use crate::geometry::{
    BarycentricCoordinates, FloatType, TexturePoint, Triangle, WorldPoint, WorldVector,
};

/// Returns true where the surface is opaque.
pub type AlphaMask = Arc<dyn Fn(TexturePoint) -> bool + Send + Sync>;

/// Indexed triangle mesh with optional per-vertex normals and texture coordinates.
#[derive(Clone, Default)]
pub struct TriangleMesh {
    positions: Vec<WorldPoint>,
    /// Either empty or one per vertex. Zero vectors mark missing normals.
    normals: Vec<WorldVector>,
    /// Either empty or one per vertex.
    texture_coords: Vec<TexturePoint>,
    indices: Vec<Triangle<u32>>,
    alpha_mask: Option<AlphaMask>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<WorldPoint>, indices: Vec<Triangle<u32>>) -> Self {
        TriangleMesh {
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<WorldVector>) -> Self {
        assert2::assert!(normals.len() == self.positions.len());
        self.normals = normals;
        self
    }

    pub fn with_texture_coords(mut self, texture_coords: Vec<TexturePoint>) -> Self {
        assert2::assert!(texture_coords.len() == self.positions.len());
        self.texture_coords = texture_coords;
        self
    }

    /// Marks every triangle of the mesh as alpha tested with the given mask.
    pub fn with_alpha_mask(
        mut self,
        mask: impl Fn(TexturePoint) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.alpha_mask = Some(Arc::new(mask));
        self
    }

    pub fn load_obj(p: impl AsRef<Path>) -> Result<TriangleMesh, ObjOpenError> {
        let content = fs::read_to_string(p)?;
        Self::parse_obj(content)
    }

    pub fn parse_obj(content: impl Into<String>) -> Result<TriangleMesh, ObjOpenError> {
        let parsed = wavefront_obj::obj::parse::<String>(content.into())?;
        Ok(Self::from_obj_set(parsed))
    }

    /// Merges all objects of the set into one mesh.
    /// Vertices are deduplicated by their (position, texture, normal) index triple.
    fn from_obj_set(obj: wavefront_obj::obj::ObjSet) -> TriangleMesh {
        let mut indices = Vec::new();
        let mut vertices = IndexMap::new();
        let mut has_normals = false;
        let mut has_texture_coords = false;

        for (object_index, o) in obj.objects.iter().enumerate() {
            has_normals |= !o.normals.is_empty();
            has_texture_coords |= !o.tex_vertices.is_empty();

            for geometry in &o.geometry {
                for shape in &geometry.shapes {
                    let wavefront_obj::obj::Primitive::Triangle(a, b, c) = shape.primitive else {
                        log::warn!("Skipping non-triangle shape in object {:?}", o.name);
                        continue;
                    };

                    let mut handle_vertex = |vtindex: (usize, Option<usize>, Option<usize>)| {
                        let entry = vertices.entry((object_index, vtindex));
                        let index = entry.index();
                        entry.or_insert_with(|| {
                            let vertex = &o.vertices[vtindex.0];
                            let tex_vertex = vtindex.1.map(|i| &o.tex_vertices[i]);
                            let normal = vtindex.2.map(|i| &o.normals[i]);
                            (
                                WorldPoint::new(vertex.x as f32, vertex.y as f32, vertex.z as f32),
                                normal.map_or_else(WorldVector::zeros, |v| {
                                    WorldVector::new(v.x as f32, v.y as f32, v.z as f32)
                                        .normalize()
                                }),
                                tex_vertex.map_or_else(TexturePoint::origin, |v| {
                                    TexturePoint::new(v.u as f32, v.v as f32)
                                }),
                            )
                        });
                        index as u32
                    };

                    let a = handle_vertex(a);
                    let b = handle_vertex(b);
                    let c = handle_vertex(c);

                    indices.push(Triangle::new(a, b, c));
                }
            }
        }

        let (positions, (normals, texture_coords)): (Vec<_>, (Vec<_>, Vec<_>)) = vertices
            .into_values()
            .map(|(pos, normal, tex)| (pos, (normal, tex)))
            .unzip();

        TriangleMesh {
            positions,
            normals: if has_normals { normals } else { Vec::new() },
            texture_coords: if has_texture_coords {
                texture_coords
            } else {
                Vec::new()
            },
            indices,
            alpha_mask: None,
        }
    }

    /// Generates a sphere tessellated along `segments` meridians and `rings` parallels.
    /// Poles are closed by triangle fans, so no triangle is degenerate.
    pub fn uv_sphere(center: WorldPoint, radius: FloatType, segments: u32, rings: u32) -> Self {
        assert2::assert!(segments >= 3);
        assert2::assert!(rings >= 2);
        assert2::assert!(radius > 0.0);

        let row = segments + 1;
        let mut positions = Vec::with_capacity((row * (rings + 1)) as usize);
        let mut normals = Vec::with_capacity(positions.capacity());
        let mut texture_coords = Vec::with_capacity(positions.capacity());

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = PI * v;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = 2.0 * PI * u;
                let normal = WorldVector::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                );
                positions.push(center + normal * radius);
                normals.push(normal);
                texture_coords.push(TexturePoint::new(u, v));
            }
        }

        let mut indices = Vec::with_capacity((segments * (2 * rings - 2)) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let i0 = ring * row + segment;
                let i1 = i0 + 1;
                let i2 = i0 + row;
                let i3 = i2 + 1;

                if ring != 0 {
                    indices.push(Triangle::new(i0, i1, i2));
                }
                if ring != rings - 1 {
                    indices.push(Triangle::new(i1, i3, i2));
                }
            }
        }

        TriangleMesh {
            positions,
            normals,
            texture_coords,
            indices,
            alpha_mask: None,
        }
    }

    /// Applies the transformation to vertex positions and normals.
    pub fn transform(mut self, transform: &Affine3<FloatType>) -> Self {
        for p in self.positions.iter_mut() {
            *p = transform * *p;
        }

        let linear: Matrix3<FloatType> = transform.matrix().fixed_view::<3, 3>(0, 0).into_owned();
        match linear.try_inverse() {
            Some(inverse) => {
                let normal_matrix = inverse.transpose();
                for n in self.normals.iter_mut() {
                    *n = (normal_matrix * *n).try_normalize(0.0).unwrap_or_default();
                }
            }
            None => self.normals.clear(),
        }

        self
    }

    pub fn normals(&self) -> &[WorldVector] {
        &self.normals
    }

    pub fn texture_coords(&self) -> &[TexturePoint] {
        &self.texture_coords
    }

    /// Texture coordinates of a point on a triangle.
    /// Meshes without texture coordinates use the barycentric coordinates directly.
    pub fn texture_coords_at(
        &self,
        triangle: usize,
        uv: &BarycentricCoordinates<FloatType>,
    ) -> TexturePoint {
        if self.texture_coords.is_empty() {
            return TexturePoint::new(uv.u, uv.v);
        }
        let tex = self.indices[triangle].map(|i| self.texture_coords[*i as usize].coords);
        uv.interpolate(&tex[0], &tex[1], &tex[2]).into()
    }
}

impl Primitive for TriangleMesh {
    fn positions(&self) -> &[WorldPoint] {
        &self.positions
    }

    fn indices(&self) -> &[Triangle<u32>] {
        &self.indices
    }

    fn is_alpha_tested(&self, _triangle: usize) -> bool {
        self.alpha_mask.is_some()
    }

    fn is_opaque_at(&self, triangle: usize, uv: &BarycentricCoordinates<FloatType>) -> bool {
        match &self.alpha_mask {
            Some(mask) => mask(self.texture_coords_at(triangle, uv)),
            None => true,
        }
    }
}

impl std::fmt::Debug for TriangleMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriangleMesh")
            .field("vertex_count", &self.positions.len())
            .field("triangle_count", &self.indices.len())
            .field("has_normals", &!self.normals.is_empty())
            .field("has_texture_coords", &!self.texture_coords.is_empty())
            .field("alpha_tested", &self.alpha_mask.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ObjOpenError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),
}
