use index_vec::{IndexSlice, IndexVec};

use super::{
    BuildNodeIdx, Node, NodeIdx,
    building::{BuildNode, BuildTree},
};

/// Flattens the build tree into a depth first node array.
/// Empty tree gives an empty array.
pub(super) fn linearize(tree: &BuildTree, parallel_threshold: usize) -> IndexVec<NodeIdx, Node> {
    let Some(root) = &tree.root else {
        return IndexVec::new();
    };

    let mut nodes = vec![Node::default(); root.node_count];
    linearize_recursive(&tree.nodes, root.node, 0, &mut nodes, parallel_threshold);
    IndexVec::from_vec(nodes)
}

/// Writes the subtree rooted in `node` to `out`, which must be exactly the size of the subtree.
/// `base` is the index of `out[0]` in the final array.
fn linearize_recursive(
    build_nodes: &IndexSlice<BuildNodeIdx, [BuildNode]>,
    node: BuildNodeIdx,
    base: usize,
    out: &mut [Node],
    parallel_threshold: usize,
) {
    let subtree_size = out.len();
    let [head, rest @ ..] = out else {
        return;
    };

    match &build_nodes[node] {
        BuildNode::Leaf {
            groups,
            triangle_count,
        } => {
            assert2::debug_assert!(rest.is_empty());
            *head = Node::leaf(groups.start, *triangle_count);
        }
        BuildNode::Inner {
            child_bounds,
            children,
            first_subtree_size,
        } => {
            let first_size = *first_subtree_size as usize;
            *head = Node::inner(child_bounds, base + 1 + first_size);

            let (first, second) = rest.split_at_mut(first_size);
            let first_base = base + 1;
            let second_base = first_base + first_size;

            if subtree_size >= parallel_threshold {
                rayon::join(
                    || {
                        linearize_recursive(
                            build_nodes,
                            children[0],
                            first_base,
                            first,
                            parallel_threshold,
                        )
                    },
                    || {
                        linearize_recursive(
                            build_nodes,
                            children[1],
                            second_base,
                            second,
                            parallel_threshold,
                        )
                    },
                );
            } else {
                linearize_recursive(
                    build_nodes,
                    children[0],
                    first_base,
                    first,
                    parallel_threshold,
                );
                linearize_recursive(
                    build_nodes,
                    children[1],
                    second_base,
                    second,
                    parallel_threshold,
                );
            }
        }
    }
}
