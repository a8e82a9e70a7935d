use super::{EdgeId, NodePair, PathTree};
use crate::errors::PathError;

/// Recount every edge's frequency: the number of `paths` that cross it.
///
/// Counts restart from zero. A path that isn't in the tree is an error, and
/// leaves the existing counts untouched.
pub fn collect_frequencies<S: AsRef<str>>(
    tree: &mut PathTree,
    paths: &[S],
) -> Result<(), PathError> {
    let walks = paths
        .iter()
        .map(|path| tree.lookup(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    for pair in tree.nodes.iter_mut().flat_map(|node| node.children.iter_mut()) {
        pair.frequency = 0;
    }
    for edge in walks.into_iter().flatten() {
        tree.edge_mut(edge).frequency += 1;
    }

    Ok(())
}

/// Every edge, least frequent first, in the order the huffman builder wants
/// them. Ties go by name, then by edge id.
pub fn ordered_symbols(tree: &PathTree) -> Vec<(EdgeId, &NodePair)> {
    let mut symbols: Vec<_> = tree.edges().collect();
    symbols.sort_by(|(a_id, a), (b_id, b)| {
        a.frequency
            .cmp(&b.frequency)
            .then_with(|| a.name.cmp(&b.name))
            .then(a_id.cmp(b_id))
    });
    symbols
}
