use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::{collect_frequencies, split_path, NodeId, NodePair, PathNode, PathTree};
use crate::errors::PathError;

/// Build the shared path DAG for a set of absolute content paths.
///
/// Every path is validated before anything is inserted. Duplicate paths add
/// no structure but still count towards edge frequencies.
pub fn build_tree<S: AsRef<str>>(paths: &[S]) -> Result<PathTree, PathError> {
    let split = paths
        .iter()
        .map(|path| split_path(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut trie = PathTree::new();
    for segments in &split {
        insert(&mut trie, segments);
    }
    let before = trie.len();

    let mut tree = merge_suffixes(trie);
    debug!(
        paths = paths.len(),
        nodes_before = before,
        nodes_after = tree.len(),
        "built path tree"
    );

    collect_frequencies(&mut tree, paths)?;
    trace!("path tree:\n{tree}");

    Ok(tree)
}

/// Walk down from the root, reusing edges that already exist.
fn insert(tree: &mut PathTree, segments: &[&str]) {
    let mut at = tree.root();
    for &segment in segments {
        at = match tree.node(at).slot(segment) {
            Ok(slot) => tree.node(at).children[slot].connection,
            Err(slot) => {
                let next = tree.add_node();
                let pair = NodePair::new(segment, next);
                tree.node_mut(at).children.insert(slot, pair);
                next
            }
        };
    }
}

/// Collapse structurally equivalent nodes into one, turning the prefix trie
/// into a DAG that shares suffixes as well.
///
/// Nodes are visited by height, leaves first: by the time a node is looked
/// at, its children already point at their representatives, so two nodes are
/// equivalent exactly when their `(name, connection)` lists are equal. The
/// representative of a group is its lowest id.
fn merge_suffixes(mut tree: PathTree) -> PathTree {
    // Insertion only ever allocates a child after its parent, so a reverse
    // scan sees every child before its parent.
    let mut height = vec![0usize; tree.len()];
    for node in tree.nodes.iter().rev() {
        height[node.id.index()] = node
            .children
            .iter()
            .map(|pair| height[pair.connection.index()] + 1)
            .max()
            .unwrap_or(0);
    }

    let tallest = height.iter().copied().max().unwrap_or(0);
    let mut levels = vec![vec![]; tallest + 1];
    for (index, &h) in height.iter().enumerate() {
        levels[h].push(NodeId(index as u32));
    }

    let mut canonical: Vec<NodeId> = (0..tree.len() as u32).map(NodeId).collect();
    for level in levels {
        let mut reps: BTreeMap<Vec<(String, NodeId)>, NodeId> = BTreeMap::new();
        for id in level {
            for pair in &mut tree.node_mut(id).children {
                pair.connection = canonical[pair.connection.index()];
            }

            let key = tree
                .node(id)
                .children
                .iter()
                .map(|p| (p.name.clone(), p.connection))
                .collect();
            let rep = *reps.entry(key).or_insert(id);
            if rep != id {
                trace!(node = %id, into = %rep, "merging equivalent node");
                canonical[id.index()] = rep;
            }
        }
    }

    compact(&tree)
}

/// Copy out the nodes still reachable from the root, renumbered densely in
/// their original order.
fn compact(tree: &PathTree) -> PathTree {
    let mut reachable = vec![false; tree.len()];
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut reachable[id.index()], true) {
            continue;
        }
        stack.extend(tree.node(id).children.iter().map(|p| p.connection));
    }

    let mut renumber = vec![None; tree.len()];
    let mut next = 0;
    for (index, &keep) in reachable.iter().enumerate() {
        if keep {
            renumber[index] = Some(NodeId(next));
            next += 1;
        }
    }

    let nodes = tree
        .nodes
        .iter()
        .filter_map(|node| {
            let id = renumber[node.id.index()]?;
            let children = node
                .children
                .iter()
                .filter_map(|pair| {
                    let connection = renumber[pair.connection.index()]?;
                    Some(NodePair::new(pair.name.clone(), connection))
                })
                .collect();
            Some(PathNode { id, children })
        })
        .collect();

    PathTree { nodes }
}
