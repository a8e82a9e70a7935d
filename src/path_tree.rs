//! The shared path DAG.
//!
//! Every content path is a chain of labelled edges hanging off a single root.
//! Prefixes are shared by construction; after the builder's merge pass,
//! structurally identical suffixes are shared too, so one node can have many
//! parents. Nodes live in an arena and refer to each other by [`NodeId`].

mod builder;
mod frequency;

use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt::{self, Display},
};

pub use self::builder::build_tree;
pub use self::frequency::{collect_frequencies, ordered_symbols};
use crate::errors::PathError;

pub const SEPARATOR: char = '/';

/// Index of a [`PathNode`] in its [`PathTree`].
///
/// Two connections point at "the same node" iff their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names one edge: the `slot`th child of node `from`.
///
/// Children never move once the tree is built, so this is stable for the
/// tree's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId {
    from: NodeId,
    slot: u32,
}

impl EdgeId {
    pub fn from(self) -> NodeId {
        self.from
    }

    pub fn slot(self) -> usize {
        self.slot as usize
    }
}

impl Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.from, self.slot)
    }
}

/// A labelled edge, pointing at the node reached by following `name`.
#[derive(Debug, Clone)]
pub struct NodePair {
    name: String,
    connection: NodeId,
    /// How many input paths cross this edge.
    frequency: u64,
}

impl NodePair {
    pub(crate) fn new(name: impl Into<String>, connection: NodeId) -> Self {
        Self {
            name: name.into(),
            connection,
            frequency: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> NodeId {
        self.connection
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Compare against a pair that may be missing.
    ///
    /// There's no sensible place to sort a missing pair, so that's an error
    /// rather than `None`.
    pub fn try_cmp(&self, other: Option<&NodePair>) -> Result<Ordering, PathError> {
        other
            .map(|other| self.cmp(other))
            .ok_or(PathError::MissingComparand)
    }
}

impl PartialEq for NodePair {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.connection == other.connection
    }
}

impl Eq for NodePair {}

impl Ord for NodePair {
    /// By name. Siblings never share a name, so the connection only breaks
    /// ties between pairs taken from different parents.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then(self.connection.cmp(&other.connection))
    }
}

impl PartialOrd for NodePair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct PathNode {
    id: NodeId,
    /// Sorted by name, no duplicate names.
    children: Vec<NodePair>,
}

impl PathNode {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn children(&self) -> &[NodePair] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&NodePair> {
        self.slot(name).ok().map(|slot| &self.children[slot])
    }

    /// `Ok(slot)` of the child called `name`, or `Err(slot)` where it would go.
    fn slot(&self, name: &str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|pair| pair.name.as_str().cmp(name))
    }
}

/// Arena of [`PathNode`]s. The root is always node 0.
#[derive(Debug, Clone)]
pub struct PathTree {
    nodes: Vec<PathNode>,
}

impl PathTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![PathNode::new(NodeId(0))],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut PathNode {
        &mut self.nodes[id.index()]
    }

    fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PathNode::new(id));
        id
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no path got past the root.
    pub fn is_empty(&self) -> bool {
        self.node(self.root()).is_leaf()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PathNode> + '_ {
        self.nodes.iter()
    }

    pub fn edge(&self, edge: EdgeId) -> &NodePair {
        &self.node(edge.from).children[edge.slot()]
    }

    fn edge_mut(&mut self, edge: EdgeId) -> &mut NodePair {
        &mut self.node_mut(edge.from).children[edge.slot()]
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &NodePair)> + '_ {
        self.nodes.iter().flat_map(|node| {
            node.children.iter().enumerate().map(move |(slot, pair)| {
                let id = EdgeId {
                    from: node.id,
                    slot: slot as u32,
                };
                (id, pair)
            })
        })
    }

    /// Follow `segments` from the root, returning the edges crossed, or
    /// `None` if some segment has no edge.
    pub fn walk<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Option<Vec<EdgeId>> {
        let mut at = self.root();
        let mut edges = vec![];
        for segment in segments {
            let slot = self.node(at).slot(segment).ok()?;
            let edge = EdgeId {
                from: at,
                slot: slot as u32,
            };
            at = self.edge(edge).connection;
            edges.push(edge);
        }
        Some(edges)
    }

    /// Like [`walk`](Self::walk), for a whole content path.
    pub fn lookup(&self, path: &str) -> Result<Vec<EdgeId>, PathError> {
        let segments = split_path(path)?;
        self.walk(segments)
            .ok_or_else(|| PathError::NotInTree(path.to_owned()))
    }

    /// Structural equivalence: same child names, and children with the same
    /// name lead to equivalent nodes. Node ids and child order don't matter.
    ///
    /// Iterative, so deep hierarchies can't overflow the stack. Each pair of
    /// nodes is compared at most once, which keeps shared subtrees cheap.
    pub fn is_equivalent_to(&self, a: NodeId, b: NodeId) -> bool {
        let mut pending = vec![(a, b)];
        let mut seen = BTreeSet::new();

        while let Some((a, b)) = pending.pop() {
            if a == b || !seen.insert((a, b)) {
                continue;
            }

            let (a, b) = (self.node(a), self.node(b));
            if a.children.len() != b.children.len() {
                return false;
            }
            for pair in &a.children {
                match b.child(&pair.name) {
                    Some(other) => pending.push((pair.connection, other.connection)),
                    None => return false,
                }
            }
        }

        true
    }
}

impl Display for PathTree {
    /// One line per node visit, indented by depth. Shared nodes are printed
    /// under every parent.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root(), 0)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            write!(f, "{:indent$}node [{}]", "", id, indent = depth * 2)?;
            for pair in &node.children {
                write!(f, " v [{} {{{}}} x{}]", pair.name, pair.connection, pair.frequency)?;
            }
            writeln!(f)?;
            for pair in node.children.iter().rev() {
                stack.push((pair.connection, depth + 1));
            }
        }
        Ok(())
    }
}

/// Split an absolute content path into its segments.
///
/// `"/"` alone is the root and has no segments. A single trailing separator is
/// ignored; any other empty segment is an error.
pub fn split_path(path: &str) -> Result<Vec<&str>, PathError> {
    let Some(body) = path.strip_prefix(SEPARATOR) else {
        return Err(PathError::NotAbsolute(path.to_owned()));
    };
    if body.is_empty() {
        return Ok(vec![]);
    }

    let body = body.strip_suffix(SEPARATOR).unwrap_or(body);
    let segments: Vec<&str> = body.split(SEPARATOR).collect();
    match segments.iter().position(|s| s.is_empty()) {
        Some(index) => Err(PathError::EmptySegment {
            path: path.to_owned(),
            index,
        }),
        None => Ok(segments),
    }
}
