//! Prefix-code tries.
//!
//! Leaves hold symbols, a `0` bit goes left and a `1` bit goes right. The
//! tries are built greedily from symbol weights, so frequent symbols end up
//! near the root with short codes.

mod code_map;

use std::{cmp::Reverse, collections::BinaryHeap, fmt::Debug};

use bitvec::prelude::*;
use tracing::debug;

pub use self::code_map::CodeMap;
use crate::errors::CodecError;

/// Bit strings, most significant bit first when packed into bytes.
pub type Bits = BitVec<u8, Msb0>;
pub type BitStr = BitSlice<u8, Msb0>;

/// Index of a [`HuffNode`] in its trie. Ids are handed out in creation
/// order: leaves first, in input order, then each merged node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HuffId(u32);

#[derive(Debug, Clone)]
pub struct HuffNode<T> {
    id: HuffId,
    weight: u64,
    /// Only leaves have a value.
    value: Option<T>,
    /// Only internal nodes have children, and always both.
    branches: Option<(HuffId, HuffId)>,
}

impl<T> HuffNode<T> {
    pub fn id(&self) -> HuffId {
        self.id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn left(&self) -> Option<HuffId> {
        self.branches.map(|(left, _)| left)
    }

    pub fn right(&self) -> Option<HuffId> {
        self.branches.map(|(_, right)| right)
    }

    pub fn is_leaf(&self) -> bool {
        self.branches.is_none()
    }

    fn branch(&self, bit: bool) -> Option<HuffId> {
        self.branches.map(|(left, right)| if bit { right } else { left })
    }
}

#[derive(Debug, Clone)]
pub struct HuffmanTrie<T> {
    nodes: Vec<HuffNode<T>>,
    root: Option<HuffId>,
}

/// Build a trie over `(weight, value)` symbols. Values should be distinct.
///
/// The two lightest pending nodes are merged until one is left. Among equal
/// weights the node created first is taken first, and the first node taken
/// becomes the left child. Leaves are created in input order, before any
/// merged node, so the same input always gives the same trie.
pub fn build_trie<T>(symbols: impl IntoIterator<Item = (u64, T)>) -> HuffmanTrie<T> {
    let mut nodes = vec![];
    let mut pending = BinaryHeap::new();

    for (weight, value) in symbols {
        let id = HuffId(nodes.len() as u32);
        nodes.push(HuffNode {
            id,
            weight,
            value: Some(value),
            branches: None,
        });
        pending.push(Reverse((weight, id)));
    }
    let leaves = nodes.len();

    let root = loop {
        let Some(Reverse((left_weight, left))) = pending.pop() else {
            break None;
        };
        let Some(Reverse((right_weight, right))) = pending.pop() else {
            break Some(left);
        };

        let id = HuffId(nodes.len() as u32);
        let weight = left_weight + right_weight;
        nodes.push(HuffNode {
            id,
            weight,
            value: None,
            branches: Some((left, right)),
        });
        pending.push(Reverse((weight, id)));
    };

    debug!(symbols = leaves, nodes = nodes.len(), "built huffman trie");
    HuffmanTrie { nodes, root }
}

impl<T> HuffmanTrie<T> {
    pub fn root(&self) -> Option<&HuffNode<T>> {
        self.root.map(|id| self.node(id))
    }

    pub fn node(&self, id: HuffId) -> &HuffNode<T> {
        &self.nodes[id.0 as usize]
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.leaves().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &HuffNode<T>> + '_ {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    /// Decode the symbol whose code is exactly `bits`.
    ///
    /// Running out of bits above a leaf and reaching a leaf with bits to spare
    /// are both errors. In a one-symbol trie the only code is the empty one.
    pub fn find_value_by_bits(&self, bits: &BitStr) -> Result<&T, CodecError> {
        let mut at = self.root().ok_or(CodecError::EmptyTrie)?;
        for (consumed, bit) in bits.iter().by_vals().enumerate() {
            match at.branch(bit) {
                Some(next) => at = self.node(next),
                None => {
                    let remaining = bits.len() - consumed;
                    return Err(CodecError::TrailingBits { remaining });
                }
            }
        }

        at.value().ok_or(CodecError::Truncated {
            consumed: bits.len(),
        })
    }

    /// Decode one symbol from the front of `bits`, for reading codes that
    /// were written back to back. Returns the symbol and how many bits its
    /// code took.
    pub fn decode_prefix(&self, bits: &BitStr) -> Result<(&T, usize), CodecError> {
        let mut at = self.root().ok_or(CodecError::EmptyTrie)?;
        let mut consumed = 0;
        loop {
            if let Some(value) = at.value() {
                return Ok((value, consumed));
            }
            let bit = bits
                .get(consumed)
                .map(|bit| *bit)
                .ok_or(CodecError::Truncated { consumed })?;
            // Internal nodes always have both branches.
            at = match at.branch(bit) {
                Some(next) => self.node(next),
                None => return Err(CodecError::Truncated { consumed }),
            };
            consumed += 1;
        }
    }
}

impl<T: PartialEq + Debug> HuffmanTrie<T> {
    /// The code for `value`: the left/right turns from the root to its leaf.
    pub fn find_huff_path(&self, value: &T) -> Result<Bits, CodecError> {
        let unknown = || CodecError::UnknownSymbol(format!("{value:?}"));
        let root = self.root.ok_or_else(unknown)?;

        let mut stack = vec![(root, Bits::new())];
        while let Some((id, path)) = stack.pop() {
            let node = self.node(id);
            match node.branches {
                None if node.value.as_ref() == Some(value) => return Ok(path),
                None => continue,
                Some((left, right)) => {
                    let mut right_path = path.clone();
                    right_path.push(true);
                    stack.push((right, right_path));
                    let mut left_path = path;
                    left_path.push(false);
                    stack.push((left, left_path));
                }
            }
        }

        Err(unknown())
    }
}
