use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
};

use tracing::debug;

use crate::{
    errors::{CodecError, Error, PayloadError, Result},
    huffman::{build_trie, BitStr, Bits, CodeMap, HuffmanTrie},
    path_tree::{build_tree, ordered_symbols, EdgeId, PathTree, SEPARATOR},
    payload,
};

/// One entry from the content catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub id: String,
    /// Absolute, `/`-separated.
    pub path: String,
}

impl Content {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// A content path as a string of edge codes.
///
/// Carries the number of edges so a trie with one symbol, whose only code
/// is empty, still decodes to the right depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCode {
    bits: Bits,
    symbols: usize,
}

impl ContentCode {
    pub fn new(bits: Bits, symbols: usize) -> Self {
        Self { bits, symbols }
    }

    pub fn bits(&self) -> &BitStr {
        &self.bits
    }

    /// How many edge codes are in `bits`.
    pub fn symbols(&self) -> usize {
        self.symbols
    }

    /// Length in bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

impl Display for ContentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits.iter().by_vals() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Path DAG, edge-code trie and per-content code table for one content set.
///
/// Immutable once built; only good for the content set it was built from.
#[derive(Debug, Clone)]
pub struct Dictionary {
    tree: PathTree,
    trie: HuffmanTrie<EdgeId>,
    codes: CodeMap<EdgeId>,
    table: BTreeMap<String, ContentCode>,
}

impl Dictionary {
    pub fn build(contents: &[Content]) -> Result<Self> {
        let mut ids = BTreeSet::new();
        if let Some(dup) = contents.iter().find(|c| !ids.insert(c.id.as_str())) {
            return Err(Error::DuplicateContent(dup.id.clone()));
        }

        let paths: Vec<&str> = contents.iter().map(|c| c.path.as_str()).collect();
        let tree = build_tree(&paths)?;

        let trie = build_trie(
            ordered_symbols(&tree)
                .into_iter()
                .map(|(edge, pair)| (pair.frequency(), edge)),
        );
        let codes = CodeMap::from_trie(&trie);

        let mut table = BTreeMap::new();
        for content in contents {
            let edges = tree.lookup(&content.path)?;
            let bits = codes.encode_string(&edges)?;
            table.insert(content.id.clone(), ContentCode::new(bits, edges.len()));
        }

        let dictionary = Self {
            tree,
            trie,
            codes,
            table,
        };
        debug!(
            contents = contents.len(),
            symbols = dictionary.codes.len(),
            encoded_bits = dictionary.encoded_bits(),
            "built content dictionary"
        );
        Ok(dictionary)
    }

    pub fn tree(&self) -> &PathTree {
        &self.tree
    }

    pub fn trie(&self) -> &HuffmanTrie<EdgeId> {
        &self.trie
    }

    /// The code for content `id`.
    pub fn code(&self, id: &str) -> Result<&ContentCode, CodecError> {
        self.table
            .get(id)
            .ok_or_else(|| CodecError::UnknownContent(id.to_owned()))
    }

    /// The whole code table, by content id.
    pub fn codes(&self) -> impl Iterator<Item = (&str, &ContentCode)> + '_ {
        self.table.iter().map(|(id, code)| (id.as_str(), code))
    }

    /// Total length of every code in the table. The certificate writer uses
    /// this to decide whether the coded form fits.
    pub fn encoded_bits(&self) -> usize {
        self.table.values().map(ContentCode::len).sum()
    }

    /// Code any path the tree contains, whether or not it was an input.
    pub fn encode_path(&self, path: &str) -> Result<ContentCode> {
        let edges = self.tree.lookup(path)?;
        let bits = self.codes.encode_string(&edges)?;
        Ok(ContentCode::new(bits, edges.len()))
    }

    /// Turn a code back into its content path.
    pub fn decode(&self, code: &ContentCode) -> Result<String, CodecError> {
        let mut at = self.tree.root();
        let mut rest = code.bits();
        let mut path = String::new();

        for _ in 0..code.symbols {
            let offset = code.len() - rest.len();
            let (&edge, used) = self.trie.decode_prefix(rest).map_err(|e| match e {
                CodecError::Truncated { consumed } => CodecError::Truncated {
                    consumed: offset + consumed,
                },
                e => e,
            })?;
            if edge.from() != at {
                return Err(CodecError::BrokenPath {
                    node: at.0,
                    edge: edge.to_string(),
                });
            }

            let pair = self.tree.edge(edge);
            path.push(SEPARATOR);
            path.push_str(pair.name());
            at = pair.connection();
            rest = &rest[used..];
        }

        if !rest.is_empty() {
            return Err(CodecError::TrailingBits {
                remaining: rest.len(),
            });
        }
        if path.is_empty() {
            path.push(SEPARATOR);
        }
        Ok(path)
    }

    /// The packed payload for this dictionary's tree.
    pub fn payload(&self) -> Result<Vec<u8>, PayloadError> {
        payload::pack(&self.tree)
    }
}
