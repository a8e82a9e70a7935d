use std::{collections::BTreeMap, fmt::Debug};

use super::{BitStr, Bits, HuffmanTrie};
use crate::errors::CodecError;

/// Every code in a trie, looked up once so encoding doesn't have to search
/// the trie for each symbol.
#[derive(Debug, Clone)]
pub struct CodeMap<T> {
    sym_to_code: BTreeMap<T, Bits>,
}

impl<T: Ord + Clone> CodeMap<T> {
    pub fn from_trie(trie: &HuffmanTrie<T>) -> Self {
        let mut sym_to_code = BTreeMap::new();

        let mut stack: Vec<_> = trie.root.map(|root| (root, Bits::new())).into_iter().collect();
        while let Some((id, code)) = stack.pop() {
            let node = trie.node(id);
            match (node.branches, &node.value) {
                (Some((left, right)), _) => {
                    let mut right_code = code.clone();
                    right_code.push(true);
                    stack.push((right, right_code));
                    let mut left_code = code;
                    left_code.push(false);
                    stack.push((left, left_code));
                }
                (None, Some(value)) => {
                    sym_to_code.insert(value.clone(), code);
                }
                (None, None) => unreachable!("huffman leaf without a value"),
            }
        }

        Self { sym_to_code }
    }

    pub fn len(&self) -> usize {
        self.sym_to_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sym_to_code.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &BitStr)> + '_ {
        self.sym_to_code
            .iter()
            .map(|(sym, code)| (sym, code.as_bitslice()))
    }
}

impl<T: Ord + Debug> CodeMap<T> {
    pub fn encode(&self, sym: &T) -> Result<&BitStr, CodecError> {
        self.sym_to_code
            .get(sym)
            .map(|code| code.as_bitslice())
            .ok_or_else(|| CodecError::UnknownSymbol(format!("{sym:?}")))
    }

    /// The codes for `syms`, back to back.
    pub fn encode_string(&self, syms: &[T]) -> Result<Bits, CodecError> {
        let mut bits = Bits::new();
        for sym in syms {
            bits.extend_from_bitslice(self.encode(sym)?);
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::build_trie;

    #[test]
    fn agrees_with_trie_search() {
        let trie = build_trie([(5u64, b'a'), (9, b'b'), (12, b'c'), (13, b'd'), (16, b'e'), (45, b'f')]);
        let map = CodeMap::from_trie(&trie);
        assert_eq!(map.len(), 6);

        for (sym, code) in map.iter() {
            assert_eq!(trie.find_huff_path(sym).unwrap().as_bitslice(), code);
        }

        // The heaviest symbol alone on one side of the root.
        assert_eq!(map.encode(&b'f').unwrap().len(), 1);
    }

    #[test]
    fn encode_string() {
        let trie = build_trie([(1u64, 'x'), (1, 'y'), (1, 'z')]);
        let map = CodeMap::from_trie(&trie);

        let bits = map.encode_string(&['x', 'z', 'y']).unwrap();
        let expected: Bits = [true, false, false, true, true].into_iter().collect();
        assert_eq!(bits, expected);

        assert_eq!(
            map.encode_string(&['x', 'q']),
            Err(CodecError::UnknownSymbol("'q'".into()))
        );
    }

    #[test]
    fn single_and_empty() {
        let map = CodeMap::from_trie(&build_trie([(3u64, 7u8)]));
        assert_eq!(map.encode(&7).unwrap().len(), 0);
        assert_eq!(map.encode_string(&[7, 7, 7]).unwrap().len(), 0);

        let map = CodeMap::from_trie(&build_trie::<u8>([]));
        assert!(map.is_empty());
    }
}
