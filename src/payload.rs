//! The packed content payload embedded in entitlement certificates.
//!
//! Layout:
//!
//! ```text
//! +------------------------+-------------+----------------------------+
//! | zlib(segment NUL ...)  | node count  | node table bits, MSB first |
//! +------------------------+-------------+----------------------------+
//! ```
//!
//! * Segment names are listed least used first. The string trie weighs the
//!   `i`th name (from 1) as `i`, plus an END token weighted one more than
//!   the last name.
//! * The node count is one byte up to 127. Past that it's `0x80 | n`
//!   followed by the count in `n` big-endian bytes.
//! * Nodes are listed by number of parents, then id, so the root comes
//!   first. The node trie weighs the node at position `p` as `p`, leaving out
//!   the root since nothing points at it.
//! * Each node is written as (name code, node code) per child, then END.
//!   The last byte is zero padded.
//!
//! Readers rebuild both tries from the listing order alone, so the weights
//! and the trie tie-break are part of the format.

mod zlib;

use std::collections::{BTreeMap, BTreeSet};

use bitvec::prelude::*;
use tracing::{debug, trace};

use crate::{
    errors::PayloadError,
    huffman::{build_trie, Bits, CodeMap, HuffmanTrie},
    path_tree::{NodeId, PathTree, SEPARATOR},
};

/// Largest node count that fits in the single-byte form.
const SHORT_COUNT_MAX: usize = 0x7f;
const LONG_COUNT_FLAG: u8 = 0x80;

/// Most paths [`unpack`] will produce before giving up.
pub const MAX_PATHS: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Token {
    /// Index into the segment table.
    Segment(usize),
    End,
}

fn string_trie(segments: usize) -> HuffmanTrie<Token> {
    let names = (0..segments).map(|i| (i as u64 + 1, Token::Segment(i)));
    let end = (segments as u64 + 1, Token::End);
    build_trie(names.chain([end]))
}

/// Position 0 is always the root and gets no code.
fn node_trie(count: usize) -> HuffmanTrie<usize> {
    build_trie((1..count).map(|p| (p as u64, p)))
}

/// Pack a path tree. An empty tree packs to an empty payload.
pub fn pack(tree: &PathTree) -> Result<Vec<u8>, PayloadError> {
    if tree.is_empty() {
        return Ok(vec![]);
    }

    let segments = order_segments(tree);
    let mut table = vec![];
    for name in &segments {
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }
    let mut out = zlib::compress(&table);

    let nodes = order_nodes(tree);
    write_count(&mut out, nodes.len());

    let segment_index: BTreeMap<&str, usize> =
        segments.iter().enumerate().map(|(i, &name)| (name, i)).collect();
    let position: BTreeMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .filter_map(|(p, node)| node.map(|id| (id, p)))
        .collect();

    let strings = CodeMap::from_trie(&string_trie(segments.len()));
    let targets = CodeMap::from_trie(&node_trie(nodes.len()));

    let mut bits = Bits::new();
    for node in &nodes {
        // Placeholders have no children.
        let children = node.map(|id| tree.node(id).children()).unwrap_or_default();
        for pair in children {
            let segment = Token::Segment(segment_index[pair.name()]);
            bits.extend_from_bitslice(strings.encode(&segment)?);
            bits.extend_from_bitslice(targets.encode(&position[&pair.connection()])?);
        }
        bits.extend_from_bitslice(strings.encode(&Token::End)?);
    }
    bits.set_uninitialized(false);
    out.extend_from_slice(&bits.into_vec());

    debug!(
        segments = segments.len(),
        nodes = nodes.len(),
        bytes = out.len(),
        "packed content payload"
    );
    trace!(payload = %hex::encode(&out));
    Ok(out)
}

/// Every distinct segment name, least used first. Use is counted once per
/// edge, so a name on a shared suffix counts once however many paths go
/// through it.
fn order_segments(tree: &PathTree) -> Vec<&str> {
    let mut uses: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, pair) in tree.edges() {
        *uses.entry(pair.name()).or_default() += 1;
    }

    let mut segments: Vec<_> = uses.into_iter().collect();
    segments.sort_by_key(|&(name, count)| (count, name));
    segments.into_iter().map(|(name, _)| name).collect()
}

/// All nodes, fewest parents first. `None` is a placeholder, added when the
/// tree has only two nodes so the node trie gets two leaves.
fn order_nodes(tree: &PathTree) -> Vec<Option<NodeId>> {
    let mut parents: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); tree.len()];
    for (edge, pair) in tree.edges() {
        parents[pair.connection().index()].insert(edge.from());
    }

    let mut nodes: Vec<_> = tree.nodes().map(|node| node.id()).collect();
    nodes.sort_by_key(|id| (parents[id.index()].len(), *id));

    let mut nodes: Vec<_> = nodes.into_iter().map(Some).collect();
    if nodes.len() == 2 {
        nodes.push(None);
    }
    nodes
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    if count <= SHORT_COUNT_MAX {
        out.push(count as u8);
        return;
    }

    let bytes = (count as u64).to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let significant = &bytes[start..];
    out.push(LONG_COUNT_FLAG | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn read_count(input: &mut &[u8]) -> Result<usize, PayloadError> {
    let (&first, rest) = input
        .split_first()
        .ok_or(PayloadError::UnexpectedEnd("node count"))?;
    *input = rest;
    if first & LONG_COUNT_FLAG == 0 {
        return Ok(first as usize);
    }

    let len = (first & !LONG_COUNT_FLAG) as usize;
    if len > std::mem::size_of::<usize>() {
        return Err(PayloadError::CountTooLarge(len));
    }
    if input.len() < len {
        return Err(PayloadError::UnexpectedEnd("node count"));
    }
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    Ok(bytes.iter().fold(0, |n, &b| (n << 8) | b as usize))
}

/// Unpack a payload into the paths it holds: every root-to-leaf path,
/// depth first, children in name order. At most [`MAX_PATHS`] of them.
pub fn unpack(payload: &[u8]) -> Result<Vec<String>, PayloadError> {
    unpack_with_limit(payload, MAX_PATHS)
}

/// [`unpack`], failing once the payload turns out to hold more than `limit`
/// paths.
pub fn unpack_with_limit(payload: &[u8], limit: usize) -> Result<Vec<String>, PayloadError> {
    if payload.is_empty() {
        return Ok(vec![]);
    }

    let (table, used) = zlib::decompress_prefix(payload)?;
    let mut pieces: Vec<&[u8]> = table.split(|&b| b == 0).collect();
    // The table ends with a NUL, which leaves an empty piece at the end.
    if pieces.last().is_some_and(|p| p.is_empty()) {
        pieces.pop();
    }
    let segments = pieces
        .into_iter()
        .map(|p| std::str::from_utf8(p).map_err(|_| PayloadError::BadSegment))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rest = &payload[used..];
    let count = read_count(&mut rest)?;
    let bits = rest.view_bits::<Msb0>();
    // Every node takes at least one bit, for its END.
    if count > bits.len() {
        return Err(PayloadError::UnexpectedEnd("node table"));
    }

    let strings = string_trie(segments.len());
    let targets = node_trie(count);

    let mut children: Vec<Vec<(usize, usize)>> = vec![vec![]; count];
    let mut has_parent = vec![false; count];
    let mut cursor = 0;
    for node in children.iter_mut() {
        loop {
            let (&token, used) = strings.decode_prefix(&bits[cursor..])?;
            cursor += used;
            let Token::Segment(segment) = token else {
                break;
            };

            let (&target, used) = targets.decode_prefix(&bits[cursor..])?;
            cursor += used;
            node.push((segment, target));
            has_parent[target] = true;
        }
    }

    let root = (0..count)
        .find(|&p| !has_parent[p] && !children[p].is_empty())
        .ok_or(PayloadError::NoRoot)?;

    let mut paths = vec![];
    let mut stack = vec![(root, String::new(), 0)];
    while let Some((p, path, depth)) = stack.pop() {
        // An acyclic table can't have a path longer than its node count.
        if depth > count {
            return Err(PayloadError::Cyclic);
        }
        if children[p].is_empty() {
            if paths.len() == limit {
                return Err(PayloadError::TooManyPaths { limit });
            }
            paths.push(path);
            continue;
        }
        for &(segment, target) in children[p].iter().rev() {
            let child = format!("{}{}{}", path, SEPARATOR, segments[segment]);
            stack.push((target, child, depth + 1));
        }
    }

    debug!(nodes = count, paths = paths.len(), "unpacked content payload");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::ZlibDecoder;
    use test_case::test_case;

    use super::*;
    use crate::path_tree::build_tree;

    fn packed(paths: &[&str]) -> Vec<u8> {
        pack(&build_tree(paths).unwrap()).unwrap()
    }

    fn sorted(mut paths: Vec<String>) -> Vec<String> {
        paths.sort();
        paths
    }

    #[test_case(5, &[5])]
    #[test_case(127, &[0x7f])]
    #[test_case(128, &[0x81, 0x80])]
    #[test_case(1102, &[0x82, 0x04, 0x4e])]
    #[test_case(70_000, &[0x83, 0x01, 0x11, 0x70])]
    fn node_count(count: usize, encoded: &[u8]) {
        let mut out = vec![];
        write_count(&mut out, count);
        assert_eq!(out, encoded);

        let mut input = encoded;
        assert_eq!(read_count(&mut input), Ok(count));
        assert!(input.is_empty());
    }

    #[test]
    fn node_count_truncated() {
        let mut input: &[u8] = &[0x82, 0x04];
        assert_eq!(
            read_count(&mut input),
            Err(PayloadError::UnexpectedEnd("node count"))
        );
    }

    #[test]
    fn node_count_too_wide() {
        let mut input: &[u8] = &[0x89, 0x01, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_count(&mut input), Err(PayloadError::CountTooLarge(9)));
    }

    #[test]
    fn segments_by_use() {
        let mut paths: Vec<String> = (0..20)
            .map(|i| format!("/head/neck/shoulders/heart{i}/waist{i}/leg/foot/heel"))
            .collect();
        paths.push("/head/neck/shoulders/chest/leg".into());
        paths.push("/head/neck/shoulders/chest/foot".into());
        paths.push("/head/neck/shoulders/chest/torso/leg".into());

        let tree = build_tree(&paths).unwrap();
        let segments = order_segments(&tree);
        assert_eq!(segments.len(), 48);
        assert_eq!(segments[46], "foot");
        assert_eq!(segments[47], "leg");
    }

    /// Small enough to work out by hand: names `a`=0 and END=1; the leaf at
    /// position 1 is `0` and the placeholder at 2 is `1`.
    #[test]
    fn single_path_layout() -> anyhow::Result<()> {
        let payload = packed(&["/a"]);

        let mut decoder = ZlibDecoder::new(&payload[..]);
        let mut table = vec![];
        decoder.read_to_end(&mut table)?;
        assert_eq!(table, b"a\0");

        let (_, used) = zlib::decompress_prefix(&payload)?;
        // 3 nodes, then root: a->1 END, leaf: END, placeholder: END
        assert_eq!(&payload[used..], &[0x03, 0b_0011_1000]);

        assert_eq!(unpack(&payload)?, ["/a"]);
        Ok(())
    }

    #[test]
    fn round_trip_body() -> anyhow::Result<()> {
        let paths: Vec<String> = (0..20)
            .map(|i| format!("/head/neck/shoulders/heart{i}/waist{i}/leg/foot/heel"))
            .collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        let payload = packed(&refs);
        assert_eq!(sorted(unpack(&payload)?), sorted(paths));
        Ok(())
    }

    #[test]
    fn round_trip_large_set() -> anyhow::Result<()> {
        let paths: Vec<String> = (0..550)
            .map(|i| format!("/content/dist{i}/jboss/source{i}"))
            .collect();
        let tree = build_tree(&paths)?;
        assert_eq!(tree.len(), 1103);

        let payload = pack(&tree)?;
        let (_, used) = zlib::decompress_prefix(&payload)?;
        assert_eq!(&payload[used..used + 3], &[0x82, 0x04, 0x4f]);

        assert_eq!(sorted(unpack(&payload)?), sorted(paths));
        Ok(())
    }

    #[test]
    fn round_trip_mixed_depths() -> anyhow::Result<()> {
        let paths = [
            "/content/dist/rhel/server/7/x86_64/os",
            "/content/dist/rhel/server/7/x86_64/debug",
            "/content/dist/rhel/server/8/x86_64/os",
            "/content/beta/rhel/server/7/x86_64/os",
            "/some/place/nice",
            "/single",
        ];
        let unpacked = unpack(&packed(&paths))?;
        let expected: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        assert_eq!(sorted(unpacked), sorted(expected));
        Ok(())
    }

    #[test]
    fn unpack_order_is_depth_first_by_name() -> anyhow::Result<()> {
        let unpacked = unpack(&packed(&["/b/y", "/a/z", "/b/x", "/a/y"]))?;
        assert_eq!(unpacked, ["/a/y", "/a/z", "/b/x", "/b/y"]);
        Ok(())
    }

    #[test]
    fn prefix_paths_are_not_recoverable() -> anyhow::Result<()> {
        let unpacked = unpack(&packed(&["/a/b", "/a/b/c"]))?;
        assert_eq!(unpacked, ["/a/b/c"]);
        Ok(())
    }

    /// Every node points at the next one twice, so a dozen nodes hold
    /// 2^12 paths.
    #[test]
    fn path_limit() -> anyhow::Result<()> {
        let depth = 12;
        let paths: Vec<String> = (0..1u32 << depth)
            .map(|n| {
                (0..depth)
                    .map(|bit| if n >> bit & 1 == 1 { "/b" } else { "/a" })
                    .collect()
            })
            .collect();
        let tree = build_tree(&paths)?;
        assert_eq!(tree.len(), depth as usize + 1);
        let payload = pack(&tree)?;

        assert_eq!(
            unpack_with_limit(&payload, paths.len() - 1),
            Err(PayloadError::TooManyPaths {
                limit: paths.len() - 1
            })
        );
        let unpacked = unpack_with_limit(&payload, paths.len())?;
        assert_eq!(sorted(unpacked), sorted(paths.clone()));
        assert_eq!(unpack(&payload)?.len(), paths.len());
        Ok(())
    }

    #[test]
    fn empty() -> anyhow::Result<()> {
        assert!(packed(&[]).is_empty());
        assert!(packed(&["/"]).is_empty());
        assert!(unpack(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn truncated_node_table() {
        let payload = packed(&["/content/dist/rhel/os", "/content/dist/rhel/debug"]);
        let err = unpack(&payload[..payload.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Codec(_) | PayloadError::UnexpectedEnd(_)
        ));
    }

    #[test]
    fn no_root() {
        // A valid segment table, one node, and only an END for it.
        let mut payload = zlib::compress(b"a\0");
        payload.extend_from_slice(&[0x01, 0b_1000_0000]);
        assert_eq!(unpack(&payload), Err(PayloadError::NoRoot));
    }
}
