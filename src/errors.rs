use std::io;

/// A content path that can't be placed in a [`PathTree`].
///
/// [`PathTree`]: crate::path_tree::PathTree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("content path is not absolute: {0:?}")]
    NotAbsolute(String),

    #[error("content path {path:?} has an empty segment at position {index}")]
    EmptySegment { path: String, index: usize },

    /// Frequency replay walked off the tree.
    #[error("content path {0:?} is not in the path tree")]
    NotInTree(String),

    #[error("node pair compared against a missing value")]
    MissingComparand,
}

/// Failure to map a symbol to its code, or a code back to its symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("huffman trie has no symbols")]
    EmptyTrie,

    /// Usually means the caller is holding a dictionary built from a
    /// different content set.
    #[error("symbol not in dictionary: {0}")]
    UnknownSymbol(String),

    #[error("code truncated after {consumed} bits, before reaching a symbol")]
    Truncated { consumed: usize },

    #[error("reached a symbol with {remaining} bits left over")]
    TrailingBits { remaining: usize },

    /// A decoded edge doesn't hang off the node the walk is currently at.
    #[error("decoded edge {edge} does not continue the path at node {node}")]
    BrokenPath { node: u32, edge: String },

    #[error("no content with id {0:?} in dictionary")]
    UnknownContent(String),
}

/// A malformed packed content payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed segment table: {0}")]
    Inflate(String),

    #[error("payload ended early: {0}")]
    UnexpectedEnd(&'static str),

    #[error("segment name is not valid utf-8")]
    BadSegment,

    #[error("node table has no root")]
    NoRoot,

    #[error("node count is {0} bytes wide, more than fits in a usize")]
    CountTooLarge(usize),

    #[error("node table contains a cycle")]
    Cyclic,

    /// Shared nodes let a few bytes describe exponentially many paths.
    #[error("payload holds more than {limit} paths")]
    TooManyPaths { limit: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("content id {0:?} appears more than once")]
    DuplicateContent(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let e = PathError::EmptySegment {
            path: "/a//b".into(),
            index: 1,
        };
        assert_eq!(
            e.to_string(),
            "content path \"/a//b\" has an empty segment at position 1"
        );

        let e: Error = CodecError::Truncated { consumed: 3 }.into();
        assert_eq!(
            e.to_string(),
            "code truncated after 3 bits, before reaching a symbol"
        );
    }

    #[test]
    fn into_io_error() {
        let e: io::Error = Error::DuplicateContent("x".into()).into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }
}
