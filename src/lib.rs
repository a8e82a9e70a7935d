//! Compact codes for content-delivery paths.
//!
//! Content paths are loaded into a [`PathTree`](path_tree::PathTree) that
//! shares both prefixes and suffixes. Its edges, weighted by how many paths
//! cross them, get a huffman code, and each content's path becomes the
//! codes of its edges back to back. See [`Dictionary`].

pub mod dictionary;
pub mod errors;
pub mod huffman;
pub mod path_tree;
pub mod payload;

pub use crate::dictionary::{Content, ContentCode, Dictionary};
pub use crate::errors::{CodecError, Error, PathError, PayloadError, Result};
