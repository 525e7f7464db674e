//! In-memory filesystem tree used to replay the history.
//!
//! The tree mirrors how git sees a working tree: only files are tracked, directories
//! exist implicitly while they contain something, and every node carries the mtime of
//! the last change that affected it or anything below it.

mod tree;

pub use tree::{TreeError, VirtualTree};
