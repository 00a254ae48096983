use std::io;

use crate::manager::PropertyVetoError;

/// Errors that can occur during explorer operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Node is not under the root context: {0}")]
    NotUnderRoot(String),

    #[error("Selection contains node {0} more than once")]
    DuplicateSelection(String),

    #[error("List depth must be at least 1, got {0}")]
    InvalidDepth(usize),

    #[error("Selection change vetoed: {0}")]
    Vetoed(#[from] PropertyVetoError),

    #[error("Invalid permutation for {len} children: {permutation:?}")]
    InvalidPermutation { len: usize, permutation: Vec<usize> },

    #[error("Index {index} out of bounds for {len} children")]
    InvalidIndex { index: usize, len: usize },

    #[error("Root handle {0:?} can no longer be resolved")]
    RootUnresolvable(String),

    #[error("Node operation failed: {0}")]
    Node(String),

    #[error("Delivery thread unavailable: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// A safe error means the persisted data itself was intact and only the
    /// domain state it referred to has gone stale.
    pub fn is_safe(&self) -> bool {
        matches!(self, Error::RootUnresolvable(_))
    }
}

/// Result type alias for explorer operations
pub type Result<T> = std::result::Result<T, Error>;
