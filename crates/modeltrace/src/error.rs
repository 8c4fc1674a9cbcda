//! Error types for building and loading trace models.

use thiserror::Error;

/// Errors that can occur while assembling a [`crate::ModelTrace`].
///
/// Queries themselves never fail; only construction and loading do.
#[derive(Error, Debug)]
pub enum TraceError {
    /// A header count disagrees with the length of its array.
    #[error("header declares {declared} {array} but {actual} were supplied")]
    CountMismatch {
        /// Name of the array.
        array: &'static str,
        /// Count stored in the header.
        declared: i64,
        /// Actual array length.
        actual: usize,
    },

    /// The index array does not describe whole triangles.
    #[error("index count {0} is not a multiple of 3")]
    PartialTriangle(usize),

    /// An index refers past the end of the vertex or UV array.
    #[error("index {value} at position {position} is out of range for {len} {array}")]
    IndexOutOfRange {
        /// Array the index points into.
        array: &'static str,
        /// Position in the index array.
        position: usize,
        /// Offending value.
        value: i64,
        /// Length of the target array.
        len: usize,
    },

    /// A tree node is malformed.
    #[error("node {node}: {reason}")]
    InvalidNode {
        /// Node index.
        node: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A leaf is malformed.
    #[error("leaf {leaf}: {reason}")]
    InvalidLeaf {
        /// Leaf index.
        leaf: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// An overflow entry is malformed.
    #[error("overflow entry {entry}: {reason}")]
    InvalidOverflow {
        /// Position in the overflow array.
        entry: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A binary blob ended early or carries the wrong tag.
    #[error("malformed binary model: {0}")]
    Binary(String),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for trace model construction.
pub type Result<T> = std::result::Result<T, TraceError>;
