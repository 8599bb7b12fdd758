//! Error types for building and storing document trees.

use thiserror::Error;

/// Result type alias for document tree operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while building, querying or persisting a tree.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The heading stream could not be turned into a tree. Fatal for the
    /// document that produced it.
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// Node not found in the tree.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Persisted data does not describe a valid tree.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed heading streams and broken tree invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// A level-0 (preamble) segment appeared after the first position.
    #[error("preamble segment at position {position}; only the first segment may have level 0")]
    MisplacedPreamble { position: usize },

    /// No root could be established for a non-empty segment sequence.
    #[error("no root could be established for {segments} segments")]
    NoRoot { segments: usize },

    /// A node's level is not strictly greater than its parent's.
    #[error("node {id} has level {level}, not deeper than parent {parent} at level {parent_level}")]
    LevelNotIncreasing {
        id: String,
        level: u32,
        parent: String,
        parent_level: u32,
    },

    /// A node id does not encode its position under its parent.
    #[error("node id {id} does not match its position (expected {expected})")]
    IdMismatch { id: String, expected: String },

    /// A parent or child reference points at a missing node.
    #[error("node {id} references missing node {missing}")]
    DanglingLink { id: String, missing: String },

    /// The node arena is not stored in document (pre-order) order.
    #[error("node {id} is stored out of document order (expected {expected})")]
    OutOfOrder { id: String, expected: String },

    /// The tree has zero or several roots, or an unreachable node.
    #[error("tree must have exactly one root reaching every node: {0}")]
    Rootedness(String),

    /// A resolved citation points outside the bibliography.
    #[error("node {id} cites {target}, which is not in the bibliography")]
    UnknownCitationTarget { id: String, target: String },
}
