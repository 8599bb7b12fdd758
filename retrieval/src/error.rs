//! Error types for retrieval and multi-document querying.

use thiserror::Error;

use paperindex_doc_tree::IndexError;
use paperindex_llm::LlmError;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while retrieving from paper trees.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Tree construction, lookup or persistence error.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Model or embedding service error.
    #[error("model error: {0}")]
    Llm(#[from] LlmError),

    /// No document with this id in the collection.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A per-document task did not complete.
    #[error("task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
