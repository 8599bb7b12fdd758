//! Error types for model calls and the summary cache.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to the model service.
#[derive(Error, Debug)]
pub enum LlmError {
    /// A single call exceeded its deadline.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Invalid response from the service.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Retries exhausted.
    #[error("model service unavailable after {attempts} attempts: {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
