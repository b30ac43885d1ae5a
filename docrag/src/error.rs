//! Error types for the `docrag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while chunking, embedding, storing or retrieving.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document has no usable text.
    #[error("Malformed input ({document}): {reason}")]
    MalformedInput {
        /// Identifier of the offending document (corpus name or position).
        document: String,
        /// Why the document was rejected.
        reason: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A whole embedding batch failed, including its retry.
    #[error("Embedding batch {batch} failed: {message}")]
    EmbeddingBatchFailure {
        /// Zero-based batch number.
        batch: usize,
        /// A description of the failure.
        message: String,
    },

    /// A vector does not match the dimension configured for its collection.
    #[error("Dimension mismatch for '{id}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The record (or `"query"`) whose vector was rejected.
        id: String,
        /// The collection dimension.
        expected: usize,
        /// The dimension of the offending vector.
        actual: usize,
    },

    /// The collection is absent or has no index yet.
    #[error("Collection '{collection}' is not ready: {reason}")]
    StoreNotReady {
        /// The collection that was queried.
        collection: String,
        /// Why it cannot serve queries.
        reason: String,
    },

    /// The vector store backend could not be reached or rejected the call.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider or store call did not finish within its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Reading or writing an artifact failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An artifact or config file could not be (de)serialized.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the retry policies of the embedder and the store apply to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Timeout { .. }
                | RagError::EmbeddingError { .. }
                | RagError::EmbeddingBatchFailure { .. }
                | RagError::VectorStoreError { .. }
        )
    }
}

/// A convenience result type for docrag operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_backend_errors_are_retryable() {
        let timeout =
            RagError::Timeout { operation: "embed".into(), timeout: Duration::from_secs(1) };
        assert!(timeout.is_retryable());
        let backend = RagError::VectorStoreError { backend: "x".into(), message: "down".into() };
        assert!(backend.is_retryable());
    }

    #[test]
    fn not_ready_and_mismatch_are_not_retryable() {
        let not_ready =
            RagError::StoreNotReady { collection: "docs".into(), reason: "no index".into() };
        assert!(!not_ready.is_retryable());
        let mismatch = RagError::DimensionMismatch { id: "a".into(), expected: 4, actual: 3 };
        assert!(!mismatch.is_retryable());
        assert_eq!(mismatch.to_string(), "Dimension mismatch for 'a': expected 4, got 3");
    }
}
