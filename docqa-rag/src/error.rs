//! Error types for the `docqa-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Whether a failure of an external service is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network errors, rate limiting, 5xx responses.
    Transient,
    /// Authentication failures, malformed requests, anything a retry cannot fix.
    Permanent,
}

/// Errors that can occur in ingestion, retrieval and answer generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameters. Fatal and surfaced immediately.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A single document could not be ingested. Recorded in the ingestion
    /// report, never aborts the batch.
    #[error("Ingestion error (document '{document_id}'): {message}")]
    IngestionError {
        /// The document that failed.
        document_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index could not be reached or failed to answer a query.
    ///
    /// Distinct from "no results", which is an empty [`Context`](crate::Context).
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// The context was empty and the generator is configured to refuse
    /// ungrounded answers.
    #[error("Insufficient context: no passages available to ground the answer")]
    InsufficientContext,

    /// A vector's length does not match the index dimension.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension fixed at index creation.
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// Whether a retry may succeed.
        kind: FailureKind,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// Whether a retry may succeed.
        kind: FailureKind,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while calling the completion model.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The completion provider that produced the error.
        provider: String,
        /// Whether a retry may succeed.
        kind: FailureKind,
        /// A description of the failure.
        message: String,
    },

    /// A call to an external service did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The per-attempt timeout that elapsed.
        after: Duration,
    },

    /// The caller cancelled an in-flight query.
    #[error("Query cancelled")]
    Cancelled,

    /// A document source could not be read or parsed.
    #[error("Source error ({path}): {message}")]
    Source {
        /// The file that failed.
        path: String,
        /// A description of the failure.
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Build a [`RagError::Embedding`] error.
    pub fn embedding(
        provider: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Embedding { provider: provider.into(), kind, message: message.into() }
    }

    /// Build a [`RagError::VectorStore`] error.
    pub fn vector_store(
        backend: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::VectorStore { backend: backend.into(), kind, message: message.into() }
    }

    /// Build a [`RagError::Generation`] error.
    pub fn generation(
        provider: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Generation { provider: provider.into(), kind, message: message.into() }
    }

    /// Returns `true` if retrying the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Embedding { kind, .. }
            | Self::VectorStore { kind, .. }
            | Self::Generation { kind, .. } => *kind == FailureKind::Transient,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for outcomes the end user should be told about directly,
    /// as opposed to operational failures that warrant an alert.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InsufficientContext | Self::Cancelled | Self::Source { .. } | Self::ConfigError(_)
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RagError::embedding("x", FailureKind::Transient, "429").is_transient());
        assert!(!RagError::embedding("x", FailureKind::Permanent, "401").is_transient());
        assert!(
            RagError::Timeout { operation: "embed".into(), after: Duration::from_secs(1) }
                .is_transient()
        );
        assert!(!RagError::DimensionMismatch { expected: 3, actual: 4 }.is_transient());
        assert!(!RagError::Cancelled.is_transient());
    }

    #[test]
    fn user_facing_split() {
        assert!(RagError::InsufficientContext.is_user_facing());
        assert!(!RagError::RetrievalError("down".into()).is_user_facing());
    }
}
