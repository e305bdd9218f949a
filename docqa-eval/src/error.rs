//! Error types for the `docqa-eval` crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// Invalid harness configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// There were no records to score.
    #[error("Evaluation dataset is empty")]
    EmptyDataset,

    /// A dataset file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A dataset file is not valid JSON or JSON Lines.
    #[error("Failed to parse '{path}' (line {line}): {message}")]
    Parse { path: String, line: usize, message: String },
}

/// A convenience result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;
