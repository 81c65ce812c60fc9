//! Error types for block analysis.

use thiserror::Error;

/// Errors that can occur while resolving, filtering or aggregating blocks.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A mapped column is absent from a row.
    #[error("column '{column}' not found (row {row})")]
    MissingColumn {
        /// Column name.
        column: String,
        /// Row index where it was missing.
        row: usize,
    },

    /// A numeric column holds a value that is not a number.
    #[error("column '{column}' row {row}: '{value}' is not numeric")]
    NonNumeric {
        /// Column name.
        column: String,
        /// Row index.
        row: usize,
        /// Offending value as text.
        value: String,
    },

    /// An active spatial filter has no usable mesh.
    #[error("spatial filter '{filter}' needs mesh '{mesh}', which is missing or empty")]
    MissingGeometry {
        /// Filter label.
        filter: String,
        /// Mesh name.
        mesh: String,
    },

    /// Invalid analysis configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation was cancelled through its token.
    #[error("analysis cancelled")]
    Cancelled,

    /// I/O error while reading inputs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed block table JSON.
    #[error("block table: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
