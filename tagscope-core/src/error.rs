//! Error types for tagscope-core
//!
//! Collector operations never surface these; they cover configuration,
//! capture replay and probe failures that the collector absorbs.

use thiserror::Error;

/// Main error type for the tagscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed line in an event capture
    #[error("capture error at line {line}: {message}")]
    Capture { line: usize, message: String },

    /// Readiness probe failed; treated as "not ready" for that attempt
    #[error("probe error: {0}")]
    Probe(String),
}

/// Result type alias for tagscope-core
pub type Result<T> = std::result::Result<T, Error>;
