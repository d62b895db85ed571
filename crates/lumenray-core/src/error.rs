//! Error types shared across the workspace.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Deserialization of a description file failed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A record stride disagrees with the true in-memory record size
    #[error("Record stride mismatch: expected {expected} bytes, got {actual}")]
    StrideMismatch { expected: u64, actual: u64 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
