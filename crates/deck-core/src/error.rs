//! Error types for deck-core.

/// Errors that can occur in broker state operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Context id not present in the registry
    #[error("Unknown context: {0}")]
    UnknownContext(String),

    /// Context id already in use
    #[error("Context already exists: {0}")]
    DuplicateContext(String),
}

pub type Result<T> = std::result::Result<T, Error>;
