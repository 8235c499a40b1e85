//! Error types for the vault index

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// All errors the index can produce
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl IndexError {
    /// Invalid-value error from any displayable cause
    pub fn invalid_value(msg: impl std::fmt::Display) -> Self {
        Self::InvalidValue(msg.to_string())
    }
}
