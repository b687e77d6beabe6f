//! Store error types

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    /// A UNIQUE constraint rejected the write.
    #[error("duplicate row: {0}")]
    Duplicate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return StoreError::Duplicate(
                    message
                        .clone()
                        .unwrap_or_else(|| "UNIQUE constraint failed".to_string()),
                );
            }
        }
        StoreError::Sqlite(err)
    }
}
