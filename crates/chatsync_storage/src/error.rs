//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The record key contains characters the backend cannot store.
    #[error("invalid record key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the storage directory.
    #[error("storage locked: another process has exclusive access to {}", path.display())]
    Locked {
        /// The locked directory.
        path: PathBuf,
    },

    /// The backend refused the operation (quota exceeded, disabled, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
