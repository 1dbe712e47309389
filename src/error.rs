//! Error types for storage backends and configuration loading.
//!
//! The synchronization engine itself never fails: absence resolves to
//! `None`/empty values and storage failures are logged and skipped. Errors
//! only surface from the [`Storage`](crate::persist::Storage) backends and
//! from [`SyncConfig::from_json`](crate::config::SyncConfig::from_json).

use thiserror::Error;

/// Main error type for formsync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid storage key: {0:?}")]
    InvalidStorageKey(String),

    #[error("Durable storage is not available in this environment")]
    StorageUnavailable,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for fallible formsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
