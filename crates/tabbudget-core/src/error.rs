//! Core error types for tabbudget-core.
//!
//! Nothing in the engine is fatal: these errors are produced at the
//! storage, configuration and browser seams, then logged and folded into
//! per-item outcomes or safe defaults by the callers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tabbudget-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key/value storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Browser API errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// The engine task is gone (runtime stopped)
    #[error("engine is not running")]
    EngineStopped,
}

/// Key/value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Store is locked by another process
    #[error("Store is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by a [`crate::host::Browser`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// Tab was closed or never existed
    #[error("No tab with id {0}")]
    NoSuchTab(i64),

    /// Cookie API rejected the request
    #[error("Cookie operation failed: {0}")]
    Cookie(String),

    /// Any other host API failure
    #[error("{0}")]
    Api(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
