//! Key/value persistence for the fast state tier.
//!
//! The engine persists its durable state (usage counter, mode, pause
//! flag) after every mutation through [`KvStore`]. Values are JSON
//! strings.

pub mod database;
mod memory;

pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::StorageError;

/// Minimal string key/value contract the engine persists through.
pub trait KvStore: Send {
    /// Get a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<T: KvStore + Sync> KvStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// Returns `~/.config/tabbudget[-dev]/` based on TABBUDGET_ENV.
///
/// Set TABBUDGET_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TABBUDGET_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tabbudget-dev")
    } else {
        base_dir.join("tabbudget")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
