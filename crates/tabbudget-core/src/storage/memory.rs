use std::collections::HashMap;
use std::sync::Mutex;

use super::KvStore;
use crate::error::StorageError;

/// Process-local store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail. Reads still succeed.
    pub fn read_only() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            read_only: true,
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self
            .values
            .lock()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::QueryFailed(format!(
                "store is read-only, cannot write '{key}'"
            )));
        }
        let mut values = self
            .values
            .lock()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
