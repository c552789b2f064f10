//! Persistent key → string storage.
//!
//! Both the user-data cache and the cart write through a [`Storage`]. The
//! trait is synchronous: storage is local and every call completes
//! immediately.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Errors that can occur when writing to storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not contain a JSON object of strings.
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A lock guarding the storage map was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Key → string persistent storage.
pub trait Storage: Send + Sync {
    /// Get the value stored under `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal could not be persisted.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}
