//! Key-value storage for the persisted cart.
//!
//! The cart only ever touches one key, always with a whole-value overwrite,
//! so backends need nothing beyond get/set/remove of string values.
//!
//! # Backends
//!
//! - [`MemoryStorage`] - Process-local map, shared between clones
//! - [`FileStorage`] - One file per key under a directory

mod file;
mod memory;

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors that can occur when reading or writing storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous string key-value store.
///
/// Implementations must be safe to share between tasks. A missing key reads
/// as `Ok(None)`, and removing a missing key succeeds.
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Read the value stored under `key`.
    fn get_item(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete the value stored under `key`.
    fn remove_item(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}
