//! Storage traits and error types
//!
//! This module defines the write-side interface the crawler uses to persist
//! records, and the error type shared by every storage operation.

use crate::storage::{DockerfileRecord, ImageRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Raised by a transaction body to discard its writes
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Record-level interface to the durable index
///
/// Every method runs in its own transaction: it either fully commits or
/// leaves the index untouched.
pub trait IndexStore: Send + Sync {
    /// Upserts a batch of images atomically, returning how many were written
    fn put_images(&self, images: &[ImageRecord]) -> StorageResult<usize>;

    /// Upserts the Dockerfile text of one image
    fn put_dockerfile(&self, record: &DockerfileRecord) -> StorageResult<()>;

    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
}
