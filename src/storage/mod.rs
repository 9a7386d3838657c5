//! Storage module for the durable index
//!
//! This module handles everything persisted by a crawl:
//! - SQLite-backed ordered key-value index with transactional updates
//! - The key layout shared with index readers
//! - Record types for images and their Dockerfiles
//!
//! # Key layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `<name>` | image description |
//! | `<name>/dockerfile` | Dockerfile text, entity-decoded and trimmed |
//!
//! Readers classify entries by the `/dockerfile` suffix; this layout is the
//! only contract with them and must stay stable.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{Cursor, ReadTxn, SqliteIndex, WriteTxn, INDEX_FILE_NAME};
pub use traits::{IndexStore, StorageError, StorageResult};

use std::path::Path;

/// Suffix appended to an image name to form its dockerfile key
pub const DOCKERFILE_SUFFIX: &str = "/dockerfile";

/// Opens or creates the index rooted at `path`
///
/// # Arguments
///
/// * `path` - Storage directory
///
/// # Returns
///
/// * `Ok(SqliteIndex)` - Successfully opened index
/// * `Err(StorageError)` - Failed to open the index
pub fn open_index(path: &Path) -> StorageResult<SqliteIndex> {
    SqliteIndex::open(path)
}

/// Metadata for one image, as returned by the search API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub name: String,
    pub description: String,
    pub is_official: bool,
    pub is_trusted: bool,
    pub star_count: i64,
}

/// Build recipe of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileRecord {
    pub image_name: String,
    pub contents: String,
}

/// Key holding an image's description
pub fn image_key(name: &str) -> String {
    name.to_string()
}

/// Key holding an image's Dockerfile
pub fn dockerfile_key(name: &str) -> String {
    format!("{}{}", name, DOCKERFILE_SUFFIX)
}

/// Returns true if `key` holds Dockerfile text
pub fn is_dockerfile_key(key: &str) -> bool {
    key.ends_with(DOCKERFILE_SUFFIX)
}

/// Collects every `(key, dockerfile)` pair in key order
///
/// This is the scan index readers perform: a full walk of the key space,
/// keeping only dockerfile-bearing entries.
pub fn dockerfile_entries(index: &SqliteIndex) -> StorageResult<Vec<(String, String)>> {
    index.view(|txn| {
        let mut entries = Vec::new();
        let mut cursor = txn.cursor();
        cursor.rewind()?;
        while cursor.valid() {
            if let (Some(key), Some(value)) = (cursor.key(), cursor.value()) {
                if is_dockerfile_key(key) {
                    entries.push((key.to_string(), value.to_string()));
                }
            }
            cursor.next()?;
        }
        Ok(entries)
    })
}
