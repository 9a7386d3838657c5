//! SQLite index implementation
//!
//! The index is a single SQLite connection guarded by a mutex. Writers get an
//! `IMMEDIATE` transaction, readers a deferred one; because the connection is
//! exclusive for the duration of either, a reader always sees a consistent
//! point-in-time snapshot.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{IndexStore, StorageError, StorageResult};
use crate::storage::{dockerfile_key, image_key, DockerfileRecord, ImageRecord, DOCKERFILE_SUFFIX};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// File name of the database inside the storage directory
pub const INDEX_FILE_NAME: &str = "index.sqlite3";

/// SQLite-backed durable index
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteIndex {
    /// Opens (or creates) the index rooted at `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Storage directory; created if it does not exist
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteIndex)` - Successfully opened/created index
    /// * `Err(StorageError)` - Failed to create the directory or open the database
    pub fn open(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE_NAME);
        let conn = Connection::open(&path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        tracing::debug!("Opened index at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Creates an in-memory index (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the database file, if the index lives on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock already rolled its transaction back
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` inside a write transaction
    ///
    /// The transaction commits when `f` returns `Ok` and is rolled back
    /// completely when it returns `Err`; no partial writes survive.
    pub fn update<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> StorageResult<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut txn = WriteTxn { tx };

        match f(&mut txn) {
            Ok(value) => {
                txn.tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.tx.rollback() {
                    tracing::warn!("Rollback failed after {}: {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Runs `f` against a read-only snapshot of the index
    pub fn view<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> StorageResult<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let txn = ReadTxn { tx };
        let result = f(&txn);
        txn.tx.rollback()?;
        result
    }

    /// Checkpoints the write-ahead log into the main database file
    pub fn flush(&self) -> StorageResult<()> {
        let conn = self.lock();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Flushes and closes the index
    pub fn close(self) -> StorageResult<()> {
        self.flush()?;
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        tracing::debug!("Index closed");
        Ok(())
    }
}

impl IndexStore for SqliteIndex {
    fn put_images(&self, images: &[ImageRecord]) -> StorageResult<usize> {
        self.update(|txn| {
            for image in images {
                txn.put_image(image)?;
            }
            Ok(images.len())
        })
    }

    fn put_dockerfile(&self, record: &DockerfileRecord) -> StorageResult<()> {
        self.update(|txn| txn.put_dockerfile(record))
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.view(|txn| txn.get(key))
    }
}

fn get_value(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    let value = conn
        .prepare_cached("SELECT value FROM entries WHERE key = ?1")?
        .query_row(params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

/// Write handle passed to [`SqliteIndex::update`]
pub struct WriteTxn<'c> {
    tx: Transaction<'c>,
}

impl WriteTxn<'_> {
    /// Sets `key` to `value`, overwriting any previous value
    pub fn set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }

        self.tx
            .prepare_cached(
                "INSERT INTO entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?
            .execute(params![key, value])?;
        Ok(())
    }

    /// Reads `key`, including writes made earlier in this transaction
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        get_value(&self.tx, key)
    }

    /// Upserts an image: description under `<name>`, flags in `image_meta`
    pub fn put_image(&mut self, image: &ImageRecord) -> StorageResult<()> {
        if image.name.ends_with(DOCKERFILE_SUFFIX) {
            return Err(StorageError::InvalidKey(format!(
                "image name '{}' collides with the dockerfile key layout",
                image.name
            )));
        }

        self.set(&image_key(&image.name), &image.description)?;
        self.tx
            .prepare_cached(
                "INSERT INTO image_meta (name, is_official, is_trusted, star_count)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    is_official = excluded.is_official,
                    is_trusted = excluded.is_trusted,
                    star_count = excluded.star_count",
            )?
            .execute(params![
                image.name,
                image.is_official,
                image.is_trusted,
                image.star_count
            ])?;
        Ok(())
    }

    /// Upserts the Dockerfile text under `<name>/dockerfile`
    pub fn put_dockerfile(&mut self, record: &DockerfileRecord) -> StorageResult<()> {
        self.set(&dockerfile_key(&record.image_name), &record.contents)
    }
}

/// Read-only snapshot passed to [`SqliteIndex::view`]
pub struct ReadTxn<'c> {
    tx: Transaction<'c>,
}

impl ReadTxn<'_> {
    /// Reads the value stored under `key`
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        get_value(&self.tx, key)
    }

    /// Opens an ordered cursor over the whole key space
    ///
    /// The cursor starts unpositioned; call [`Cursor::rewind`] or
    /// [`Cursor::seek`] before reading.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            conn: &self.tx,
            current: None,
        }
    }

    /// Number of keys in the index
    pub fn count_keys(&self) -> StorageResult<u64> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of `<name>/dockerfile` keys
    pub fn count_dockerfiles(&self) -> StorageResult<u64> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM entries WHERE substr(key, -?1) = ?2",
            params![DOCKERFILE_SUFFIX.len() as i64, DOCKERFILE_SUFFIX],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of image keys that have no matching dockerfile key yet
    pub fn count_images_without_dockerfile(&self) -> StorageResult<u64> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM entries e
             WHERE substr(e.key, -?1) != ?2
               AND NOT EXISTS (SELECT 1 FROM entries d WHERE d.key = e.key || ?2)",
            params![DOCKERFILE_SUFFIX.len() as i64, DOCKERFILE_SUFFIX],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Ordered key cursor over a [`ReadTxn`] snapshot
///
/// Keys are ordered by their UTF-8 bytes, so `<name>` sorts before
/// `<name>/dockerfile`.
pub struct Cursor<'t> {
    conn: &'t Connection,
    current: Option<(String, String)>,
}

impl Cursor<'_> {
    /// Positions the cursor on the smallest key
    pub fn rewind(&mut self) -> StorageResult<()> {
        self.seek("")
    }

    /// Positions the cursor on the first key `>= key`
    pub fn seek(&mut self, key: &str) -> StorageResult<()> {
        self.current = self
            .conn
            .prepare_cached(
                "SELECT key, value FROM entries WHERE key >= ?1 ORDER BY key LIMIT 1",
            )?
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(())
    }

    /// Returns true while the cursor points at an entry
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Advances to the next key; a no-op once the cursor is exhausted
    pub fn next(&mut self) -> StorageResult<()> {
        let Some((key, _)) = self.current.take() else {
            return Ok(());
        };

        self.current = self
            .conn
            .prepare_cached("SELECT key, value FROM entries WHERE key > ?1 ORDER BY key LIMIT 1")?
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(())
    }

    /// Key at the current position
    pub fn key(&self) -> Option<&str> {
        self.current.as_ref().map(|(key, _)| key.as_str())
    }

    /// Value at the current position
    pub fn value(&self) -> Option<&str> {
        self.current.as_ref().map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image(name: &str, description: &str) -> ImageRecord {
        ImageRecord {
            name: name.to_string(),
            description: description.to_string(),
            is_official: false,
            is_trusted: false,
            star_count: 0,
        }
    }

    fn collect_keys(index: &SqliteIndex) -> Vec<String> {
        index
            .view(|txn| {
                let mut keys = Vec::new();
                let mut cursor = txn.cursor();
                cursor.rewind()?;
                while cursor.valid() {
                    keys.push(cursor.key().unwrap().to_string());
                    cursor.next()?;
                }
                Ok(keys)
            })
            .unwrap()
    }

    #[test]
    fn test_image_round_trip() {
        let index = SqliteIndex::open_in_memory().unwrap();

        index.put_images(&[image("alpine", "x")]).unwrap();

        assert_eq!(index.get("alpine").unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_image_flags_persisted() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let record = ImageRecord {
            name: "library/redis".to_string(),
            description: "Redis".to_string(),
            is_official: true,
            is_trusted: false,
            star_count: 42,
        };

        index.put_images(&[record.clone()]).unwrap();

        let flags = index
            .view(|txn| {
                Ok(txn.tx.query_row(
                    "SELECT is_official, is_trusted, star_count FROM image_meta WHERE name = ?1",
                    params![record.name],
                    |row| Ok((row.get::<_, bool>(0)?, row.get::<_, bool>(1)?, row.get::<_, i64>(2)?)),
                )?)
            })
            .unwrap();
        assert_eq!(flags, (true, false, 42));
        assert_eq!(index.get("library/redis").unwrap(), Some("Redis".to_string()));
    }

    #[test]
    fn test_last_write_wins() {
        let index = SqliteIndex::open_in_memory().unwrap();

        index.put_images(&[image("alpine", "old")]).unwrap();
        index.put_images(&[image("alpine", "new")]).unwrap();

        assert_eq!(index.get("alpine").unwrap(), Some("new".to_string()));
        assert_eq!(index.view(|txn| txn.count_keys()).unwrap(), 1);
    }

    #[test]
    fn test_failed_update_discards_all_writes() {
        let index = SqliteIndex::open_in_memory().unwrap();

        let result: StorageResult<()> = index.update(|txn| {
            txn.set("a", "1")?;
            txn.set("b", "2")?;
            Err(StorageError::Aborted("test".to_string()))
        });

        assert!(matches!(result, Err(StorageError::Aborted(_))));
        assert_eq!(index.get("a").unwrap(), None);
        assert_eq!(index.get("b").unwrap(), None);
    }

    #[test]
    fn test_update_sees_own_writes() {
        let index = SqliteIndex::open_in_memory().unwrap();

        let seen = index
            .update(|txn| {
                txn.set("k", "v")?;
                txn.get("k")
            })
            .unwrap();

        assert_eq!(seen, Some("v".to_string()));
    }

    #[test]
    fn test_empty_key_rejected() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let result = index.update(|txn| txn.set("", "v"));
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_image_name_with_dockerfile_suffix_rejected() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let result = index.put_images(&[image("evil/dockerfile", "x")]);
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert_eq!(index.view(|txn| txn.count_keys()).unwrap(), 0);
    }

    #[test]
    fn test_cursor_orders_keys_and_colocates_dockerfile() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .put_images(&[image("nginx", "web"), image("alpine", "small")])
            .unwrap();
        index
            .put_dockerfile(&DockerfileRecord {
                image_name: "alpine".to_string(),
                contents: "FROM scratch".to_string(),
            })
            .unwrap();

        assert_eq!(
            collect_keys(&index),
            vec!["alpine", "alpine/dockerfile", "nginx"]
        );
    }

    #[test]
    fn test_cursor_seek_and_exhaustion() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .put_images(&[image("a", "1"), image("b", "2"), image("c", "3")])
            .unwrap();

        index
            .view(|txn| {
                let mut cursor = txn.cursor();
                assert!(!cursor.valid());

                cursor.seek("b")?;
                assert_eq!(cursor.key(), Some("b"));
                assert_eq!(cursor.value(), Some("2"));

                cursor.next()?;
                assert_eq!(cursor.key(), Some("c"));

                cursor.next()?;
                assert!(!cursor.valid());
                assert_eq!(cursor.key(), None);

                // Stays exhausted
                cursor.next()?;
                assert!(!cursor.valid());

                cursor.seek("zzz")?;
                assert!(!cursor.valid());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_counts() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .put_images(&[image("a", "1"), image("b", "2")])
            .unwrap();
        index
            .put_dockerfile(&DockerfileRecord {
                image_name: "a".to_string(),
                contents: "FROM a".to_string(),
            })
            .unwrap();

        index
            .view(|txn| {
                assert_eq!(txn.count_keys()?, 3);
                assert_eq!(txn.count_dockerfiles()?, 1);
                assert_eq!(txn.count_images_without_dockerfile()?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("nested").join("index");

        let index = SqliteIndex::open(&storage).unwrap();
        assert_eq!(index.path(), Some(storage.join(INDEX_FILE_NAME).as_path()));
        index.put_images(&[image("alpine", "x")]).unwrap();
        index.close().unwrap();

        let reopened = SqliteIndex::open(&storage).unwrap();
        assert_eq!(reopened.get("alpine").unwrap(), Some("x".to_string()));
    }
}
