//! # redb-backed Cache Store
//!
//! A disk-backed [`KeyValueStore`] using the redb embedded database.
//!
//! - ACID transactions and crash safety (copy-on-write B-trees)
//! - The file is opened for each transaction and closed right after, so any
//!   number of handles and processes can share it. redb's file lock is held
//!   only while one of them is inside a transaction; the others wait on it up
//!   to the configured lock timeout.
//! - Least-recently-used eviction beyond `capacity`. Recency lives on disk:
//!   `order` maps a tick to its key and the smallest tick is evicted first.
//!   Reads are buffered in memory and stamped on flush, on drop and whenever
//!   the buffer fills up.

use super::{CacheKey, KeyValueStore};
use crate::DxError;
use crate::config::CacheConfig;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Table for entries: key digest -> postcard-encoded value
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// Table for recency: key digest -> last access tick
const RECENCY: TableDefinition<&[u8], u64> = TableDefinition::new("recency");

/// Table for eviction order: access tick -> key digest
const ORDER: TableDefinition<u64, &[u8]> = TableDefinition::new("order");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Poll interval while another handle holds the database lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Buffered reads that trigger a recency flush.
const MAX_PENDING_TOUCHES: usize = 1024;

/// A durable LRU cache file.
pub struct RedbStore {
    path: PathBuf,
    capacity: usize,
    lock_timeout: Duration,
    /// Serializes this handle's transactions; redb allows one open per file.
    file: Mutex<()>,
    /// Keys read since the last flush, oldest first.
    pending: Mutex<Vec<Vec<u8>>>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a cache file at the given path.
    pub fn open(path: impl AsRef<Path>, config: &CacheConfig) -> Result<Self, DxError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            capacity: config.capacity.max(1),
            lock_timeout: config.lock_timeout(),
            file: Mutex::new(()),
            pending: Mutex::new(Vec::new()),
        };

        // Initialize tables if they don't exist
        store.write(|txn| {
            let _ = txn
                .open_table(ENTRIES)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let _ = txn
                .open_table(RECENCY)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let _ = txn
                .open_table(ORDER)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let _ = txn
                .open_table(METADATA)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            Ok(())
        })?;

        tracing::debug!(path = %store.path.display(), len = store.len(), "cache opened");
        Ok(store)
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pending(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` against the opened database, closing it afterwards.
    fn with_db<T>(&self, op: impl FnOnce(&Database) -> Result<T, DxError>) -> Result<T, DxError> {
        let _file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let db = open_with_lock_wait(&self.path, self.lock_timeout)?;
        op(&db)
    }

    /// Run `op` in one write transaction and commit it.
    fn write<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, DxError>,
    ) -> Result<T, DxError> {
        self.with_db(|db| {
            let write_txn = db
                .begin_write()
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let value = op(&write_txn)?;
            write_txn
                .commit()
                .map_err(|e| DxError::IoError(e.to_string()))?;
            Ok(value)
        })
    }

    fn count(&self) -> Result<usize, DxError> {
        self.with_db(|db| {
            let read_txn = db
                .begin_read()
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let entries = read_txn
                .open_table(ENTRIES)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let len = entries
                .len()
                .map_err(|e| DxError::IoError(e.to_string()))?;
            Ok(len as usize)
        })
    }
}

/// Open the database, waiting while another handle holds its lock.
fn open_with_lock_wait(path: &Path, timeout: Duration) -> Result<Database, DxError> {
    let deadline = Instant::now() + timeout;
    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                if Instant::now() >= deadline {
                    return Err(DxError::CacheLocked(path.display().to_string()));
                }
                tracing::trace!(path = %path.display(), "cache file busy, waiting");
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(DxError::IoError(e.to_string())),
        }
    }
}

/// Give `key` the next tick, replacing its previous position in `order`.
fn stamp(txn: &WriteTransaction, key: &[u8]) -> Result<(), DxError> {
    let mut recency = txn
        .open_table(RECENCY)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    let mut order = txn
        .open_table(ORDER)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    let mut meta = txn
        .open_table(METADATA)
        .map_err(|e| DxError::IoError(e.to_string()))?;

    let clock = meta
        .get("clock")
        .map_err(|e| DxError::IoError(e.to_string()))?
        .map_or(0, |v| v.value());
    let tick = clock.saturating_add(1);

    let previous = recency
        .insert(key, tick)
        .map_err(|e| DxError::IoError(e.to_string()))?
        .map(|v| v.value());
    if let Some(previous) = previous {
        order
            .remove(previous)
            .map_err(|e| DxError::IoError(e.to_string()))?;
    }
    order
        .insert(tick, key)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    meta.insert("clock", tick)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    Ok(())
}

/// Drop the oldest entries until at most `capacity` remain.
fn evict(txn: &WriteTransaction, capacity: usize) -> Result<usize, DxError> {
    let mut entries = txn
        .open_table(ENTRIES)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    let mut recency = txn
        .open_table(RECENCY)
        .map_err(|e| DxError::IoError(e.to_string()))?;
    let mut order = txn
        .open_table(ORDER)
        .map_err(|e| DxError::IoError(e.to_string()))?;

    let mut evicted = 0;
    while entries
        .len()
        .map_err(|e| DxError::IoError(e.to_string()))?
        > capacity as u64
    {
        let oldest = order
            .pop_first()
            .map_err(|e| DxError::IoError(e.to_string()))?
            .map(|(_, key)| key.value().to_vec());
        let Some(oldest) = oldest else { break };
        entries
            .remove(oldest.as_slice())
            .map_err(|e| DxError::IoError(e.to_string()))?;
        recency
            .remove(oldest.as_slice())
            .map_err(|e| DxError::IoError(e.to_string()))?;
        evicted += 1;
    }
    Ok(evicted)
}

// =============================================================================
// KEYVALUESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl KeyValueStore for RedbStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, DxError> {
        let found = self.with_db(|db| {
            let read_txn = db
                .begin_read()
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let table = read_txn
                .open_table(ENTRIES)
                .map_err(|e| DxError::IoError(e.to_string()))?;
            let value = table
                .get(key.as_bytes())
                .map_err(|e| DxError::IoError(e.to_string()))?
                .map(|v| v.value().to_vec());
            Ok(value)
        })?;

        if found.is_some() {
            let full = {
                let mut pending = self.pending();
                pending.push(key.as_bytes().to_vec());
                pending.len() >= MAX_PENDING_TOUCHES
            };
            if full {
                if let Err(e) = self.flush() {
                    tracing::warn!(path = %self.path.display(), "cache recency flush failed: {}", e);
                }
            }
        }
        Ok(found)
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<(), DxError> {
        let evicted = self.write(|txn| {
            {
                let mut entries = txn
                    .open_table(ENTRIES)
                    .map_err(|e| DxError::IoError(e.to_string()))?;
                entries
                    .insert(key.as_bytes(), value)
                    .map_err(|e| DxError::IoError(e.to_string()))?;
            }
            stamp(txn, key.as_bytes())?;
            evict(txn, self.capacity)
        })?;

        if evicted > 0 {
            tracing::trace!(count = evicted, "cache entries evicted");
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.count().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "cache size unavailable: {}", e);
            0
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn flush(&self) -> Result<(), DxError> {
        let touched = std::mem::take(&mut *self.pending());
        if touched.is_empty() {
            return Ok(());
        }

        let result = self.write(|txn| {
            for key in &touched {
                // Entries evicted since the read stay evicted.
                let present = {
                    let entries = txn
                        .open_table(ENTRIES)
                        .map_err(|e| DxError::IoError(e.to_string()))?;
                    entries
                        .get(key.as_slice())
                        .map_err(|e| DxError::IoError(e.to_string()))?
                        .is_some()
                };
                if present {
                    stamp(txn, key)?;
                }
            }
            Ok(())
        });

        if result.is_err() {
            // Keep the reads for the next flush, ahead of newer ones.
            let mut pending = self.pending();
            let newer = std::mem::replace(&mut *pending, touched);
            pending.extend(newer);
        }
        result
    }
}

impl Drop for RedbStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), "cache flush on close failed: {}", e);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(n: u32) -> CacheKey {
        CacheKey::derive("test", &n).expect("key")
    }

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            capacity,
            lock_timeout_ms: 0,
        }
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("scores.redb");

        {
            let store = RedbStore::open(&path, &config(16)).expect("open");
            store.put(&key(1), b"one").expect("put");
            store.flush().expect("flush");
        }

        let store = RedbStore::open(&path, &config(16)).expect("reopen");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key(1)).expect("get"), Some(b"one".to_vec()));
        assert!(store.get(&key(2)).expect("get").is_none());
    }

    #[test]
    fn evicts_least_recently_used_on_disk() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("mappings.redb");

        {
            let store = RedbStore::open(&path, &config(2)).expect("open");
            store.put(&key(1), b"one").expect("put");
            store.put(&key(2), b"two").expect("put");
            assert!(store.get(&key(1)).expect("get").is_some());
            store.flush().expect("flush");
            store.put(&key(3), b"three").expect("put");
            assert_eq!(store.len(), 2);
        }

        let store = RedbStore::open(&path, &config(2)).expect("reopen");
        assert_eq!(store.len(), 2);
        assert!(store.get(&key(2)).expect("get").is_none());
        assert!(store.get(&key(1)).expect("get").is_some());
        assert!(store.get(&key(3)).expect("get").is_some());
    }

    #[test]
    fn recency_persists_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lru.redb");

        {
            let store = RedbStore::open(&path, &config(2)).expect("open");
            store.put(&key(1), b"one").expect("put");
            store.put(&key(2), b"two").expect("put");
            // Reading 1 makes 2 the oldest; the tick is written on drop.
            assert!(store.get(&key(1)).expect("get").is_some());
        }

        let store = RedbStore::open(&path, &config(2)).expect("reopen");
        store.put(&key(3), b"three").expect("put");
        assert!(store.get(&key(2)).expect("get").is_none());
        assert!(store.get(&key(1)).expect("get").is_some());
    }

    #[test]
    fn shared_handle_across_threads() {
        let dir = TempDir::new().expect("tempdir");
        let store = std::sync::Arc::new(
            RedbStore::open(dir.path().join("t.redb"), &config(1024)).expect("open"),
        );

        std::thread::scope(|scope| {
            for worker in 0..4u32 {
                let store = store.clone();
                scope.spawn(move || {
                    for n in 0..25u32 {
                        store
                            .put(&key(worker * 100 + n), &n.to_le_bytes())
                            .expect("put");
                    }
                });
            }
        });

        assert_eq!(store.len(), 100);
        assert_eq!(
            store.get(&key(307)).expect("get"),
            Some(7u32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn independent_handles_share_one_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("scores.redb");
        let config = CacheConfig {
            capacity: 1024,
            lock_timeout_ms: 5_000,
        };

        let first = RedbStore::open(&path, &config).expect("first open");
        let second = RedbStore::open(&path, &config).expect("second open");

        std::thread::scope(|scope| {
            for (offset, store) in [(0u32, &first), (1_000, &second)] {
                scope.spawn(move || {
                    for n in 0..20u32 {
                        store.put(&key(offset + n), &n.to_le_bytes()).expect("put");
                        assert!(store.get(&key(offset + n)).expect("get").is_some());
                    }
                });
            }
        });

        // Each handle sees the other's writes.
        assert_eq!(first.get(&key(1_005)).expect("get"), Some(5u32.to_le_bytes().to_vec()));
        assert_eq!(second.get(&key(5)).expect("get"), Some(5u32.to_le_bytes().to_vec()));
        assert_eq!(first.len(), 40);
        first.flush().expect("flush first");
        second.flush().expect("flush second");
    }

    #[test]
    fn failed_put_leaves_store_unchanged() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("scores.redb");
        let store = RedbStore::open(&path, &config(2)).expect("open");
        store.put(&key(1), b"one").expect("put");
        store.put(&key(2), b"two").expect("put");

        // Hold the file so the next write cannot start.
        let holder = Database::create(&path).expect("hold lock");
        assert!(matches!(
            store.put(&key(3), b"three"),
            Err(DxError::CacheLocked(_))
        ));
        drop(holder);

        assert_eq!(store.len(), 2);
        assert!(store.get(&key(1)).expect("get").is_some());
        assert!(store.get(&key(2)).expect("get").is_some());
        assert!(store.get(&key(3)).expect("get").is_none());
    }

    #[test]
    fn failed_flush_keeps_reads_for_retry() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lru.redb");
        let store = RedbStore::open(&path, &config(2)).expect("open");
        store.put(&key(1), b"one").expect("put");
        store.put(&key(2), b"two").expect("put");
        assert!(store.get(&key(1)).expect("get").is_some());

        let holder = Database::create(&path).expect("hold lock");
        assert!(store.flush().is_err());
        drop(holder);

        store.flush().expect("flush");
        store.put(&key(3), b"three").expect("put");
        assert!(store.get(&key(2)).expect("get").is_none());
        assert!(store.get(&key(1)).expect("get").is_some());
    }
}
