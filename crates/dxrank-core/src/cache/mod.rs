//! # Memoization Cache
//!
//! Durable key→value memoization for pure, expensive functions.
//!
//! - [`KeyValueStore`]: raw byte store contract (durable or in-memory)
//! - [`Memo`]: typed `get_or_compute` over a store
//! - [`Instrumented`]: hit/miss counting wrapper, local to its owner
//!
//! Keys are BLAKE3 digests of a function namespace plus the postcard encoding
//! of the arguments, so they are stable across processes and releases.
//! Values are postcard-encoded. A cache failure never fails the wrapped
//! computation: read errors count as misses and write errors are logged.

mod lru;
mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::DxError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// CACHE KEY
// =============================================================================

/// Deterministic 32-byte cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive a key from a function namespace and its arguments.
    pub fn derive<A: Serialize + ?Sized>(namespace: &str, args: &A) -> Result<Self, DxError> {
        let encoded = postcard::to_stdvec(args)
            .map_err(|e| DxError::SerializationError(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(&[0]);
        hasher.update(&encoded);
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// =============================================================================
// STORE CONTRACT
// =============================================================================

/// A byte-level key→value store with bounded capacity.
///
/// Implementations must be safe to share between worker threads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, DxError>;

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<(), DxError>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries kept before least-recently-used eviction.
    fn capacity(&self) -> usize;

    /// Write pending state to durable storage.
    fn flush(&self) -> Result<(), DxError>;
}

// =============================================================================
// INSTRUMENTATION
// =============================================================================

/// Snapshot of a cache's counters and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub len: usize,
}

impl CacheInfo {
    /// Combine counters from several owners of the same store.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            hits: self.hits.saturating_add(other.hits),
            misses: self.misses.saturating_add(other.misses),
            capacity: self.capacity.max(other.capacity),
            len: self.len.max(other.len),
        }
    }
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheInfo: hits={}, misses={}, maxsize={}, currsize={}",
            self.hits, self.misses, self.capacity, self.len
        )
    }
}

/// Counts hits and misses on top of a shared store.
///
/// Each worker wraps the shared store in its own `Instrumented`, so the
/// counters are never shared or persisted.
pub struct Instrumented {
    inner: Arc<dyn KeyValueStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Instrumented {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            capacity: self.inner.capacity(),
            len: self.inner.len(),
        }
    }
}

impl KeyValueStore for Instrumented {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, DxError> {
        let found = self.inner.get(key)?;
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<(), DxError> {
        self.inner.put(key, value)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn flush(&self) -> Result<(), DxError> {
        self.inner.flush()
    }
}

// =============================================================================
// TYPED MEMO
// =============================================================================

/// Typed memoization of one pure function over a [`KeyValueStore`].
pub struct Memo<V> {
    store: Arc<dyn KeyValueStore>,
    namespace: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Memo<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(namespace: &'static str, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            namespace,
            _value: PhantomData,
        }
    }

    /// Return the cached value for `args`, or compute, store and return it.
    ///
    /// Errors from `compute` propagate and nothing is stored for them.
    pub fn get_or_compute<A, E, F>(&self, args: &A, compute: F) -> Result<V, E>
    where
        A: Serialize + ?Sized,
        F: FnOnce() -> Result<V, E>,
    {
        let key = match CacheKey::derive(self.namespace, args) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(namespace = self.namespace, "cache key derivation failed: {}", e);
                return compute();
            }
        };

        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        let value = compute()?;
        match postcard::to_stdvec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.store.put(&key, &bytes) {
                    tracing::warn!(namespace = self.namespace, "cache write failed: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(namespace = self.namespace, "cache encode failed: {}", e);
            }
        }
        Ok(value)
    }

    fn lookup(&self, key: &CacheKey) -> Option<V> {
        let bytes = match self.store.get(key) {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(namespace = self.namespace, "cache read failed: {}", e);
                return None;
            }
        };
        match postcard::from_bytes(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                // Undecodable entries are recomputed and overwritten.
                tracing::warn!(namespace = self.namespace, "cache decode failed: {}", e);
                None
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
