//! Volatile in-memory store with the same LRU contract as [`super::RedbStore`].

use super::lru::LruIndex;
use super::{CacheKey, KeyValueStore};
use crate::DxError;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    recency: LruIndex,
}

/// In-memory [`KeyValueStore`]; contents are lost on drop.
#[derive(Debug)]
pub struct MemoryStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, DxError> {
        let mut inner = self.lock();
        let found = inner.entries.get(key.as_bytes()).cloned();
        if found.is_some() {
            inner.recency.touch(key.as_bytes());
        }
        Ok(found)
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<(), DxError> {
        let mut inner = self.lock();
        inner.entries.insert(key.as_bytes().to_vec(), value.to_vec());
        inner.recency.touch(key.as_bytes());
        while inner.recency.len() > self.capacity {
            match inner.recency.pop_oldest() {
                Some(evicted) => {
                    inner.entries.remove(&evicted);
                }
                None => break,
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn flush(&self) -> Result<(), DxError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> CacheKey {
        CacheKey::derive("test", &n).expect("key")
    }

    #[test]
    fn evicts_least_recently_used() {
        let store = MemoryStore::new(2);
        store.put(&key(1), b"one").expect("put");
        store.put(&key(2), b"two").expect("put");
        // Touch 1 so 2 becomes the eviction candidate.
        assert!(store.get(&key(1)).expect("get").is_some());
        store.put(&key(3), b"three").expect("put");

        assert_eq!(store.len(), 2);
        assert!(store.get(&key(2)).expect("get").is_none());
        assert_eq!(store.get(&key(1)).expect("get"), Some(b"one".to_vec()));
        assert_eq!(store.get(&key(3)).expect("get"), Some(b"three".to_vec()));
    }
}
