//! Recency index for the in-memory store.
//!
//! Every key gets a monotonically increasing tick on access; the smallest
//! tick is the least recently used entry.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct LruIndex {
    clock: u64,
    by_key: BTreeMap<Vec<u8>, u64>,
    by_tick: BTreeMap<u64, Vec<u8>>,
}

impl LruIndex {
    /// Mark `key` as most recently used and return its new tick.
    pub(crate) fn touch(&mut self, key: &[u8]) -> u64 {
        self.clock = self.clock.saturating_add(1);
        let tick = self.clock;
        if let Some(old) = self.by_key.insert(key.to_vec(), tick) {
            self.by_tick.remove(&old);
        }
        self.by_tick.insert(tick, key.to_vec());
        tick
    }

    /// Remove and return the least recently used key.
    pub(crate) fn pop_oldest(&mut self) -> Option<Vec<u8>> {
        let tick = *self.by_tick.keys().next()?;
        let key = self.by_tick.remove(&tick)?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_is_least_recently_touched() {
        let mut index = LruIndex::default();
        index.touch(b"a");
        index.touch(b"b");
        index.touch(b"a");

        assert_eq!(index.pop_oldest(), Some(b"b".to_vec()));
        assert_eq!(index.pop_oldest(), Some(b"a".to_vec()));
        assert_eq!(index.pop_oldest(), None);
    }

    #[test]
    fn retouching_keeps_one_entry() {
        let mut index = LruIndex::default();
        assert_eq!(index.touch(b"x"), 1);
        assert_eq!(index.touch(b"x"), 2);
        assert_eq!(index.len(), 1);
    }
}
