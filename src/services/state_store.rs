//! Per-key mutable state arena.
//!
//! Circuit breakers are keyed by tenant and drift statistics by agent. Each key
//! owns its own mutex, so contention is partitioned and no lock spans keys.
//! Callers must not hold a guard across an `.await`.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Arena of independently locked values keyed by string id.
///
/// Cheaply cloneable; clones share the same entries.
pub struct KeyedStateStore<T> {
    entries: Arc<DashMap<String, Arc<Mutex<T>>>>,
}

impl<T> Clone for KeyedStateStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for KeyedStateStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KeyedStateStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Get the cell for `key`, creating it with `init` on first use.
    ///
    /// The map shard lock is released before the cell is returned.
    pub fn entry(&self, key: &str, init: impl FnOnce() -> T) -> Arc<Mutex<T>> {
        if let Some(existing) = self.entries.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(init())))
                .value(),
        )
    }

    /// Run `f` against the value for `key` under that key's lock.
    pub fn with<R>(&self, key: &str, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let cell = self.entry(key, init);
        let mut guard = cell.lock();
        f(&mut guard)
    }

    /// Read-only access to an existing entry.
    pub fn inspect<R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.entries.get(key).map(|e| Arc::clone(e.value()))?;
        let guard = cell.lock();
        Some(f(&guard))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_isolated() {
        let store: KeyedStateStore<u32> = KeyedStateStore::new();
        store.with("a", || 0, |v| *v += 1);
        store.with("a", || 0, |v| *v += 1);
        store.with("b", || 10, |v| *v += 1);

        assert_eq!(store.inspect("a", |v| *v), Some(2));
        assert_eq!(store.inspect("b", |v| *v), Some(11));
        assert_eq!(store.inspect("c", |v| *v), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clones_share_entries() {
        let store: KeyedStateStore<Vec<u8>> = KeyedStateStore::new();
        let other = store.clone();
        other.with("k", Vec::new, |v| v.push(1));
        assert_eq!(store.inspect("k", Vec::len), Some(1));
        assert!(store.remove("k"));
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_linearizable() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    store.with("tenant", || 0, |v| *v += 1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.inspect("tenant", |v| *v), Some(4000));
    }
}
