//! Key-value storage behind the flow vault and the user directory.
//!
//! Flow logic only talks to [`KeyValueStore`], so a durable backend can be
//! plugged in without touching the vault or directory. The only backend
//! shipped here is [`MemoryStore`]: every pending flow and every user record
//! is lost when the process restarts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keyed storage where every method is a single atomic operation.
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// Insert or replace the value stored under `key`.
    fn insert(&self, key: String, value: V);

    /// Remove and return the value stored under `key`.
    fn take(&self, key: &str) -> Option<V>;

    /// Return a copy of the value stored under `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Read-modify-write under `key`; `update` receives the current value, if
    /// any, and returns the value to store. The stored value is returned.
    fn upsert_with(&self, key: &str, update: &mut dyn FnMut(Option<V>) -> V) -> V;

    /// Drop every value for which `keep` returns false. Returns the number removed.
    fn retain(&self, keep: &dyn Fn(&V) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store; contents do not survive a restart.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> MemoryStore<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned map is still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> KeyValueStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn insert(&self, key: String, value: V) {
        self.entries().insert(key, value);
    }

    fn take(&self, key: &str) -> Option<V> {
        self.entries().remove(key)
    }

    fn get(&self, key: &str) -> Option<V> {
        self.entries().get(key).cloned()
    }

    fn upsert_with(&self, key: &str, update: &mut dyn FnMut(Option<V>) -> V) -> V {
        let mut entries = self.entries();
        let current = entries.remove(key);
        let next = update(current);
        entries.insert(key.to_string(), next.clone());
        next
    }

    fn retain(&self, keep: &dyn Fn(&V) -> bool) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, value| keep(value));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}
