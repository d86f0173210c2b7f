//! Owned memoization for expensive upstream lookups.
//!
//! The first caller runs the lookup while holding the entry; later callers get
//! a clone of the stored value. Failed lookups are not stored, so the next
//! caller retries.

use std::fmt;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Lazily computed values keyed by `K`.
pub struct MemoMap<K, V> {
    values: DashMap<K, V>,
}

impl<K: Eq + Hash + fmt::Debug, V: fmt::Debug> fmt::Debug for MemoMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoMap").field("values", &self.values).finish()
    }
}

impl<K: Eq + Hash, V> Default for MemoMap<K, V> {
    fn default() -> Self {
        Self {
            values: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> MemoMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert<E>(
        &self,
        key: &K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.values.get(key) {
            return Ok(value.clone());
        }
        match self.values.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let value = init()?;
                entry.insert(value.clone());
                Ok(value)
            }
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single lazily computed value.
#[derive(Debug)]
pub struct Memo<T> {
    slot: MemoMap<(), T>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            slot: MemoMap::default(),
        }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        self.slot.get_or_try_insert(&(), init)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.contains(&())
    }
}
