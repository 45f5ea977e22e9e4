//! Associative table keyed by the identity of `Arc`-shared host entities.
//!
//! Only a `Weak` to each key is kept. Holding the `Weak` also keeps the key's
//! allocation from being reused, so an address match always means the same
//! entity; an entry whose key has no strong references left is dead and is
//! dropped by the next sweep.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

struct Slot<K: ?Sized, E> {
    key: Weak<K>,
    entity: Arc<E>,
}

pub(crate) struct WeakKeyTable<K: ?Sized, E> {
    slots: HashMap<usize, Slot<K, E>>,
    inserts_since_sweep: usize,
    sweep_interval: usize,
}

fn address_of<K: ?Sized>(key: &Arc<K>) -> usize {
    Arc::as_ptr(key).cast::<()>() as usize
}

impl<K: ?Sized, E> WeakKeyTable<K, E> {
    /// `sweep_interval` insertions trigger a sweep; 0 disables automatic sweeps.
    pub(crate) fn new(sweep_interval: usize) -> Self {
        Self {
            slots: HashMap::new(),
            inserts_since_sweep: 0,
            sweep_interval,
        }
    }

    pub(crate) fn get(&self, key: &Arc<K>) -> Option<Arc<E>> {
        self.slots
            .get(&address_of(key))
            .filter(|slot| slot.key.strong_count() > 0)
            .map(|slot| Arc::clone(&slot.entity))
    }

    /// Existing entity for `key`, or a new one from `create`.
    pub(crate) fn get_or_insert_with(&mut self, key: &Arc<K>, create: impl FnOnce() -> E) -> Arc<E> {
        if let Some(entity) = self.get(key) {
            return entity;
        }
        self.insert(key, create())
    }

    /// Bind a fresh entity to `key`, replacing any previous one.
    pub(crate) fn insert(&mut self, key: &Arc<K>, entity: E) -> Arc<E> {
        self.note_insert();
        let entity = Arc::new(entity);
        self.slots.insert(
            address_of(key),
            Slot {
                key: Arc::downgrade(key),
                entity: Arc::clone(&entity),
            },
        );
        entity
    }

    pub(crate) fn remove(&mut self, key: &Arc<K>) -> Option<Arc<E>> {
        self.slots.remove(&address_of(key)).map(|slot| slot.entity)
    }

    /// Drop every entry whose key is gone; returns how many were dropped.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.key.strong_count() > 0);
        self.inserts_since_sweep = 0;
        before - self.slots.len()
    }

    /// Entries whose keys are still alive.
    pub(crate) fn live_len(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.key.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn note_insert(&mut self) {
        self.inserts_since_sweep += 1;
        if self.sweep_interval > 0 && self.inserts_since_sweep >= self.sweep_interval {
            let dropped = self.sweep();
            if dropped > 0 {
                tracing::trace!(dropped, "Swept dead shadow entries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_yields_same_entity() {
        let mut table = WeakKeyTable::<String, u32>::new(0);
        let key = Arc::new("frame".to_string());
        let first = table.get_or_insert_with(&key, || 1);
        let second = table.get_or_insert_with(&key, || 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 1);
    }

    #[test]
    fn equal_but_distinct_keys_do_not_share() {
        let mut table = WeakKeyTable::<String, u32>::new(0);
        let a = Arc::new("same".to_string());
        let b = Arc::new("same".to_string());
        table.get_or_insert_with(&a, || 1);
        assert!(table.get(&b).is_none());
    }

    #[test]
    fn dead_keys_are_swept() {
        let mut table = WeakKeyTable::<String, u32>::new(0);
        let key = Arc::new("short-lived".to_string());
        table.get_or_insert_with(&key, || 1);
        drop(key);
        assert_eq!(table.live_len(), 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.sweep(), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn insertions_trigger_periodic_sweeps() {
        let mut table = WeakKeyTable::<String, u32>::new(2);
        let dead = Arc::new("dead".to_string());
        table.insert(&dead, 0);
        drop(dead);
        let live = Arc::new("live".to_string());
        table.insert(&live, 1);
        assert_eq!(table.len(), 1);
        assert!(table.get(&live).is_some());
    }

    #[test]
    fn insert_replaces_existing_entity() {
        let mut table = WeakKeyTable::<String, u32>::new(0);
        let key = Arc::new("frame".to_string());
        let old = table.insert(&key, 1);
        let fresh = table.insert(&key, 2);
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(table.get(&key).map(|entity| *entity), Some(2));
    }
}
