use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Per-transaction identity map of loaded snapshots, keyed by aggregate kind and identifier.
///
/// Lives inside a [`Tx`](super::Tx) and is discarded with it, so a rolled back
/// transaction never leaks cached state into the next one.
#[derive(Default)]
pub struct SnapshotCache {
    entries: RefCell<HashMap<(&'static str, String), Box<dyn Any>>>,
    hits: Cell<usize>,
}

impl SnapshotCache {
    pub fn get<S: Clone + 'static>(&self, kind: &'static str, identifier: &str) -> Option<S> {
        let entries = self.entries.borrow();
        let found = entries
            .get(&(kind, identifier.to_string()))
            .and_then(|entry| entry.downcast_ref::<S>())
            .cloned();
        if found.is_some() {
            self.hits.set(self.hits.get() + 1);
        }
        found
    }

    pub fn put<S: 'static>(&self, kind: &'static str, identifier: &str, snapshot: S) {
        self.entries
            .borrow_mut()
            .insert((kind, identifier.to_string()), Box::new(snapshot));
    }

    pub fn evict(&self, kind: &'static str, identifier: &str) {
        self.entries
            .borrow_mut()
            .remove(&(kind, identifier.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let cache = SnapshotCache::default();
        cache.put("TASK", "t-1", String::from("draft"));

        assert_eq!(cache.get::<String>("TASK", "t-1"), Some("draft".to_string()));
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn kinds_do_not_collide() {
        let cache = SnapshotCache::default();
        cache.put("TASK", "x", 1_u32);
        cache.put("TOPIC", "x", 2_u32);

        assert_eq!(cache.get::<u32>("TASK", "x"), Some(1));
        assert_eq!(cache.get::<u32>("TOPIC", "x"), Some(2));
    }

    #[test]
    fn wrong_type_is_a_miss() {
        let cache = SnapshotCache::default();
        cache.put("TASK", "t-1", 7_u32);

        assert_eq!(cache.get::<String>("TASK", "t-1"), None);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn evict_removes_entry() {
        let cache = SnapshotCache::default();
        cache.put("TASK", "t-1", 7_u32);
        cache.evict("TASK", "t-1");

        assert!(cache.is_empty());
        assert_eq!(cache.get::<u32>("TASK", "t-1"), None);
    }
}
