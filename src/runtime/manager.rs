//! Generic id-keyed store of identity-stable runtime objects.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Holds one `Arc<T>` per id.
///
/// The same id always yields the same instance until it is removed, so
/// state attached to the object (probers, counters) survives reloads.
/// Shard locks are held only for the duration of a single map operation.
#[derive(Debug)]
pub struct ItemManager<T> {
    items: DashMap<String, Arc<T>>,
}

impl<T> Default for ItemManager<T> {
    fn default() -> Self {
        Self {
            items: DashMap::new(),
        }
    }
}

impl<T> ItemManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the object for `id`, creating it with `create` if absent.
    /// The flag is `true` when the object was created by this call.
    pub fn get_or_create(&self, id: &str, create: impl FnOnce(&str) -> T) -> (Arc<T>, bool) {
        if let Some(existing) = self.items.get(id) {
            return (existing.value().clone(), false);
        }
        match self.items.entry(id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let item = Arc::new(create(id));
                entry.insert(item.clone());
                (item, true)
            }
        }
    }

    pub fn try_get(&self, id: &str) -> Option<Arc<T>> {
        self.items.get(id).map(|r| r.value().clone())
    }

    /// Remove and return the object for `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.items.remove(id).map(|(_, item)| item)
    }

    /// Snapshot of all `(id, object)` pairs, sorted by id.
    pub fn items(&self) -> Vec<(String, Arc<T>)> {
        let mut items: Vec<_> = self
            .items
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Sorted snapshot of all ids.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.items.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_or_create_is_identity_stable() {
        let manager: ItemManager<String> = ItemManager::new();
        let created = AtomicUsize::new(0);

        let (first, was_created) = manager.get_or_create("a", |id| {
            created.fetch_add(1, Ordering::Relaxed);
            id.to_uppercase()
        });
        assert!(was_created);
        assert_eq!(*first, "A");

        let (second, was_created) = manager.get_or_create("a", |_| unreachable!());
        assert!(!was_created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_remove_and_items() {
        let manager: ItemManager<u32> = ItemManager::new();
        manager.get_or_create("b", |_| 2);
        manager.get_or_create("a", |_| 1);
        manager.get_or_create("c", |_| 3);

        assert_eq!(manager.ids(), vec!["a", "b", "c"]);
        assert_eq!(manager.len(), 3);

        let removed = manager.remove("b").unwrap();
        assert_eq!(*removed, 2);
        assert!(manager.remove("b").is_none());
        assert!(manager.try_get("b").is_none());

        let items = manager.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "a");
        assert_eq!(*items[1].1, 3);

        // A removed id starts over with a fresh instance.
        let (fresh, created) = manager.get_or_create("b", |_| 20);
        assert!(created);
        assert_eq!(*fresh, 20);
    }
}
