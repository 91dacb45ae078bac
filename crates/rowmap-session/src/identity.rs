//! Per-type identity cache.
//!
//! Maps identifiers to the single live [`Entity`] for that identifier. The
//! mutex is held only for the in-memory work of each call, never across a
//! database round trip.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rowmap_core::{Record, Value};

use crate::entity::Entity;

/// Identifier to entity map for one record type.
pub struct IdentityCache<R: Record> {
    entries: Mutex<HashMap<R::Id, Entity<R>>>,
}

impl<R: Record> IdentityCache<R> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<R::Id, Entity<R>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached entity for `id`.
    pub fn get(&self, id: &R::Id) -> Option<Entity<R>> {
        self.lock().get(id).cloned()
    }

    /// Map the entity's id to it, returning the instance it replaced.
    pub fn put(&self, entity: Entity<R>) -> Option<Entity<R>> {
        self.lock().insert(entity.id().clone(), entity)
    }

    /// Whether `id` is cached.
    pub fn contains(&self, id: &R::Id) -> bool {
        self.lock().contains_key(id)
    }

    /// Remove `id`, returning the evicted entity.
    pub fn remove(&self, id: &R::Id) -> Option<Entity<R>> {
        self.lock().remove(id)
    }

    /// Remove every id in `ids`, returning the evicted entities.
    pub fn remove_all<'a, I>(&self, ids: I) -> Vec<Entity<R>>
    where
        I: IntoIterator<Item = &'a R::Id>,
    {
        let mut entries = self.lock();
        ids.into_iter().filter_map(|id| entries.remove(id)).collect()
    }

    /// Snapshot of the cached ids.
    pub fn all_ids(&self) -> Vec<R::Id> {
        self.lock().keys().cloned().collect()
    }

    /// Snapshot of the cached entities.
    pub fn all_values(&self) -> Vec<Entity<R>> {
        self.lock().values().cloned().collect()
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Update the cached entity for `id` in place, or create and cache one.
    ///
    /// Lookup and insert happen under one lock, so concurrent calls for the
    /// same id agree on a single instance.
    pub(crate) fn materialize_or_populate(&self, id: R::Id, values: Vec<Value>) -> Entity<R> {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&id) {
            existing.populate(values);
            return existing.clone();
        }
        let entity = Entity::new(id.clone(), values);
        entries.insert(id, entity.clone());
        entity
    }

    /// Apply a batch of fetched rows under one lock.
    pub(crate) fn materialize_all(&self, rows: Vec<(R::Id, Vec<Value>)>) -> Vec<Entity<R>> {
        let mut entries = self.lock();
        rows.into_iter()
            .map(|(id, values)| match entries.get(&id) {
                Some(existing) => {
                    existing.populate(values);
                    existing.clone()
                }
                None => {
                    let entity = Entity::new(id.clone(), values);
                    entries.insert(id, entity.clone());
                    entity
                }
            })
            .collect()
    }
}

impl<R: Record> Default for IdentityCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmap_core::{FieldInfo, Result, SqlType};
    use std::sync::Arc;

    struct Tag;

    impl Record for Tag {
        type Id = i32;
        const TABLE_NAME: &'static str = "tags";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 1] = [FieldInfo::new("label", SqlType::Text)];
            &FIELDS
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Null]
        }

        fn from_values(_values: &[Value]) -> Result<Self> {
            Ok(Tag)
        }
    }

    fn label(s: &str) -> Vec<Value> {
        vec![Value::Text(s.to_string())]
    }

    #[test]
    fn test_materialize_preserves_identity() {
        let cache = IdentityCache::<Tag>::new();
        let first = cache.materialize_or_populate(1, label("a"));
        let second = cache.materialize_or_populate(1, label("b"));
        assert_eq!(first, second);
        assert_eq!(first.get("label").unwrap(), Value::Text("b".into()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces() {
        let cache = IdentityCache::<Tag>::new();
        let a = Entity::new(1, label("a"));
        let b = Entity::new(1, label("b"));
        assert!(cache.put(a.clone()).is_none());
        assert_eq!(cache.put(b.clone()), Some(a));
        assert_eq!(cache.get(&1), Some(b));
    }

    #[test]
    fn test_remove_all() {
        let cache = IdentityCache::<Tag>::new();
        cache.materialize_all(vec![(1, label("a")), (2, label("b")), (3, label("c"))]);
        let removed = cache.remove_all(&[1, 3, 4]);
        assert_eq!(removed.len(), 2);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert_eq!(cache.all_ids(), vec![2]);
    }

    #[test]
    fn test_concurrent_materialize_yields_one_instance() {
        let cache = Arc::new(IdentityCache::<Tag>::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.materialize_or_populate(42, label(&i.to_string())))
            })
            .collect();
        let entities: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(entities.iter().all(|e| *e == entities[0]));
        assert_eq!(cache.len(), 1);
    }
}
