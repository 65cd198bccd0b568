//! Per-kind record storage
//!
//! A [`Store`] maps live handles of one kind to their records. It is keyed by
//! the handle's generational slot key, so a stale handle misses instead of
//! reading whatever now occupies the slot.

use slotmap::SecondaryMap;

use crate::error::{ServerError, ServerResult};
use crate::resources::handle::{ResourceKind, Rid, RidKey};

/// Typed record table for one [`ResourceKind`]
#[derive(Debug)]
pub struct Store<T> {
    kind: ResourceKind,
    records: SecondaryMap<RidKey, T>,
}

impl<T> Store<T> {
    /// Create an empty store for `kind`
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind, records: SecondaryMap::new() }
    }

    /// Kind of record held by this store
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Insert the record for a freshly allocated handle
    pub fn insert(&mut self, rid: Rid, record: T) {
        self.records.insert(rid.key(), record);
    }

    /// Borrow a record, failing with an invalid-handle error on a miss
    pub fn get(&self, rid: Rid) -> ServerResult<&T> {
        self.records
            .get(rid.key())
            .ok_or_else(|| ServerError::invalid_handle(self.kind, rid))
    }

    /// Mutably borrow a record, failing with an invalid-handle error on a miss
    pub fn get_mut(&mut self, rid: Rid) -> ServerResult<&mut T> {
        let kind = self.kind;
        self.records
            .get_mut(rid.key())
            .ok_or_else(|| ServerError::invalid_handle(kind, rid))
    }

    /// Resolve a weak reference; a miss is "absent", not an error
    pub fn resolve(&self, rid: Rid) -> Option<&T> {
        self.records.get(rid.key())
    }

    /// Mutable counterpart of [`Store::resolve`]
    pub fn resolve_mut(&mut self, rid: Rid) -> Option<&mut T> {
        self.records.get_mut(rid.key())
    }

    /// Remove and return a record
    pub fn remove(&mut self, rid: Rid) -> Option<T> {
        self.records.remove(rid.key())
    }

    /// Whether a record exists for the handle
    pub fn contains(&self, rid: Rid) -> bool {
        self.records.contains_key(rid.key())
    }

    /// Iterate over every record (slot order, not creation order)
    pub fn iter(&self) -> impl Iterator<Item = (Rid, &T)> {
        self.records.iter().map(|(key, record)| (Rid::from(key), record))
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::handle::HandleRegistry;

    #[test]
    fn test_store_get_and_remove() {
        let mut registry = HandleRegistry::new();
        let mut store = Store::new(ResourceKind::Skeleton);
        let rid = registry.allocate(ResourceKind::Skeleton);
        store.insert(rid, 7_u32);

        assert_eq!(store.get(rid), Ok(&7));
        *store.get_mut(rid).expect("record") = 9;
        assert_eq!(store.resolve(rid), Some(&9));
        assert_eq!(store.remove(rid), Some(9));
        assert!(!store.contains(rid));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_handle_misses() {
        let mut registry = HandleRegistry::new();
        let mut store = Store::new(ResourceKind::Texture);

        let old = registry.allocate(ResourceKind::Texture);
        store.insert(old, "old");
        store.remove(old);
        registry.release(old).expect("release");

        let new = registry.allocate(ResourceKind::Texture);
        store.insert(new, "new");

        assert_eq!(
            store.get(old),
            Err(ServerError::InvalidHandle { kind: Some(ResourceKind::Texture), rid: old })
        );
        assert_eq!(store.get(new), Ok(&"new"));
    }
}
