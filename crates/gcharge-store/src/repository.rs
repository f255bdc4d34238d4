//! Generic record storage
//!
//! [`MemoryStore`] keeps records in a concurrent map and lists them in
//! insertion order. [`Repository`] is the async CRUD surface a persistent
//! backend would implement instead.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gcharge_types::{CockpitError, CockpitResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A record that can live in a store
pub trait Record: Clone + Send + Sync + 'static {
    /// Human readable kind used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Checked on create and on every update
    fn validate(&self) -> CockpitResult<()> {
        Ok(())
    }
}

/// Async CRUD over one record kind
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn create(&self, record: T) -> CockpitResult<()>;
    async fn get(&self, id: &str) -> CockpitResult<Option<T>>;
    async fn list(&self) -> CockpitResult<Vec<T>>;
    async fn update(&self, record: T) -> CockpitResult<()>;
    async fn delete(&self, id: &str) -> CockpitResult<T>;
}

struct Slot<T> {
    seq: u64,
    record: T,
}

/// In-memory store keyed by record id
pub struct MemoryStore<T: Record> {
    records: Arc<DashMap<String, Slot<T>>>,
    next_seq: Arc<AtomicU64>,
}

impl<T: Record> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            next_seq: Arc::clone(&self.next_seq),
        }
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert a new record
    pub fn create(&self, record: T) -> CockpitResult<()> {
        record.validate()?;
        match self.records.entry(record.id().to_string()) {
            Entry::Occupied(entry) => Err(CockpitError::already_exists(T::KIND, entry.key())),
            Entry::Vacant(entry) => {
                debug!("Creating {} {}", T::KIND, record.id());
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                entry.insert(Slot { seq, record });
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.records.get(id).map(|slot| slot.record.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// All records in insertion order
    pub fn list(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    /// Records matching `predicate`, in insertion order
    pub fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut slots: Vec<(u64, T)> = self
            .records
            .iter()
            .filter(|slot| predicate(&slot.record))
            .map(|slot| (slot.seq, slot.record.clone()))
            .collect();
        slots.sort_unstable_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, record)| record).collect()
    }

    /// Replace an existing record, keeping its position
    pub fn update(&self, record: T) -> CockpitResult<()> {
        record.validate()?;
        match self.records.get_mut(record.id()) {
            Some(mut slot) => {
                debug!("Updating {} {}", T::KIND, record.id());
                slot.record = record;
                Ok(())
            }
            None => Err(CockpitError::not_found(T::KIND, record.id())),
        }
    }

    /// Apply `change` to a record in place and return the result
    ///
    /// The change is rolled back if the record no longer validates.
    pub fn modify<F>(&self, id: &str, change: F) -> CockpitResult<T>
    where
        F: FnOnce(&mut T),
    {
        self.try_modify(id, |record| {
            change(record);
            Ok(())
        })
    }

    /// Like [`MemoryStore::modify`], but `change` may refuse the edit
    pub fn try_modify<F>(&self, id: &str, change: F) -> CockpitResult<T>
    where
        F: FnOnce(&mut T) -> CockpitResult<()>,
    {
        let mut slot = self
            .records
            .get_mut(id)
            .ok_or_else(|| CockpitError::not_found(T::KIND, id))?;

        let mut record = slot.record.clone();
        change(&mut record)?;
        record.validate()?;
        if record.id() != id {
            return Err(CockpitError::validation("id", "cannot be changed"));
        }

        debug!("Modified {} {}", T::KIND, id);
        slot.record = record.clone();
        Ok(record)
    }

    pub fn delete(&self, id: &str) -> CockpitResult<T> {
        match self.records.remove(id) {
            Some((_, slot)) => {
                debug!("Deleted {} {}", T::KIND, id);
                Ok(slot.record)
            }
            None => Err(CockpitError::not_found(T::KIND, id)),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryStore<T> {
    async fn create(&self, record: T) -> CockpitResult<()> {
        MemoryStore::create(self, record)
    }

    async fn get(&self, id: &str) -> CockpitResult<Option<T>> {
        Ok(MemoryStore::get(self, id))
    }

    async fn list(&self) -> CockpitResult<Vec<T>> {
        Ok(MemoryStore::list(self))
    }

    async fn update(&self, record: T) -> CockpitResult<()> {
        MemoryStore::update(self, record)
    }

    async fn delete(&self, id: &str) -> CockpitResult<T> {
        MemoryStore::delete(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: String,
        label: String,
    }

    impl Record for Tag {
        const KIND: &'static str = "tag";

        fn id(&self) -> &str {
            &self.id
        }

        fn validate(&self) -> CockpitResult<()> {
            if self.label.is_empty() {
                return Err(CockpitError::validation("label", "must not be empty"));
            }
            Ok(())
        }
    }

    fn tag(id: &str, label: &str) -> Tag {
        Tag {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_create_and_list_in_insertion_order() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.create(tag(id, id)).unwrap();
        }

        let ids: Vec<String> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.len(), 3);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let store = MemoryStore::new();
        store.create(tag("a", "first")).unwrap();

        let err = store.create(tag("a", "second")).unwrap_err();
        assert_eq!(err, CockpitError::already_exists("tag", "a"));
        assert_eq!(store.get("a").unwrap().label, "first");
    }

    #[test]
    fn test_update_keeps_position() {
        let store = MemoryStore::new();
        store.create(tag("a", "a")).unwrap();
        store.create(tag("b", "b")).unwrap();

        store.update(tag("a", "renamed")).unwrap();
        let list = store.list();
        assert_eq!(list[0], tag("a", "renamed"));

        let err = store.update(tag("z", "z")).unwrap_err();
        assert_eq!(err, CockpitError::not_found("tag", "z"));
    }

    #[test]
    fn test_modify_rolls_back_invalid_change() {
        let store = MemoryStore::new();
        store.create(tag("a", "a")).unwrap();

        let updated = store.modify("a", |t| t.label = "b".to_string()).unwrap();
        assert_eq!(updated.label, "b");

        assert!(store.modify("a", |t| t.label.clear()).is_err());
        assert!(store.modify("a", |t| t.id = "x".to_string()).is_err());
        assert_eq!(store.get("a").unwrap().label, "b");

        assert!(store.modify("missing", |_| {}).is_err());
    }

    #[test]
    fn test_invalid_record_rejected() {
        let store = MemoryStore::new();
        assert!(store.create(tag("a", "")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.create(tag("a", "a")).unwrap();

        assert_eq!(store.delete("a").unwrap(), tag("a", "a"));
        assert!(store.get("a").is_none());
        assert!(store.delete("a").is_err());
    }

    #[tokio::test]
    async fn test_repository_trait() {
        let store: MemoryStore<Tag> = MemoryStore::new();
        let repo: &dyn Repository<Tag> = &store;

        repo.create(tag("a", "a")).await.unwrap();
        assert_eq!(repo.get("a").await.unwrap(), Some(tag("a", "a")));
        assert_eq!(repo.list().await.unwrap().len(), 1);

        repo.update(tag("a", "b")).await.unwrap();
        assert_eq!(repo.delete("a").await.unwrap().label, "b");
        assert!(repo.get("a").await.unwrap().is_none());
    }

    #[test]
    fn test_clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.create(tag("a", "a")).unwrap();
        assert!(other.contains("a"));
    }
}
