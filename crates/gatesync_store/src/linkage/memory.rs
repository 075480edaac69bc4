//! In-memory linkage store.

use super::table::LinkageTable;
use super::{Linkage, LinkageStore};
use crate::error::{LinkageError, LinkageResult};
use crate::id::{EntityId, RemoteId};
use gatesync_codec::Record;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`LinkageStore`] that keeps rows in memory.
///
/// Writes can be made to fail with [`MemoryLinkageStore::set_fail_writes`]
/// to exercise the engine's handling of linkage persistence failures.
#[derive(Debug, Default)]
pub struct MemoryLinkageStore {
    table: RwLock<LinkageTable>,
    fail_writes: AtomicBool,
}

impl MemoryLinkageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all entity types.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes subsequent writes fail with [`LinkageError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> LinkageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(LinkageError::Unavailable("writes disabled".into()))
        } else {
            Ok(())
        }
    }
}

impl LinkageStore for MemoryLinkageStore {
    fn find(&self, entity_type: &str, remote_id: &RemoteId) -> LinkageResult<Option<Linkage>> {
        Ok(self.table.read().find(entity_type, remote_id).cloned())
    }

    fn find_by_local(
        &self,
        entity_type: &str,
        local_id: EntityId,
    ) -> LinkageResult<Option<Linkage>> {
        Ok(self.table.read().find_by_local(entity_type, local_id).cloned())
    }

    fn create(&self, linkage: Linkage) -> LinkageResult<()> {
        self.check_writable()?;
        self.table.write().insert(linkage)
    }

    fn update_snapshot(
        &self,
        entity_type: &str,
        local_id: EntityId,
        snapshot: Record,
    ) -> LinkageResult<()> {
        self.check_writable()?;
        self.table
            .write()
            .set_snapshot(entity_type, local_id, snapshot)
            .map(|_| ())
    }

    fn delete(&self, entity_type: &str, local_id: EntityId) -> LinkageResult<bool> {
        self.check_writable()?;
        Ok(self.table.write().remove(entity_type, local_id).is_some())
    }

    fn list(&self, entity_type: &str) -> LinkageResult<Vec<Linkage>> {
        Ok(self.table.read().list(entity_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_codec::Value;

    fn rid(s: &str) -> RemoteId {
        RemoteId::new(s).unwrap()
    }

    #[test]
    fn create_and_find_both_ways() {
        let store = MemoryLinkageStore::new();
        let local = EntityId::new();
        store
            .create(Linkage::new("book", local, rid("A"), Record::new()))
            .unwrap();

        assert_eq!(store.find("book", &rid("A")).unwrap().unwrap().local_id, local);
        assert_eq!(
            store.find_by_local("book", local).unwrap().unwrap().remote_id,
            rid("A")
        );
        // Scoped by entity type
        assert!(store.find("author", &rid("A")).unwrap().is_none());
    }

    #[test]
    fn uniqueness_constraints() {
        let store = MemoryLinkageStore::new();
        let local = EntityId::new();
        store
            .create(Linkage::new("book", local, rid("A"), Record::new()))
            .unwrap();

        let same_local = store.create(Linkage::new("book", local, rid("B"), Record::new()));
        assert!(matches!(same_local, Err(LinkageError::Duplicate { .. })));

        let same_remote =
            store.create(Linkage::new("book", EntityId::new(), rid("A"), Record::new()));
        assert!(matches!(same_remote, Err(LinkageError::Duplicate { .. })));

        // Same remote identity under another type is fine
        store
            .create(Linkage::new("author", EntityId::new(), rid("A"), Record::new()))
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn snapshot_update_and_delete() {
        let store = MemoryLinkageStore::new();
        let local = EntityId::new();
        store
            .create(Linkage::new("book", local, rid("A"), Record::new()))
            .unwrap();

        let mut snapshot = Record::new();
        snapshot.insert("title", "Dune");
        store.update_snapshot("book", local, snapshot).unwrap();
        assert_eq!(
            store.find("book", &rid("A")).unwrap().unwrap().snapshot.get("title"),
            Some(&Value::from("Dune"))
        );

        assert!(store.delete("book", local).unwrap());
        assert!(!store.delete("book", local).unwrap());
        assert!(store.find("book", &rid("A")).unwrap().is_none());
        assert!(matches!(
            store.update_snapshot("book", local, Record::new()),
            Err(LinkageError::NotFound { .. })
        ));
    }

    #[test]
    fn failing_writes() {
        let store = MemoryLinkageStore::new();
        store.set_fail_writes(true);
        let result = store.create(Linkage::new("book", EntityId::new(), rid("A"), Record::new()));
        assert!(matches!(result, Err(LinkageError::Unavailable(_))));
        assert!(store.is_empty());
    }
}
