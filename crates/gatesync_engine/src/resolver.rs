//! Identity linkage resolution.
//!
//! The resolver answers "does this remote record already have a local
//! counterpart?" and keeps the linkage rows in step with the writes the
//! worker performs.
//!
//! # Invariants
//!
//! - A row is created exactly once per newly created local entity
//! - A row whose local entity has disappeared is removed on lookup

use crate::error::{SyncError, SyncResult};
use gatesync_codec::Record;
use gatesync_store::{EntityId, Linkage, LinkageStore, LocalStore, RemoteId};
use tracing::warn;

/// Resolves remote identities to local entities through a [`LinkageStore`].
#[derive(Clone, Copy)]
pub struct IdentityResolver<'a> {
    store: &'a dyn LocalStore,
    linkage: &'a dyn LinkageStore,
}

impl<'a> IdentityResolver<'a> {
    /// Creates a resolver over a local store and its linkage table.
    pub fn new(store: &'a dyn LocalStore, linkage: &'a dyn LinkageStore) -> Self {
        Self { store, linkage }
    }

    /// Returns the local entity linked to a remote identity, if any.
    ///
    /// A stale row, whose local entity no longer exists, is deleted and
    /// reported as no match.
    ///
    /// # Errors
    ///
    /// Propagates linkage and store failures; both are run-fatal.
    pub fn resolve(&self, entity_type: &str, remote_id: &RemoteId) -> SyncResult<Option<EntityId>> {
        let Some(row) = self.linkage.find(entity_type, remote_id)? else {
            return Ok(None);
        };
        if self.store.exists(entity_type, row.local_id)? {
            return Ok(Some(row.local_id));
        }

        warn!(
            entity_type,
            remote_id = %remote_id,
            local_id = %row.local_id,
            "removing stale linkage, local entity is gone"
        );
        self.linkage.delete(entity_type, row.local_id)?;
        Ok(None)
    }

    /// Records the linkage of a newly created entity.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LinkagePersist`] (record-fatal) if the row
    /// cannot be written.
    pub fn link(
        &self,
        entity_type: &str,
        local_id: EntityId,
        remote_id: &RemoteId,
        attrs: &Record,
    ) -> SyncResult<()> {
        self.linkage
            .create(Linkage::new(entity_type, local_id, remote_id.clone(), attrs.clone()))
            .map_err(|source| SyncError::LinkagePersist {
                entity_type: entity_type.to_string(),
                remote_id: remote_id.clone(),
                source,
            })
    }

    /// Replaces the snapshot of an existing row after an update.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LinkagePersist`] (record-fatal) if the row
    /// cannot be written.
    pub fn refresh(
        &self,
        entity_type: &str,
        local_id: EntityId,
        remote_id: &RemoteId,
        attrs: &Record,
    ) -> SyncResult<()> {
        self.linkage
            .update_snapshot(entity_type, local_id, attrs.clone())
            .map_err(|source| SyncError::LinkagePersist {
                entity_type: entity_type.to_string(),
                remote_id: remote_id.clone(),
                source,
            })
    }

    /// Removes the row of a destroyed entity. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Propagates linkage failures.
    pub fn unlink(&self, entity_type: &str, local_id: EntityId) -> SyncResult<bool> {
        Ok(self.linkage.delete(entity_type, local_id)?)
    }

    /// Every row of an entity type.
    ///
    /// # Errors
    ///
    /// Propagates linkage failures.
    pub fn linked(&self, entity_type: &str) -> SyncResult<Vec<Linkage>> {
        Ok(self.linkage.list(entity_type)?)
    }
}
