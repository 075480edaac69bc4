//! Identity linkage: which local entity was synchronized from which remote
//! record.
//!
//! A linkage row ties a local entity (type + ID) to the remote identity it
//! came from, together with the last attribute snapshot written for it. The
//! sync engine consults these rows to decide between create and update.
//!
//! # Invariants
//!
//! - At most one row per (entity type, local ID)
//! - At most one row per (entity type, remote identity)
//! - Rows are only removed together with their local entity

mod file;
mod memory;
mod table;

pub use file::FileLinkageStore;
pub use memory::MemoryLinkageStore;

use crate::error::LinkageResult;
use crate::id::{EntityId, RemoteId};
use gatesync_codec::Record;

/// A single identity linkage row.
#[derive(Debug, Clone, PartialEq)]
pub struct Linkage {
    /// Local entity type.
    pub entity_type: String,
    /// Local entity ID.
    pub local_id: EntityId,
    /// Remote identity the entity was synchronized from.
    pub remote_id: RemoteId,
    /// Mapped attributes written on the last sync.
    pub snapshot: Record,
}

impl Linkage {
    /// Creates a linkage row.
    pub fn new(
        entity_type: impl Into<String>,
        local_id: EntityId,
        remote_id: RemoteId,
        snapshot: Record,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            local_id,
            remote_id,
            snapshot,
        }
    }
}

/// Persistent storage for [`Linkage`] rows.
///
/// # Implementors
///
/// - [`MemoryLinkageStore`] - For tests
/// - [`FileLinkageStore`] - Journal file, survives restarts
pub trait LinkageStore: Send + Sync {
    /// Finds the row for a remote identity.
    fn find(&self, entity_type: &str, remote_id: &RemoteId) -> LinkageResult<Option<Linkage>>;

    /// Finds the row owned by a local entity.
    fn find_by_local(&self, entity_type: &str, local_id: EntityId)
        -> LinkageResult<Option<Linkage>>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkageError::Duplicate`] if either key is taken.
    fn create(&self, linkage: Linkage) -> LinkageResult<()>;

    /// Replaces the snapshot of an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LinkageError::NotFound`] if no row exists.
    fn update_snapshot(
        &self,
        entity_type: &str,
        local_id: EntityId,
        snapshot: Record,
    ) -> LinkageResult<()>;

    /// Removes the row owned by a local entity. Returns whether one existed.
    fn delete(&self, entity_type: &str, local_id: EntityId) -> LinkageResult<bool>;

    /// Lists every row of an entity type.
    fn list(&self, entity_type: &str) -> LinkageResult<Vec<Linkage>>;
}
