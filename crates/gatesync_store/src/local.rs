//! Local entity store trait definition.

use crate::error::StoreResult;
use crate::id::EntityId;
use gatesync_codec::Record;

/// The local persistent store that synchronized entities are written to.
///
/// Entities are grouped by entity type (a table, a collection, a model
/// name). The store assigns entity IDs on create and owns validation of
/// the attributes it is given.
///
/// # Invariants
///
/// - `create` returns a fresh ID that is never reused
/// - `update` replaces every field present in `attrs` and keeps the others
/// - Validation failures are reported as [`crate::StoreError::Validation`]
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For tests and ephemeral use
pub trait LocalStore: Send + Sync {
    /// Creates an entity and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `attrs` are rejected.
    fn create(&self, entity_type: &str, attrs: &Record) -> StoreResult<EntityId>;

    /// Updates the fields of an existing entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist or the resulting
    /// attributes are rejected.
    fn update(&self, entity_type: &str, id: EntityId, attrs: &Record) -> StoreResult<()>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    fn delete(&self, entity_type: &str, id: EntityId) -> StoreResult<()>;

    /// Reads an entity's attributes.
    fn get(&self, entity_type: &str, id: EntityId) -> StoreResult<Option<Record>>;

    /// Counts the entities of a type.
    fn count(&self, entity_type: &str) -> StoreResult<usize>;

    /// Checks if an entity exists.
    fn exists(&self, entity_type: &str, id: EntityId) -> StoreResult<bool> {
        Ok(self.get(entity_type, id)?.is_some())
    }
}
