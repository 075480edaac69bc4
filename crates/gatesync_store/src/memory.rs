//! In-memory local store.

use crate::error::{StoreError, StoreResult};
use crate::id::EntityId;
use crate::local::LocalStore;
use gatesync_codec::Record;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory [`LocalStore`].
///
/// This store keeps all entities in memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral mirrors that don't need persistence
///
/// Validation is limited to required fields registered per entity type
/// with [`MemoryStore::require_fields`]. A required field must be present
/// and non-blank after the write.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use gatesync_codec::Record;
/// use gatesync_store::{LocalStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// let mut attrs = Record::new();
/// attrs.insert("title", "Dune");
///
/// let id = store.create("book", &attrs).unwrap();
/// assert_eq!(store.count("book").unwrap(), 1);
/// assert!(store.exists("book", id).unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<EntityId, Record>>>,
    required: RwLock<HashMap<String, Vec<String>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers fields that every entity of `entity_type` must carry.
    pub fn require_fields<I, S>(&self, entity_type: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required
            .write()
            .insert(entity_type.to_string(), fields.into_iter().map(Into::into).collect());
    }

    /// Inserts an entity directly, bypassing validation.
    ///
    /// Useful for seeding tests with pre-existing local data.
    pub fn insert_raw(&self, entity_type: &str, attrs: Record) -> EntityId {
        let id = EntityId::new();
        self.tables
            .write()
            .entry(entity_type.to_string())
            .or_default()
            .insert(id, attrs);
        id
    }

    /// Returns every entity of a type.
    pub fn all(&self, entity_type: &str) -> Vec<(EntityId, Record)> {
        self.tables
            .read()
            .get(entity_type)
            .map(|t| t.iter().map(|(id, r)| (*id, r.clone())).collect())
            .unwrap_or_default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn validate(&self, entity_type: &str, attrs: &Record) -> StoreResult<()> {
        let required = self.required.read();
        let Some(fields) = required.get(entity_type) else {
            return Ok(());
        };

        let missing: Vec<&str> = fields
            .iter()
            .filter(|f| attrs.get(f).map_or(true, |v| v.is_blank()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::validation(
                entity_type,
                format!("missing required fields: {}", missing.join(", ")),
            ))
        }
    }

    fn not_found(entity_type: &str, id: EntityId) -> StoreError {
        StoreError::NotFound {
            entity_type: entity_type.to_string(),
            id,
        }
    }
}

impl LocalStore for MemoryStore {
    fn create(&self, entity_type: &str, attrs: &Record) -> StoreResult<EntityId> {
        self.check_available()?;
        self.validate(entity_type, attrs)?;
        Ok(self.insert_raw(entity_type, attrs.clone()))
    }

    fn update(&self, entity_type: &str, id: EntityId, attrs: &Record) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let current = tables
            .get_mut(entity_type)
            .and_then(|t| t.get_mut(&id))
            .ok_or_else(|| Self::not_found(entity_type, id))?;

        let mut next = current.clone();
        next.merge(attrs);
        self.validate(entity_type, &next)?;
        *current = next;
        Ok(())
    }

    fn delete(&self, entity_type: &str, id: EntityId) -> StoreResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .get_mut(entity_type)
            .and_then(|t| t.remove(&id))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(entity_type, id))
    }

    fn get(&self, entity_type: &str, id: EntityId) -> StoreResult<Option<Record>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .get(entity_type)
            .and_then(|t| t.get(&id))
            .cloned())
    }

    fn count(&self, entity_type: &str) -> StoreResult<usize> {
        self.check_available()?;
        Ok(self.tables.read().get(entity_type).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_codec::Value;

    fn attrs(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn create_get_count() {
        let store = MemoryStore::new();
        let id = store
            .create("book", &attrs(&[("title", Value::from("Dune"))]))
            .unwrap();

        assert_eq!(store.count("book").unwrap(), 1);
        assert_eq!(store.count("author").unwrap(), 0);
        assert_eq!(
            store.get("book", id).unwrap().unwrap().get("title"),
            Some(&Value::from("Dune"))
        );
    }

    #[test]
    fn update_replaces_present_fields_only() {
        let store = MemoryStore::new();
        let id = store
            .create(
                "book",
                &attrs(&[("title", Value::from("Dune")), ("pages", Value::from(400))]),
            )
            .unwrap();

        store
            .update("book", id, &attrs(&[("pages", Value::from(412))]))
            .unwrap();

        let stored = store.get("book", id).unwrap().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("Dune")));
        assert_eq!(stored.get("pages"), Some(&Value::from(412)));
    }

    #[test]
    fn required_fields_are_validated() {
        let store = MemoryStore::new();
        store.require_fields("book", ["title"]);

        let err = store
            .create("book", &attrs(&[("title", Value::from("  "))]))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("title"));
        assert_eq!(store.count("book").unwrap(), 0);

        let id = store
            .create("book", &attrs(&[("title", Value::from("Dune"))]))
            .unwrap();
        let err = store
            .update("book", id, &attrs(&[("title", Value::Null)]))
            .unwrap_err();
        assert!(err.is_validation());
        // Rejected update leaves the entity untouched
        assert_eq!(
            store.get("book", id).unwrap().unwrap().get("title"),
            Some(&Value::from("Dune"))
        );
    }

    #[test]
    fn missing_entities() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        assert!(matches!(
            store.update("book", id, &Record::new()),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete("book", id),
            Err(StoreError::NotFound { .. })
        ));
        assert!(!store.exists("book", id).unwrap());
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.count("book"),
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.count("book").unwrap(), 0);
    }
}
