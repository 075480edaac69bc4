//! Indexed in-memory linkage table shared by the store implementations.

use super::Linkage;
use crate::error::{LinkageError, LinkageResult};
use crate::id::{EntityId, RemoteId};
use gatesync_codec::Record;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct LinkageTable {
    rows: HashMap<(String, EntityId), Linkage>,
    by_remote: HashMap<(String, RemoteId), EntityId>,
}

impl LinkageTable {
    pub(crate) fn find(&self, entity_type: &str, remote_id: &RemoteId) -> Option<&Linkage> {
        let local_id = self
            .by_remote
            .get(&(entity_type.to_string(), remote_id.clone()))?;
        self.rows.get(&(entity_type.to_string(), *local_id))
    }

    pub(crate) fn find_by_local(&self, entity_type: &str, local_id: EntityId) -> Option<&Linkage> {
        self.rows.get(&(entity_type.to_string(), local_id))
    }

    /// Checks both uniqueness constraints without inserting.
    pub(crate) fn check_insert(&self, linkage: &Linkage) -> LinkageResult<()> {
        if self
            .rows
            .contains_key(&(linkage.entity_type.clone(), linkage.local_id))
        {
            return Err(LinkageError::Duplicate {
                entity_type: linkage.entity_type.clone(),
                key: format!("local id {}", linkage.local_id),
            });
        }
        if self
            .by_remote
            .contains_key(&(linkage.entity_type.clone(), linkage.remote_id.clone()))
        {
            return Err(LinkageError::Duplicate {
                entity_type: linkage.entity_type.clone(),
                key: format!("remote id {}", linkage.remote_id),
            });
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, linkage: Linkage) -> LinkageResult<()> {
        self.check_insert(&linkage)?;
        self.put(linkage);
        Ok(())
    }

    /// Inserts or replaces a row without constraint checks. Used when
    /// replaying a journal whose entries were checked when written.
    pub(crate) fn put(&mut self, linkage: Linkage) {
        let key = (linkage.entity_type.clone(), linkage.local_id);
        if let Some(previous) = self.rows.get(&key) {
            self.by_remote
                .remove(&(previous.entity_type.clone(), previous.remote_id.clone()));
        }
        self.by_remote.insert(
            (linkage.entity_type.clone(), linkage.remote_id.clone()),
            linkage.local_id,
        );
        self.rows.insert(key, linkage);
    }

    pub(crate) fn set_snapshot(
        &mut self,
        entity_type: &str,
        local_id: EntityId,
        snapshot: Record,
    ) -> LinkageResult<&Linkage> {
        let row = self
            .rows
            .get_mut(&(entity_type.to_string(), local_id))
            .ok_or_else(|| LinkageError::NotFound {
                entity_type: entity_type.to_string(),
                local_id,
            })?;
        row.snapshot = snapshot;
        Ok(row)
    }

    pub(crate) fn remove(&mut self, entity_type: &str, local_id: EntityId) -> Option<Linkage> {
        let row = self.rows.remove(&(entity_type.to_string(), local_id))?;
        self.by_remote
            .remove(&(row.entity_type.clone(), row.remote_id.clone()));
        Some(row)
    }

    pub(crate) fn list(&self, entity_type: &str) -> Vec<Linkage> {
        let mut rows: Vec<Linkage> = self
            .rows
            .values()
            .filter(|l| l.entity_type == entity_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        rows
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &Linkage> {
        self.rows.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}
