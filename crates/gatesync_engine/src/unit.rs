//! Sync units.
//!
//! A [`SyncUnit`] binds one raw remote record to everything the worker
//! needs to synchronize it: its remote identity, the mapped local
//! attributes, the resolved local entity and the association identities
//! found inside the record.
//!
//! Units are immutable once built, except for the local ID which is set
//! exactly once when the entity is created. Units created for association
//! runs borrow the unit that triggered them as their parent, so the chain
//! of ancestors is available to hooks and to the cycle guard.

use crate::error::SyncResult;
use crate::mapping::{MappingConfig, Registry};
use crate::resolver::IdentityResolver;
use gatesync_codec::{Record, Value};
use gatesync_store::{EntityId, RemoteId, RemoteIdError};
use tracing::debug;

/// The identities found for one declared association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRefs {
    /// Association name.
    pub name: String,
    /// Entity type the identities belong to.
    pub target_type: String,
    /// Identities in source-field order.
    pub remote_ids: Vec<RemoteId>,
}

/// One raw remote record being synchronized.
#[derive(Debug)]
pub struct SyncUnit<'p> {
    entity_type: String,
    parent: Option<&'p SyncUnit<'p>>,
    raw: Record,
    remote_id: RemoteId,
    attributes: Record,
    local_id: Option<EntityId>,
    is_update: bool,
    associations: Vec<AssociationRefs>,
}

impl<'p> SyncUnit<'p> {
    /// Builds a unit: extracts the identity, maps the attributes, collects
    /// association identities and resolves the linkage.
    ///
    /// # Errors
    ///
    /// Identity errors are record-fatal. An association whose target type
    /// is not registered, and linkage lookup failures, are run-fatal.
    pub(crate) fn build(
        config: &MappingConfig,
        registry: &Registry,
        raw: Record,
        parent: Option<&'p SyncUnit<'p>>,
        resolver: &IdentityResolver<'_>,
    ) -> SyncResult<Self> {
        let mut fields = raw.clone();
        let remote_id = config.extract_identity(&mut fields)?;
        let attributes = config.map_attributes(&fields);
        let associations = extract_associations(config, registry, &raw)?;
        let local_id = resolver.resolve(config.entity_type(), &remote_id)?;

        Ok(Self {
            entity_type: config.entity_type().to_string(),
            parent,
            raw,
            remote_id,
            attributes,
            is_update: local_id.is_some(),
            local_id,
            associations,
        })
    }

    /// Entity type of the record.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The unit whose association triggered this one.
    pub fn parent(&self) -> Option<&'p SyncUnit<'p>> {
        self.parent
    }

    /// The raw record as received, identity field included.
    pub fn raw(&self) -> &Record {
        &self.raw
    }

    /// Remote identity of the record.
    pub fn remote_id(&self) -> &RemoteId {
        &self.remote_id
    }

    /// Mapped local attributes.
    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    /// The local entity, once resolved or created.
    pub fn local_id(&self) -> Option<EntityId> {
        self.local_id
    }

    /// True if a linked local entity existed when the unit was built.
    pub fn is_update(&self) -> bool {
        self.is_update
    }

    /// Association identities, in declaration order.
    pub fn associations(&self) -> &[AssociationRefs] {
        &self.associations
    }

    /// Identities found for one association.
    pub fn association(&self, name: &str) -> Option<&[RemoteId]> {
        self.associations
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.remote_ids.as_slice())
    }

    /// Parent, grandparent and so on up to the root unit.
    pub fn ancestors(&self) -> impl Iterator<Item = &'p SyncUnit<'p>> {
        std::iter::successors(self.parent, |unit| unit.parent)
    }

    /// Number of ancestors. Root units are at depth 0.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Returns true if this unit or an ancestor is the given record.
    pub fn is_on_path(&self, entity_type: &str, remote_id: &RemoteId) -> bool {
        let is_record =
            |unit: &SyncUnit<'_>| unit.entity_type == entity_type && unit.remote_id == *remote_id;
        is_record(self) || self.ancestors().any(&is_record)
    }

    pub(crate) fn mark_created(&mut self, local_id: EntityId) {
        debug_assert!(self.local_id.is_none(), "local id already set");
        self.local_id = Some(local_id);
    }
}

fn extract_associations(
    config: &MappingConfig,
    registry: &Registry,
    raw: &Record,
) -> SyncResult<Vec<AssociationRefs>> {
    config
        .associations()
        .iter()
        .map(|association| {
            let target = registry.get(&association.target_type)?;
            let mut remote_ids = Vec::new();
            for field in &association.source_fields {
                if let Some(value) = raw.get(field) {
                    collect_identities(value, target.remote_identity_field(), &mut remote_ids);
                }
            }
            Ok(AssociationRefs {
                name: association.name.clone(),
                target_type: association.target_type.clone(),
                remote_ids,
            })
        })
        .collect()
}

fn collect_identities(value: &Value, identity_field: &str, out: &mut Vec<RemoteId>) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_identity(embedded_identity(item, identity_field), out);
            }
        }
        other => push_identity(embedded_identity(other, identity_field), out),
    }
}

/// Embedded records contribute the value of their identity field.
fn embedded_identity<'v>(value: &'v Value, identity_field: &str) -> &'v Value {
    match value {
        Value::Map(record) => record.get(identity_field).unwrap_or(&Value::Null),
        other => other,
    }
}

fn push_identity(value: &Value, out: &mut Vec<RemoteId>) {
    match RemoteId::from_value(value) {
        Ok(remote_id) => out.push(remote_id),
        Err(RemoteIdError::Missing) => {}
        Err(RemoteIdError::Unsupported(kind)) => {
            debug!(kind, "skipping association element that cannot be an identity");
        }
    }
}
