//! Per-entity-type mapping configuration.
//!
//! A [`MappingConfig`] declares how raw remote records of one entity type
//! become local attributes: which field carries the remote identity, how
//! fields are renamed and filtered, which defaults apply, which associations
//! to follow, and which hooks to run around each step.
//!
//! # Mapping pipeline
//!
//! [`MappingConfig::map_attributes`] applies, in this order:
//!
//! 1. rename through the field mapping (an absent target drops the field)
//! 2. keep only `only` fields, if any are listed
//! 3. drop `except` fields
//! 4. insert defaults for fields still missing, unless the lists in 2 and 3
//!    exclude them
//!
//! # Example
//!
//! ```
//! use gatesync_codec::{Record, Value};
//! use gatesync_engine::MappingConfig;
//!
//! let config = MappingConfig::builder("book")
//!     .map("name", "title")
//!     .drop_field("internal_code")
//!     .default_value("status", "active")
//!     .build()
//!     .unwrap();
//!
//! let mut raw = Record::new();
//! raw.insert("id", 7);
//! raw.insert("name", "Dune");
//! raw.insert("internal_code", "X-1");
//!
//! let remote_id = config.extract_identity(&mut raw).unwrap();
//! assert_eq!(remote_id.as_str(), "7");
//!
//! let attrs = config.map_attributes(&raw);
//! assert_eq!(attrs.get("title"), Some(&Value::from("Dune")));
//! assert_eq!(attrs.get("status"), Some(&Value::from("active")));
//! assert!(!attrs.contains_key("internal_code"));
//! ```

use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::unit::SyncUnit;
use gatesync_codec::{Record, Value};
use gatesync_store::{RemoteId, RemoteIdError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity field used when none is configured.
pub const DEFAULT_IDENTITY_FIELD: &str = "id";

/// Produces the batch of raw records for an entity type.
pub type FetchHook = Arc<dyn Fn() -> SyncResult<Vec<Record>> + Send + Sync>;

/// Looks up one raw record by remote identity.
pub type FindByIdHook = Arc<dyn Fn(&RemoteId) -> SyncResult<Option<Record>> + Send + Sync>;

/// Runs before a step. Returning `false` skips the step.
pub type BeforeHook = Arc<dyn Fn(&SyncUnit<'_>) -> bool + Send + Sync>;

/// Runs after a step completed.
pub type AfterHook = Arc<dyn Fn(&SyncUnit<'_>) + Send + Sync>;

/// Runs before one association item is synchronized, with the association
/// name and the item's remote identity. Returning `false` skips the item.
pub type BeforeAssociationHook = Arc<dyn Fn(&SyncUnit<'_>, &str, &RemoteId) -> bool + Send + Sync>;

/// Runs after one association item was synchronized.
pub type AfterAssociationHook = Arc<dyn Fn(&SyncUnit<'_>, &str, &RemoteId) + Send + Sync>;

/// A statically declared association to another entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    /// Association name, unique within the configuration.
    pub name: String,
    /// Entity type of the associated records.
    pub target_type: String,
    /// Raw fields holding the associated identities, scanned in order.
    pub source_fields: Vec<String>,
}

impl AssociationDescriptor {
    /// Creates a descriptor.
    pub fn new<I, S>(name: impl Into<String>, target_type: impl Into<String>, source_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            source_fields: source_fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lifecycle hooks of a configuration. Absent hooks always proceed.
#[derive(Clone, Default)]
pub struct Hooks {
    before_sync: Option<BeforeHook>,
    after_sync: Option<AfterHook>,
    before_record_sync: Option<BeforeHook>,
    after_record_sync: Option<AfterHook>,
    before_association_sync: Option<BeforeAssociationHook>,
    after_association_sync: Option<AfterAssociationHook>,
}

impl Hooks {
    pub(crate) fn run_before_sync(&self, unit: &SyncUnit<'_>) -> bool {
        self.before_sync.as_ref().map_or(true, |hook| hook(unit))
    }

    pub(crate) fn run_after_sync(&self, unit: &SyncUnit<'_>) {
        if let Some(hook) = &self.after_sync {
            hook(unit);
        }
    }

    pub(crate) fn run_before_record_sync(&self, unit: &SyncUnit<'_>) -> bool {
        self.before_record_sync.as_ref().map_or(true, |hook| hook(unit))
    }

    pub(crate) fn run_after_record_sync(&self, unit: &SyncUnit<'_>) {
        if let Some(hook) = &self.after_record_sync {
            hook(unit);
        }
    }

    pub(crate) fn run_before_association_sync(
        &self,
        unit: &SyncUnit<'_>,
        name: &str,
        remote_id: &RemoteId,
    ) -> bool {
        self.before_association_sync
            .as_ref()
            .map_or(true, |hook| hook(unit, name, remote_id))
    }

    pub(crate) fn run_after_association_sync(
        &self,
        unit: &SyncUnit<'_>,
        name: &str,
        remote_id: &RemoteId,
    ) {
        if let Some(hook) = &self.after_association_sync {
            hook(unit, name, remote_id);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_sync", &self.before_sync.is_some())
            .field("after_sync", &self.after_sync.is_some())
            .field("before_record_sync", &self.before_record_sync.is_some())
            .field("after_record_sync", &self.after_record_sync.is_some())
            .field("before_association_sync", &self.before_association_sync.is_some())
            .field("after_association_sync", &self.after_association_sync.is_some())
            .finish()
    }
}

/// Synchronization rules for one local entity type.
///
/// Built with [`MappingConfig::builder`] and immutable afterwards.
#[derive(Clone)]
pub struct MappingConfig {
    entity_type: String,
    remote_identity_field: String,
    field_mapping: Vec<(String, Option<String>)>,
    only: Vec<String>,
    except: Vec<String>,
    defaults: Vec<(String, Value)>,
    destroy_missing: bool,
    associations: Vec<AssociationDescriptor>,
    fetch: Option<FetchHook>,
    find_by_id: Option<FindByIdHook>,
    hooks: Hooks,
}

impl MappingConfig {
    /// Starts building a configuration for an entity type.
    pub fn builder(entity_type: impl Into<String>) -> MappingConfigBuilder {
        MappingConfigBuilder::new(entity_type)
    }

    /// Local entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Raw field holding the remote identity.
    pub fn remote_identity_field(&self) -> &str {
        &self.remote_identity_field
    }

    /// Whether unseen linked entities are deleted after a root run.
    pub fn destroy_missing(&self) -> bool {
        self.destroy_missing
    }

    /// Declared associations, in declaration order.
    pub fn associations(&self) -> &[AssociationDescriptor] {
        &self.associations
    }

    /// Lifecycle hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// The batch producer, if configured.
    pub fn fetch_hook(&self) -> Option<&FetchHook> {
        self.fetch.as_ref()
    }

    /// The single-record lookup, if configured.
    pub fn find_by_id_hook(&self) -> Option<&FindByIdHook> {
        self.find_by_id.as_ref()
    }

    /// Removes the identity field from `raw` and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingRemoteIdentity`] if the field is absent or
    /// blank and [`SyncError::UnsupportedRemoteIdentity`] if its value cannot
    /// identify a record. Both are record-fatal.
    pub fn extract_identity(&self, raw: &mut Record) -> SyncResult<RemoteId> {
        let value = raw.remove(&self.remote_identity_field).unwrap_or(Value::Null);
        RemoteId::from_value(&value).map_err(|e| self.identity_error(e))
    }

    /// Reads the remote identity without modifying the record.
    ///
    /// Returns `None` where [`MappingConfig::extract_identity`] would fail.
    pub fn peek_identity(&self, raw: &Record) -> Option<RemoteId> {
        raw.get(&self.remote_identity_field)
            .and_then(|v| RemoteId::from_value(v).ok())
    }

    /// Maps raw remote fields to local attributes.
    pub fn map_attributes(&self, raw: &Record) -> Record {
        let renamed = raw.iter().map(|(field, value)| {
            let target = match self.field_mapping.iter().find(|(remote, _)| remote == field) {
                Some((_, target)) => target.as_deref(),
                None => Some(field),
            };
            (target, value)
        });

        let mut attrs = Record::with_capacity(raw.len() + self.defaults.len());
        for (target, value) in renamed {
            let Some(field) = target else { continue };
            if self.admits(field) {
                attrs.insert(field, value.clone());
            }
        }

        for (field, value) in &self.defaults {
            if self.admits(field) && !attrs.contains_key(field) {
                attrs.insert(field.as_str(), value.clone());
            }
        }
        attrs
    }

    /// Returns true if the allow- and deny-lists let `field` through.
    fn admits(&self, field: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|f| f == field))
            && !self.except.iter().any(|f| f == field)
    }

    fn identity_error(&self, error: RemoteIdError) -> SyncError {
        match error {
            RemoteIdError::Missing => SyncError::MissingRemoteIdentity {
                entity_type: self.entity_type.clone(),
                field: self.remote_identity_field.clone(),
            },
            RemoteIdError::Unsupported(kind) => SyncError::UnsupportedRemoteIdentity {
                entity_type: self.entity_type.clone(),
                field: self.remote_identity_field.clone(),
                kind,
            },
        }
    }
}

impl fmt::Debug for MappingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingConfig")
            .field("entity_type", &self.entity_type)
            .field("remote_identity_field", &self.remote_identity_field)
            .field("field_mapping", &self.field_mapping)
            .field("only", &self.only)
            .field("except", &self.except)
            .field("defaults", &self.defaults)
            .field("destroy_missing", &self.destroy_missing)
            .field("associations", &self.associations)
            .field("fetch", &self.fetch.is_some())
            .field("find_by_id", &self.find_by_id.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for [`MappingConfig`].
#[derive(Debug)]
pub struct MappingConfigBuilder {
    config: MappingConfig,
}

impl MappingConfigBuilder {
    fn new(entity_type: impl Into<String>) -> Self {
        Self {
            config: MappingConfig {
                entity_type: entity_type.into(),
                remote_identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
                field_mapping: Vec::new(),
                only: Vec::new(),
                except: Vec::new(),
                defaults: Vec::new(),
                destroy_missing: false,
                associations: Vec::new(),
                fetch: None,
                find_by_id: None,
                hooks: Hooks::default(),
            },
        }
    }

    /// Sets the raw field holding the remote identity.
    #[must_use]
    pub fn identity_field(mut self, field: impl Into<String>) -> Self {
        self.config.remote_identity_field = field.into();
        self
    }

    /// Renames a remote field to a local field.
    #[must_use]
    pub fn map(mut self, remote: impl Into<String>, local: impl Into<String>) -> Self {
        self.set_mapping(remote.into(), Some(local.into()));
        self
    }

    /// Drops a remote field during mapping.
    #[must_use]
    pub fn drop_field(mut self, remote: impl Into<String>) -> Self {
        self.set_mapping(remote.into(), None);
        self
    }

    /// Keeps only the listed local fields.
    #[must_use]
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.only.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Removes the listed local fields.
    #[must_use]
    pub fn except<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.except.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sets a value for a local field missing after filtering.
    #[must_use]
    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.config.defaults.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.config.defaults.push((field, value)),
        }
        self
    }

    /// Deletes linked entities missing from the latest batch.
    #[must_use]
    pub fn destroy_missing(mut self, enabled: bool) -> Self {
        self.config.destroy_missing = enabled;
        self
    }

    /// Declares an association.
    #[must_use]
    pub fn association<I, S>(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
        source_fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .associations
            .push(AssociationDescriptor::new(name, target_type, source_fields));
        self
    }

    /// Sets the batch producer.
    #[must_use]
    pub fn fetch<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> SyncResult<Vec<Record>> + Send + Sync + 'static,
    {
        self.config.fetch = Some(Arc::new(hook));
        self
    }

    /// Sets the single-record lookup.
    #[must_use]
    pub fn find_by_id<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RemoteId) -> SyncResult<Option<Record>> + Send + Sync + 'static,
    {
        self.config.find_by_id = Some(Arc::new(hook));
        self
    }

    /// Sets both `fetch` and `find_by_id` from a gateway.
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn RemoteGateway>) -> Self {
        let entity_type = self.config.entity_type.clone();
        let fetch_gateway = Arc::clone(&gateway);
        let fetch_type = entity_type.clone();
        self.config.fetch = Some(Arc::new(move || fetch_gateway.fetch(&fetch_type)));
        self.config.find_by_id = Some(Arc::new(move |remote_id: &RemoteId| {
            gateway.find_by_id(&entity_type, remote_id)
        }));
        self
    }

    /// Runs before each record. Returning `false` skips the record.
    #[must_use]
    pub fn before_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>) -> bool + Send + Sync + 'static,
    {
        self.config.hooks.before_sync = Some(Arc::new(hook));
        self
    }

    /// Runs after each record and its associations.
    #[must_use]
    pub fn after_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>) + Send + Sync + 'static,
    {
        self.config.hooks.after_sync = Some(Arc::new(hook));
        self
    }

    /// Runs before the create or update. Returning `false` skips the record,
    /// associations included.
    #[must_use]
    pub fn before_record_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>) -> bool + Send + Sync + 'static,
    {
        self.config.hooks.before_record_sync = Some(Arc::new(hook));
        self
    }

    /// Runs after the create or update.
    #[must_use]
    pub fn after_record_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>) + Send + Sync + 'static,
    {
        self.config.hooks.after_record_sync = Some(Arc::new(hook));
        self
    }

    /// Runs before each association item. Returning `false` skips the item.
    #[must_use]
    pub fn before_association_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>, &str, &RemoteId) -> bool + Send + Sync + 'static,
    {
        self.config.hooks.before_association_sync = Some(Arc::new(hook));
        self
    }

    /// Runs after each synchronized association item.
    #[must_use]
    pub fn after_association_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SyncUnit<'_>, &str, &RemoteId) + Send + Sync + 'static,
    {
        self.config.hooks.after_association_sync = Some(Arc::new(hook));
        self
    }

    /// Finishes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the entity type or identity
    /// field is blank, or an association is unnamed, duplicated or has no
    /// source fields.
    pub fn build(self) -> SyncResult<MappingConfig> {
        let config = self.config;
        let invalid = |message: String| SyncError::invalid_config(config.entity_type.clone(), message);

        if config.entity_type.trim().is_empty() {
            return Err(invalid("entity type is blank".into()));
        }
        if config.remote_identity_field.trim().is_empty() {
            return Err(invalid("remote identity field is blank".into()));
        }
        for (i, association) in config.associations.iter().enumerate() {
            if association.name.trim().is_empty() {
                return Err(invalid(format!("association #{i} has no name")));
            }
            if association.source_fields.is_empty() {
                return Err(invalid(format!(
                    "association '{}' has no source fields",
                    association.name
                )));
            }
            if config.associations[..i]
                .iter()
                .any(|a| a.name == association.name)
            {
                return Err(invalid(format!(
                    "association '{}' declared twice",
                    association.name
                )));
            }
        }
        Ok(config)
    }

    fn set_mapping(&mut self, remote: String, local: Option<String>) {
        match self
            .config
            .field_mapping
            .iter_mut()
            .find(|(r, _)| *r == remote)
        {
            Some(slot) => slot.1 = local,
            None => self.config.field_mapping.push((remote, local)),
        }
    }
}

/// The set of mapping configurations known to a worker, keyed by entity
/// type.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    configs: HashMap<String, MappingConfig>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the entity type is already
    /// registered.
    pub fn register(&mut self, config: MappingConfig) -> SyncResult<()> {
        if self.configs.contains_key(config.entity_type()) {
            return Err(SyncError::invalid_config(
                config.entity_type(),
                "entity type registered twice",
            ));
        }
        self.configs.insert(config.entity_type().to_string(), config);
        Ok(())
    }

    /// Registers a configuration, builder style.
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn with(mut self, config: MappingConfig) -> SyncResult<Self> {
        self.register(config)?;
        Ok(self)
    }

    /// Returns the configuration of an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownEntityType`] if none is registered.
    pub fn get(&self, entity_type: &str) -> SyncResult<&MappingConfig> {
        self.configs
            .get(entity_type)
            .ok_or_else(|| SyncError::UnknownEntityType(entity_type.to_string()))
    }

    /// Returns true if the entity type is registered.
    pub fn contains(&self, entity_type: &str) -> bool {
        self.configs.contains_key(entity_type)
    }

    /// Registered entity types, sorted.
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered configurations.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Checks that every association targets a registered entity type.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownEntityType`] naming the first missing
    /// target.
    pub fn validate(&self) -> SyncResult<()> {
        for entity_type in self.entity_types() {
            let config = self.get(entity_type)?;
            for association in config.associations() {
                if !self.contains(&association.target_type) {
                    return Err(SyncError::UnknownEntityType(
                        association.target_type.clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}
