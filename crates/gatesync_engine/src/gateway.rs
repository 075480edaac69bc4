//! Remote gateway abstraction.

use crate::error::{SyncError, SyncResult};
use gatesync_codec::Record;
use gatesync_store::RemoteId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// The remote data source records are synchronized from.
///
/// This trait abstracts the transport, allowing for different
/// implementations (HTTP APIs, message queues, mocks for testing). A gateway
/// attached to a [`crate::MappingConfig`] supplies its `fetch` and
/// `find_by_id` hooks.
pub trait RemoteGateway: Send + Sync {
    /// Fetches the current batch of records for an entity type.
    fn fetch(&self, entity_type: &str) -> SyncResult<Vec<Record>>;

    /// Looks up a single record by remote identity.
    ///
    /// Returns `Ok(None)` if the source has no such record.
    fn find_by_id(&self, entity_type: &str, remote_id: &RemoteId) -> SyncResult<Option<Record>>;
}

/// A call received by a [`MockGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `fetch(entity_type)`.
    Fetch(String),
    /// `find_by_id(entity_type, remote_id)`.
    FindById(String, RemoteId),
}

/// A mock gateway for testing.
///
/// Holds one catalog of records per entity type and records every call it
/// receives. Lookups match the catalog's identity field (`"id"` unless set
/// with [`MockGateway::set_identity_field`]).
#[derive(Debug)]
pub struct MockGateway {
    connected: AtomicBool,
    catalogs: RwLock<HashMap<String, Vec<Record>>>,
    identity_fields: RwLock<HashMap<String, String>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MockGateway {
    /// Creates an empty, connected gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            catalogs: RwLock::new(HashMap::new()),
            identity_fields: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the catalog of an entity type.
    pub fn set_records(&self, entity_type: &str, records: Vec<Record>) {
        self.catalogs
            .write()
            .insert(entity_type.to_string(), records);
    }

    /// Appends a record to the catalog of an entity type.
    pub fn push_record(&self, entity_type: &str, record: Record) {
        self.catalogs
            .write()
            .entry(entity_type.to_string())
            .or_default()
            .push(record);
    }

    /// Sets the field lookups match against for an entity type.
    pub fn set_identity_field(&self, entity_type: &str, field: &str) {
        self.identity_fields
            .write()
            .insert(entity_type.to_string(), field.to_string());
    }

    /// Sets the connected state. A disconnected gateway fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the calls received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::gateway("not connected to remote source"))
        }
    }

    fn identity_field(&self, entity_type: &str) -> String {
        self.identity_fields
            .read()
            .get(entity_type)
            .cloned()
            .unwrap_or_else(|| "id".to_string())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteGateway for MockGateway {
    fn fetch(&self, entity_type: &str) -> SyncResult<Vec<Record>> {
        self.calls
            .lock()
            .push(GatewayCall::Fetch(entity_type.to_string()));
        self.check_connected()?;
        Ok(self
            .catalogs
            .read()
            .get(entity_type)
            .cloned()
            .unwrap_or_default())
    }

    fn find_by_id(&self, entity_type: &str, remote_id: &RemoteId) -> SyncResult<Option<Record>> {
        self.calls.lock().push(GatewayCall::FindById(
            entity_type.to_string(),
            remote_id.clone(),
        ));
        self.check_connected()?;

        let field = self.identity_field(entity_type);
        let catalogs = self.catalogs.read();
        let found = catalogs.get(entity_type).and_then(|records| {
            records.iter().find(|r| {
                r.get(&field)
                    .and_then(|v| RemoteId::from_value(v).ok())
                    .is_some_and(|id| &id == remote_id)
            })
        });
        Ok(found.cloned())
    }
}
