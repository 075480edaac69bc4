//! Error types for the sync engine.

use gatesync_store::{LinkageError, RemoteId, StoreError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
///
/// Errors are either *record-fatal* (the failing record is logged, counted
/// and skipped while the batch continues) or *run-fatal* (the run aborts and
/// the error reaches the caller). See [`SyncError::is_record_fatal`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// The raw record has no usable value at the identity field.
    #[error("{entity_type}: missing remote identity field '{field}'")]
    MissingRemoteIdentity {
        /// Entity type being synchronized.
        entity_type: String,
        /// The configured identity field.
        field: String,
    },

    /// The identity field holds a value that cannot identify a record.
    #[error("{entity_type}: remote identity field '{field}' holds unsupported {kind} value")]
    UnsupportedRemoteIdentity {
        /// Entity type being synchronized.
        entity_type: String,
        /// The configured identity field.
        field: String,
        /// Kind of the offending value.
        kind: &'static str,
    },

    /// Writing the identity linkage row failed.
    #[error("{entity_type} {remote_id}: failed to persist linkage: {source}")]
    LinkagePersist {
        /// Entity type being synchronized.
        entity_type: String,
        /// Remote identity of the record.
        remote_id: RemoteId,
        /// Underlying linkage store error.
        #[source]
        source: LinkageError,
    },

    /// The local store rejected or failed a call.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Reading the identity linkage failed.
    #[error("linkage error: {0}")]
    Linkage(#[from] LinkageError),

    /// An associated record could not be found at the remote source.
    #[error("associated {entity_type} {remote_id} not found at remote source")]
    AssociationNotFound {
        /// Target entity type.
        entity_type: String,
        /// Identity that was looked up.
        remote_id: RemoteId,
    },

    /// Looking up a single remote record failed.
    #[error("lookup of {entity_type} {remote_id} failed: {message}")]
    Lookup {
        /// Target entity type.
        entity_type: String,
        /// Identity that was looked up.
        remote_id: RemoteId,
        /// Gateway error message.
        message: String,
    },

    /// The remote source failed.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// No mapping configuration is registered for the entity type.
    #[error("no mapping configuration registered for '{0}'")]
    UnknownEntityType(String),

    /// A hook required by the run is not configured.
    #[error("{entity_type}: no {hook} hook configured")]
    MissingHook {
        /// Entity type lacking the hook.
        entity_type: String,
        /// Hook name.
        hook: &'static str,
    },

    /// Association nesting went deeper than allowed.
    #[error("{entity_type}: association depth {depth} exceeds limit {limit}")]
    DepthExceeded {
        /// Entity type of the run that would exceed the limit.
        entity_type: String,
        /// Depth of that run.
        depth: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A mapping configuration is malformed.
    #[error("invalid configuration for '{entity_type}': {message}")]
    InvalidConfig {
        /// Entity type of the configuration.
        entity_type: String,
        /// What is wrong with it.
        message: String,
    },
}

impl SyncError {
    /// Creates a missing hook error.
    pub fn missing_hook(entity_type: impl Into<String>, hook: &'static str) -> Self {
        Self::MissingHook {
            entity_type: entity_type.into(),
            hook,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Creates a gateway error.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    /// Returns true if the error only invalidates the record being processed.
    ///
    /// Record-fatal errors are caught by the error handler and the batch
    /// continues. Everything else aborts the run.
    pub fn is_record_fatal(&self) -> bool {
        match self {
            SyncError::MissingRemoteIdentity { .. }
            | SyncError::UnsupportedRemoteIdentity { .. }
            | SyncError::LinkagePersist { .. }
            | SyncError::AssociationNotFound { .. }
            | SyncError::Lookup { .. } => true,
            SyncError::Store(e) => e.is_validation(),
            _ => false,
        }
    }
}
