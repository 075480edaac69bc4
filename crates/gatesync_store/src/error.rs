//! Error types for store operations.

use crate::id::EntityId;
use std::io;
use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for identity linkage operations.
pub type LinkageResult<T> = Result<T, LinkageError>;

/// Errors raised by a [`crate::LocalStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The attributes were rejected by the store's validation rules.
    #[error("validation failed for {entity_type}: {message}")]
    Validation {
        /// Entity type being written.
        entity_type: String,
        /// Why the attributes were rejected.
        message: String,
    },

    /// The entity does not exist.
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// Entity type searched.
        entity_type: String,
        /// The missing entity.
        id: EntityId,
    },

    /// The store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a validation error.
    pub fn validation(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error is a validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }
}

/// Errors raised by a [`crate::LinkageStore`].
#[derive(Debug, Error)]
pub enum LinkageError {
    /// A row already exists for the same local entity or remote identity.
    #[error("duplicate linkage for {entity_type}: {key}")]
    Duplicate {
        /// Entity type of the conflicting row.
        entity_type: String,
        /// The conflicting key.
        key: String,
    },

    /// No linkage row exists for the local entity.
    #[error("no linkage for {entity_type} {local_id}")]
    NotFound {
        /// Entity type searched.
        entity_type: String,
        /// Local entity without a row.
        local_id: EntityId,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] gatesync_codec::CodecError),

    /// The journal is corrupted.
    #[error("linkage journal corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the journal lock.
    #[error("linkage journal locked: another process has exclusive access")]
    Locked,

    /// The store cannot accept writes.
    #[error("linkage store unavailable: {0}")]
    Unavailable(String),
}
