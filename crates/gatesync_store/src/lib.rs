//! # GateSync Store
//!
//! Storage collaborators of the sync engine.
//!
//! This crate provides the two stores a synchronization run writes to:
//!
//! - [`LocalStore`] - the local copy of remote data, keyed by entity type
//! - [`LinkageStore`] - which local entity came from which remote identity
//!
//! ## Available Implementations
//!
//! - [`MemoryStore`] - In-memory local store with required-field validation
//! - [`MemoryLinkageStore`] - In-memory linkage rows
//! - [`FileLinkageStore`] - Linkage rows persisted to a CBOR journal
//!
//! ## Example
//!
//! ```rust
//! use gatesync_codec::Record;
//! use gatesync_store::{EntityId, Linkage, LinkageStore, MemoryLinkageStore, RemoteId};
//!
//! let linkage = MemoryLinkageStore::new();
//! let local = EntityId::new();
//! let remote = RemoteId::new("A-1").unwrap();
//!
//! linkage.create(Linkage::new("book", local, remote.clone(), Record::new())).unwrap();
//! assert_eq!(linkage.find("book", &remote).unwrap().unwrap().local_id, local);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod linkage;
mod local;
mod memory;

pub use error::{LinkageError, LinkageResult, StoreError, StoreResult};
pub use id::{EntityId, RemoteId, RemoteIdError};
pub use linkage::{FileLinkageStore, Linkage, LinkageStore, MemoryLinkageStore};
pub use local::LocalStore;
pub use memory::MemoryStore;
