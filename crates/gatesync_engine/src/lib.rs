//! # GateSync Engine
//!
//! Remote-to-local synchronization engine.
//!
//! This crate provides:
//! - Per-entity-type mapping configuration (identity, renames, filters,
//!   defaults, associations, lifecycle hooks)
//! - Identity linkage resolution (create-once, update afterwards)
//! - The sync worker, including recursive association runs
//! - Per-record error containment and run reports
//! - Remote gateway and logger abstractions with test doubles
//!
//! ## Architecture
//!
//! A run flows through these components, leaves first:
//!
//! 1. [`MappingConfig`] turns a raw record into an identity and attributes
//! 2. [`IdentityResolver`] finds the linked local entity, if any
//! 3. [`SyncUnit`] binds the record to its local counterpart
//! 4. [`ErrorHandler`] contains record-fatal failures
//! 5. [`Worker`] creates or updates, recurses into associations and
//!    aggregates a [`RunReport`]
//!
//! ## Key Invariants
//!
//! - A remote record without an identity is never written
//! - A local entity is linked exactly once, right after it is created
//! - Records of a batch are processed strictly in order, each with its
//!   association runs, before the next one starts
//! - Record-fatal errors never abort a run; everything else does

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod gateway;
mod handler;
mod logger;
mod mapping;
mod resolver;
mod unit;
mod worker;

pub use config::{SyncConfig, DEFAULT_MAX_ASSOCIATION_DEPTH};
pub use context::{RecordFailure, RunContext, RunReport};
pub use error::{SyncError, SyncResult};
pub use gateway::{GatewayCall, MockGateway, RemoteGateway};
pub use handler::ErrorHandler;
pub use logger::{LogEvent, NoopLogger, RecordingLogger, SyncLogger, TracingLogger};
pub use mapping::{
    AfterAssociationHook, AfterHook, AssociationDescriptor, BeforeAssociationHook, BeforeHook,
    FetchHook, FindByIdHook, Hooks, MappingConfig, MappingConfigBuilder, Registry,
    DEFAULT_IDENTITY_FIELD,
};
pub use resolver::IdentityResolver;
pub use unit::{AssociationRefs, SyncUnit};
pub use worker::{Worker, WorkerStats};
