//! # GateSync Testkit
//!
//! Test utilities for GateSync.
//!
//! This crate provides:
//! - Test environments bundling stores, a mock gateway and a recording
//!   logger
//! - A small library catalog (authors, books, tags) wired through
//!   associations
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use gatesync_testkit::prelude::*;
//!
//! let env = TestEnv::memory();
//! let registry = library_registry(&env);
//! seed_library(&env);
//!
//! let report = env.worker(&registry).run("book", None).unwrap();
//! assert_eq!(report.created, 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
