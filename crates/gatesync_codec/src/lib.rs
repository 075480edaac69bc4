//! # GateSync Codec
//!
//! Attribute values and records exchanged between a remote source and the
//! local store.
//!
//! This crate provides:
//! - [`Value`], a dynamic attribute value (JSON-like, with bytes)
//! - [`Record`], an insertion-ordered field map
//! - Canonical CBOR snapshots of records for linkage persistence
//!
//! ## Usage
//!
//! ```
//! use gatesync_codec::{from_snapshot_bytes, to_snapshot_bytes, Record, Value};
//!
//! let mut record = Record::new();
//! record.insert("title", "Dune");
//! record.insert("pages", 412);
//!
//! let bytes = to_snapshot_bytes(&record).unwrap();
//! let decoded = from_snapshot_bytes(&bytes).unwrap();
//! assert_eq!(decoded.get("pages"), Some(&Value::Integer(412)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod snapshot;
mod value;

pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use snapshot::{from_snapshot_bytes, to_snapshot_bytes};
pub use value::Value;
