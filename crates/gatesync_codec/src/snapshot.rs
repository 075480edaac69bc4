//! Canonical CBOR encoding of attribute snapshots.
//!
//! Snapshots are stored next to identity linkage rows. Keys of every map are
//! written in sorted order, so two equal records always encode to the same
//! bytes no matter how their fields were inserted.
//!
//! Decoding yields records whose keys are in that sorted order, so a decoded
//! snapshot is generally not `==` to the record that was encoded. Compare
//! them with [`Record::same_fields`].

use crate::error::{CodecError, CodecResult};
use crate::record::Record;
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Encode a record to canonical CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn to_snapshot_bytes(record: &Record) -> CodecResult<Vec<u8>> {
    let cbor = record_to_cbor(record);
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&cbor, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decode a record previously produced by [`to_snapshot_bytes`].
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or do not describe a
/// map with text keys.
pub fn from_snapshot_bytes(bytes: &[u8]) -> CodecResult<Record> {
    let cbor: Cbor =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    match cbor_to_value(cbor)? {
        Value::Map(record) => Ok(record),
        other => Err(CodecError::invalid_structure(format!(
            "expected map at top level, found {}",
            other.kind()
        ))),
    }
}

fn record_to_cbor(record: &Record) -> Cbor {
    Cbor::Map(
        record
            .sorted_fields()
            .into_iter()
            .map(|(k, v)| (Cbor::Text(k.to_string()), value_to_cbor(v)))
            .collect(),
    )
}

fn value_to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Float(f) => Cbor::Float(*f),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(value_to_cbor).collect()),
        Value::Map(record) => record_to_cbor(record),
    }
}

fn cbor_to_value(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => Value::Integer(
            i64::try_from(n).map_err(|_| CodecError::invalid_structure("integer out of range"))?,
        ),
        Cbor::Float(f) => Value::Float(f),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(cbor_to_value)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Cbor::Map(pairs) => {
            let mut record = Record::with_capacity(pairs.len());
            for (k, v) in pairs {
                let Cbor::Text(key) = k else {
                    return Err(CodecError::invalid_structure("map keys must be text"));
                };
                record.insert(key, cbor_to_value(v)?);
            }
            Value::Map(record)
        }
        Cbor::Tag(_, inner) => cbor_to_value(*inner)?,
        _ => return Err(CodecError::invalid_structure("unsupported CBOR item")),
    })
}
