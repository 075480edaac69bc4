//! Property-based test generators using proptest.
//!
//! Provides strategies for generating raw remote records and identifiers.

use gatesync_codec::{Record, Value};
use gatesync_store::{EntityId, RemoteId};
use proptest::prelude::*;

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating remote identities, numeric or textual.
pub fn remote_id_strategy() -> impl Strategy<Value = RemoteId> {
    prop_oneof![
        any::<i64>().prop_map(RemoteId::from),
        prop::string::string_regex("[A-Za-z0-9_-]{1,16}")
            .expect("Invalid regex")
            .prop_filter_map("blank identity", |s| RemoteId::new(s)),
    ]
}

/// Strategy for generating field names from a small alphabet, so that
/// generated records share fields often.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "name", "title", "status", "pages", "code", "note", "rank", "flag",
    ])
    .prop_map(String::from)
}

/// Strategy for generating scalar attribute values.
///
/// Floats are left out so generated values compare equal to themselves.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::string::string_regex("[a-z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating records of scalar values without an identity.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::vec((field_name_strategy(), scalar_value_strategy()), 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating records carrying an identity in `identity_field`.
pub fn identified_record_strategy(identity_field: &'static str) -> impl Strategy<Value = Record> {
    (remote_id_strategy(), record_strategy()).prop_map(move |(remote_id, mut record)| {
        record.insert(identity_field, Value::from(remote_id));
        record
    })
}

/// Strategy for generating batches of records with distinct identities.
pub fn batch_strategy(
    identity_field: &'static str,
    max_len: usize,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(remote_id_strategy(), record_strategy(), 0..max_len).prop_map(
        move |entries| {
            entries
                .into_iter()
                .map(|(remote_id, mut record)| {
                    record.insert(identity_field, Value::from(remote_id));
                    record
                })
                .collect()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn identified_records_carry_identity(record in identified_record_strategy("id")) {
            let value = record.get("id").unwrap();
            prop_assert!(RemoteId::from_value(value).is_ok());
        }

        #[test]
        fn batch_identities_are_distinct(batch in batch_strategy("id", 10)) {
            let mut ids: Vec<RemoteId> = batch
                .iter()
                .map(|r| RemoteId::from_value(r.get("id").unwrap()).unwrap())
                .collect();
            let len = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), len);
        }
    }
}
