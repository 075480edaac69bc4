//! Insertion-ordered attribute records.

use crate::value::Value;

/// An ordered mapping from field name to [`Value`].
///
/// Records are small (tens of fields), so entries live in a `Vec` and
/// lookups are linear. Insertion order is preserved; inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Creates an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Builds a record from a JSON object.
    ///
    /// Returns `None` if `json` is not an object.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from(json) {
            Value::Map(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Inserts a field, returning the previous value if the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Removes a field and returns its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(index).1)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.fields.retain(|(k, v)| keep(k, v));
    }

    /// Iterates field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies every field of `other` into this record, replacing
    /// values of keys that already exist.
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in other.iter() {
            self.insert(k, v.clone());
        }
    }

    /// Returns the fields sorted by key. Used for canonical encoding.
    pub fn sorted_fields(&self) -> Vec<(&str, &Value)> {
        let mut fields: Vec<_> = self.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields
    }

    /// Compares two records ignoring field order, at every nesting level.
    ///
    /// `==` is order-sensitive; use this to compare a record with its
    /// decoded snapshot, whose keys come back sorted.
    pub fn same_fields(&self, other: &Record) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| same_value(value, o)))
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Map(a), Value::Map(b)) => a.same_fields(b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_value(x, y))
        }
        _ => a == b,
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_replaces_in_place() {
        let mut record = Record::new();
        record.insert("b", 1);
        record.insert("a", 2);
        assert_eq!(record.insert("b", 3), Some(Value::Integer(1)));

        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn remove_and_retain() {
        let mut record: Record = [("a", Value::from(1)), ("b", Value::from(2)), ("c", Value::Null)]
            .into_iter()
            .collect();

        assert_eq!(record.remove("a"), Some(Value::Integer(1)));
        assert_eq!(record.remove("a"), None);

        record.retain(|_, v| !v.is_null());
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("b"));
    }

    #[test]
    fn from_json_requires_object() {
        assert!(Record::from_json(serde_json::json!([1, 2])).is_none());
        let record = Record::from_json(serde_json::json!({"id": 1})).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn from_json_keeps_document_order() {
        let record =
            Record::from_json(serde_json::json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}}))
                .unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        match record.get("mid") {
            Some(Value::Map(inner)) => {
                assert_eq!(inner.keys().collect::<Vec<_>>(), vec!["b", "a"]);
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[test]
    fn merge_overwrites_present_keys() {
        let mut base: Record = [("a", Value::from(1)), ("b", Value::from(2))]
            .into_iter()
            .collect();
        let patch: Record = [("b", Value::from(20)), ("c", Value::from(30))]
            .into_iter()
            .collect();

        base.merge(&patch);
        assert_eq!(base.get("a"), Some(&Value::Integer(1)));
        assert_eq!(base.get("b"), Some(&Value::Integer(20)));
        assert_eq!(base.get("c"), Some(&Value::Integer(30)));
    }

    #[test]
    fn sorted_fields_ignores_insertion_order() {
        let record: Record = [("z", Value::Null), ("a", Value::Null)].into_iter().collect();
        let keys: Vec<_> = record.sorted_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "z"]);
    }

    #[test]
    fn same_fields_ignores_order_at_every_level() {
        let a = Record::from_json(serde_json::json!({"x": 1, "m": {"p": 1, "q": [{"s": 1, "t": 2}]}}))
            .unwrap();
        let b = Record::from_json(serde_json::json!({"m": {"q": [{"t": 2, "s": 1}], "p": 1}, "x": 1}))
            .unwrap();
        assert_ne!(a, b);
        assert!(a.same_fields(&b));

        let c = Record::from_json(serde_json::json!({"x": 1, "m": {"p": 2}})).unwrap();
        assert!(!a.same_fields(&c));
    }
}
