//! Local and remote identifiers.

use gatesync_codec::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a local entity, assigned by the local store on create.
///
/// Entity IDs are 128-bit UUIDs that are immutable once assigned and never
/// reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId([u8; 16]);

impl EntityId {
    /// Creates an entity ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_uuid())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

/// Why a value could not be used as a remote identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteIdError {
    /// The value is null, blank text or an empty collection.
    Missing,
    /// The value kind cannot identify a record (float, bool, map, ...).
    Unsupported(&'static str),
}

/// The value that identifies a record at the remote source.
///
/// Remote identities arrive as integers or strings. Both are normalized to
/// their textual form so `42` and `"42"` resolve to the same linkage row.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Creates a remote identity from text, trimming surrounding whitespace.
    ///
    /// Returns `None` for blank text.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Extracts a remote identity from an attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteIdError::Missing`] for blank values and
    /// [`RemoteIdError::Unsupported`] for kinds other than text or integer.
    pub fn from_value(value: &Value) -> Result<Self, RemoteIdError> {
        match value {
            Value::Integer(n) => Ok(Self(n.to_string())),
            Value::Text(s) => Self::new(s).ok_or(RemoteIdError::Missing),
            v if v.is_blank() => Err(RemoteIdError::Missing),
            v => Err(RemoteIdError::Unsupported(v.kind())),
        }
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteId({})", self.0)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RemoteId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<RemoteId> for Value {
    fn from(id: RemoteId) -> Self {
        Value::Text(id.0)
    }
}
