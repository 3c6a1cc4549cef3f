//! Twelve-byte document identifiers.

use std::{fmt, str::FromStr};

use bson::oid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    constants::{OBJECT_ID_HEX_LEN, OBJECT_ID_LEN},
    error::ValidationError,
};

/// Opaque, globally-unique document key.
///
/// The external representation is 24 lowercase hexadecimal characters; the internal
/// representation is a BSON ObjectId, so generated identifiers carry the usual
/// timestamp, per-process and counter segments and pass to MongoDB unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(oid::ObjectId);

impl ObjectId {
    /// Generates a fresh identifier.
    pub fn new() -> Self { Self(oid::ObjectId::new()) }

    /// Wraps already-decoded bytes.
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self { Self(oid::ObjectId::from_bytes(bytes)) }

    /// Returns the decoded bytes.
    pub const fn bytes(&self) -> [u8; OBJECT_ID_LEN] { self.0.bytes() }

    /// Returns the underlying BSON identifier.
    pub const fn as_bson(&self) -> oid::ObjectId { self.0 }

    /// Decodes the external hex representation.
    ///
    /// Anything that is not exactly 24 hexadecimal characters is rejected; surrounding
    /// whitespace is not trimmed. Upper-case digits are accepted.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidIdentifier` for malformed input.
    pub fn parse_str(s: &str) -> Result<Self, ValidationError> {
        let invalid = || {
            ValidationError::InvalidIdentifier {
                id: s.to_owned(),
            }
        };
        if s.len() != OBJECT_ID_HEX_LEN {
            return Err(invalid());
        }
        let mut bytes = [0_u8; OBJECT_ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self::from_bytes(bytes))
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String { self.0.to_hex() }

    /// Returns the creation time embedded in the identifier.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0.timestamp().timestamp_millis()).unwrap_or_default()
    }
}

impl From<oid::ObjectId> for ObjectId {
    fn from(value: oid::ObjectId) -> Self { Self(value) }
}

impl From<ObjectId> for oid::ObjectId {
    fn from(value: ObjectId) -> Self { value.0 }
}

impl Default for ObjectId {
    fn default() -> Self { Self::new() }
}

impl FromStr for ObjectId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse_str(s) }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ObjectId({})", self.to_hex()) }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Caller input that can be turned into an identifier.
///
/// Store operations accept raw strings straight from a request path as well as
/// identifiers returned by an earlier `create`.
pub trait IntoObjectId {
    /// Decodes `self`, failing with a validation error for malformed strings.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidIdentifier` when the input is malformed.
    fn into_object_id(self) -> Result<ObjectId, ValidationError>;
}

impl IntoObjectId for ObjectId {
    fn into_object_id(self) -> Result<ObjectId, ValidationError> { Ok(self) }
}

impl IntoObjectId for &ObjectId {
    fn into_object_id(self) -> Result<ObjectId, ValidationError> { Ok(*self) }
}

impl IntoObjectId for &str {
    fn into_object_id(self) -> Result<ObjectId, ValidationError> { ObjectId::parse_str(self) }
}

impl IntoObjectId for String {
    fn into_object_id(self) -> Result<ObjectId, ValidationError> { ObjectId::parse_str(&self) }
}

impl IntoObjectId for &String {
    fn into_object_id(self) -> Result<ObjectId, ValidationError> { ObjectId::parse_str(self) }
}
