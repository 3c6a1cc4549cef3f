use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{constants::ID_FIELD, object_id::ObjectId};

/// Represents a document in a collection.
///
/// A document is a mapping from field names to arbitrary JSON values plus the
/// reserved `_id` field, which the store assigns on creation. When serialized the
/// identifier is flattened next to the other fields as a hex string, which is also
/// the shape handed to collaborators through [`Document::to_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The unique identifier of the document.
    #[serde(rename = "_id")]
    pub id:     ObjectId,
    /// The fields of the document, without the identifier.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates a document from an identifier and its fields.
    ///
    /// A stray `_id` entry in `fields` is dropped; the identifier is authoritative.
    pub fn new(id: ObjectId, mut fields: Map<String, Value>) -> Self {
        fields.remove(ID_FIELD);
        Self {
            id,
            fields,
        }
    }

    /// Returns the identifier of the document.
    pub const fn id(&self) -> &ObjectId { &self.id }

    /// Returns the fields of the document.
    pub const fn fields(&self) -> &Map<String, Value> { &self.fields }

    /// Consumes the document and returns its fields.
    pub fn into_fields(self) -> Map<String, Value> { self.fields }

    /// Returns the value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> { self.fields.get(field) }

    /// Returns the document as a plain mapping, including `_id` as a hex string.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len().saturating_add(1));
        map.insert(ID_FIELD.to_owned(), Value::String(self.id.to_hex()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Merges `patch` into the document.
    ///
    /// Fields present in `patch` overwrite same-named fields, absent fields are left
    /// untouched and new fields are created. Returns `true` iff at least one stored
    /// value actually changed.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> bool {
        let mut changed = false;
        for (key, value) in patch {
            if key == ID_FIELD {
                continue;
            }
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}
