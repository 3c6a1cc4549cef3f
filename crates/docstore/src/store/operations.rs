use serde_json::{Map, Value};
use tracing::{debug, error, trace};

use crate::{
    backend::BackendError,
    connection::{ActiveConnection, ConnectionManager},
    constants::ID_FIELD,
    error::{Operation, StoreError, ValidationError},
    Result,
};

/// Returns the held connection, connecting lazily first if needed.
///
/// This is the guard every store operation passes after its input validated. When no
/// candidate answers, the caller gets `StoreError::NotConnected` and nothing is sent
/// to any backend.
pub async fn connection(manager: &ConnectionManager, collection: &str, operation: Operation) -> Result<ActiveConnection> {
    if let Some(active) = manager.ensure_connected().await {
        trace!(
            "Running {} on {} via {}",
            operation,
            collection,
            active.endpoint
        );
        return Ok(active);
    }
    let attempted = manager
        .candidates()
        .iter()
        .filter(|candidate| !candidate.trim().is_empty())
        .count();
    error!(
        "Cannot {} on collection {}: not connected ({} candidate endpoint(s) unreachable)",
        operation, collection, attempted
    );
    Err(StoreError::NotConnected {
        attempted,
    })
}

/// Logs a backend failure and maps it onto the store taxonomy.
///
/// A connectivity failure also drops the connection it happened on, so the next
/// operation goes through candidate fallback again.
pub async fn backend_failure(
    manager: &ConnectionManager,
    active: &ActiveConnection,
    collection: &str,
    operation: Operation,
    err: BackendError,
) -> StoreError {
    error!(
        "Backend failure during {} on collection {}: {}",
        operation, collection, err
    );
    if err.is_connectivity() {
        manager
            .report_connectivity_failure(active.generation)
            .await;
    }
    StoreError::Backend {
        collection: collection.to_owned(),
        operation,
        reason: err.to_string(),
    }
}

/// Extracts the key-value mapping of a document or patch.
pub fn into_mapping(value: Value) -> std::result::Result<Map<String, Value>, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => {
            Err(ValidationError::NotAMapping {
                found: json_kind(&other),
            })
        },
    }
}

/// Rejects caller input that tries to set the store-assigned identifier.
pub fn reject_reserved(fields: &Map<String, Value>) -> std::result::Result<(), ValidationError> {
    if fields.contains_key(ID_FIELD) {
        debug!("Rejected input carrying the reserved {} field", ID_FIELD);
        return Err(ValidationError::ReservedField {
            field: ID_FIELD.to_owned(),
        });
    }
    Ok(())
}

/// Checks one field name.
///
/// Names must be non-empty, must not contain `.` and must not start with `$`, so
/// every backend stores them as plain keys.
pub fn validate_field_name(field: &str) -> std::result::Result<(), ValidationError> {
    let reason = if field.is_empty() {
        "field names cannot be empty"
    }
    else if field.contains('.') {
        "field names cannot contain '.'"
    }
    else if field.starts_with('$') {
        "field names cannot start with '$'"
    }
    else {
        return Ok(());
    };
    debug!("Rejected field name {:?}: {}", field, reason);
    Err(ValidationError::InvalidFieldName {
        field: field.to_owned(),
        reason,
    })
}

/// Checks every field name of a document or patch, nested objects included.
pub fn validate_field_names(fields: &Map<String, Value>) -> std::result::Result<(), ValidationError> {
    fields.iter().try_for_each(|(name, value)| {
        validate_field_name(name)?;
        validate_nested(value)
    })
}

/// Descends into objects, including those held in arrays.
fn validate_nested(value: &Value) -> std::result::Result<(), ValidationError> {
    match *value {
        Value::Object(ref fields) => validate_field_names(fields),
        Value::Array(ref items) => items.iter().try_for_each(validate_nested),
        _ => Ok(()),
    }
}

/// Human-readable JSON type name used in validation messages.
pub const fn json_kind(value: &Value) -> &'static str {
    match *value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_into_mapping_rejects_non_objects() {
        assert_eq!(
            into_mapping(json!([1, 2])),
            Err(ValidationError::NotAMapping {
                found: "array",
            })
        );
        assert_eq!(
            into_mapping(json!("text")),
            Err(ValidationError::NotAMapping {
                found: "string",
            })
        );
        assert!(into_mapping(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_reject_reserved() {
        let fields = into_mapping(json!({"_id": "x", "a": 1})).unwrap();
        assert!(matches!(
            reject_reserved(&fields),
            Err(ValidationError::ReservedField { .. })
        ));
        let fields = into_mapping(json!({"a": 1})).unwrap();
        assert!(reject_reserved(&fields).is_ok());
    }

    #[test]
    fn test_validate_field_name() {
        assert!(validate_field_name("title").is_ok());
        assert!(validate_field_name("a$b").is_ok());
        for bad in ["", "a.b", ".a", "$where", "$"] {
            assert!(
                matches!(
                    validate_field_name(bad),
                    Err(ValidationError::InvalidFieldName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_field_names_descends_into_nested_values() {
        let fields = into_mapping(json!({"a": {"b": [1, {"c": true}]}, "d": "x.y"})).unwrap();
        assert!(validate_field_names(&fields).is_ok());

        let fields = into_mapping(json!({"a": {"b.c": 1}})).unwrap();
        assert_eq!(
            validate_field_names(&fields),
            Err(ValidationError::InvalidFieldName {
                field:  "b.c".to_owned(),
                reason: "field names cannot contain '.'",
            })
        );

        let fields = into_mapping(json!({"a": [{"$gt": 1}]})).unwrap();
        assert!(matches!(
            validate_field_names(&fields),
            Err(ValidationError::InvalidFieldName { .. })
        ));
    }
}
