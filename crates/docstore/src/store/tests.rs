use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::tempdir;

use crate::{
    backend::Backend,
    connection::{ConnectionManager, ConnectionState},
    error::{Operation, StoreError, ValidationError},
    policy::{PolicyTable, UniqueField},
    store::{DocumentStore, ReadOutcome},
    test_support::ScriptedConnector,
    ObjectId,
};

const MISSING_ID: &str = "507f1f77bcf86cd799439011";

fn memory_store() -> DocumentStore {
    DocumentStore::new(Arc::new(ConnectionManager::with_default_connector(vec![
        "memory://test".to_owned(),
    ])))
}

fn scripted_store(connector: ScriptedConnector, candidates: &[&str]) -> (DocumentStore, Arc<ScriptedConnector>) {
    let connector = Arc::new(connector);
    let manager = ConnectionManager::new(
        connector.clone(),
        candidates.iter().map(|c| (*c).to_owned()).collect(),
    );
    (DocumentStore::new(Arc::new(manager)), connector)
}

fn unreachable_store() -> (DocumentStore, Arc<ScriptedConnector>) {
    scripted_store(
        ScriptedConnector::new().unreachable("mongodb://down"),
        &["", "mongodb://down"],
    )
}

#[tokio::test]
async fn test_create_then_read_round_trip() {
    let store = memory_store();

    let id = store.create("tasks", json!({"x": "v"})).await.unwrap();
    let outcome = store.read("tasks", Some(&id.to_hex())).await.unwrap();

    let doc = match outcome {
        ReadOutcome::Document(doc) => doc,
        other => panic!("expected a document, got {:?}", other),
    };
    assert_eq!(doc.id(), &id);
    assert_eq!(doc.get("x"), Some(&json!("v")));
    assert_eq!(doc.to_value(), json!({"_id": id.to_hex(), "x": "v"}));
}

#[tokio::test]
async fn test_create_connects_lazily() {
    let store = memory_store();
    assert_eq!(store.manager().state(), ConnectionState::Disconnected);

    store.create("tasks", json!({"title": "t"})).await.unwrap();

    assert!(store.manager().is_connected());
    assert_eq!(store.manager().endpoint().as_deref(), Some("memory://test"));
}

#[tokio::test]
async fn test_create_rejects_non_mapping() {
    let store = memory_store();

    for value in [json!([1, 2]), json!("text"), json!(3), json!(null)] {
        let err = store.create("tasks", value).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::NotAMapping { .. })
        ));
    }
    assert_eq!(store.manager().attempts(), 0);
}

#[tokio::test]
async fn test_create_rejects_reserved_identifier() {
    let store = memory_store();

    let err = store
        .create("tasks", json!({"_id": MISSING_ID, "title": "t"}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::ReservedField { ref field }) if field == "_id"
    ));
}

#[tokio::test]
async fn test_invalid_collection_name_is_rejected_everywhere() {
    let store = memory_store();

    assert!(store.create("", json!({})).await.unwrap_err().is_validation());
    assert!(store.read("system.users", None).await.unwrap_err().is_validation());
    assert!(store.list("bad/name").await.unwrap_err().is_validation());
    assert!(store
        .update("CON", MISSING_ID, json!({"a": 1}))
        .await
        .unwrap_err()
        .is_validation());
    assert!(store.delete(".hidden", MISSING_ID).await.unwrap_err().is_validation());
    assert_eq!(store.manager().attempts(), 0);
}

#[tokio::test]
async fn test_read_unknown_collection_is_empty() {
    let store = memory_store();

    let outcome = store.read("never_written", None).await.unwrap();

    assert_eq!(outcome, ReadOutcome::Documents(Vec::new()));
    assert_eq!(outcome.into_value(), json!([]));
}

#[tokio::test]
async fn test_read_all_returns_every_document() {
    let store = memory_store();
    let first = store.create("tasks", json!({"n": 1})).await.unwrap();
    let second = store.create("tasks", json!({"n": 2})).await.unwrap();
    store.create("other", json!({"n": 3})).await.unwrap();

    let docs = store.list("tasks").await.unwrap();

    let mut ids: Vec<ObjectId> = docs.iter().map(|doc| *doc.id()).collect();
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_read_missing_or_malformed_id_is_not_found() {
    let store = memory_store();

    assert!(store
        .read("tasks", Some(MISSING_ID))
        .await
        .unwrap()
        .is_not_found());
    assert_eq!(
        store.read("tasks", Some("not-an-id")).await.unwrap(),
        ReadOutcome::NotFound
    );
    assert!(store.get("tasks", "zz").await.unwrap().is_none());
    assert_eq!(ReadOutcome::NotFound.into_value(), Value::Null);
}

#[tokio::test]
async fn test_malformed_ids_never_reach_the_backend() {
    let (store, connector) = unreachable_store();

    assert!(store.read("tasks", Some("123")).await.unwrap().is_not_found());
    let err = store
        .update("tasks", "123", json!({"a": 1}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::InvalidIdentifier { .. })
    ));
    let err = store.delete("tasks", "g07f1f77bcf86cd799439011").await.unwrap_err();
    assert!(err.is_validation());

    assert!(connector.opened().is_empty());
}

#[tokio::test]
async fn test_update_merges_partially() {
    let store = memory_store();
    let id = store.create("tasks", json!({"a": 1, "b": 2})).await.unwrap();

    assert!(store.update("tasks", &id, json!({"b": 3})).await.unwrap());
    assert!(!store.update("tasks", &id, json!({"b": 3})).await.unwrap());

    let doc = store.get("tasks", &id).await.unwrap().unwrap();
    assert_eq!(doc.to_value(), json!({"_id": id.to_hex(), "a": 1, "b": 3}));
}

#[tokio::test]
async fn test_update_adds_new_fields() {
    let store = memory_store();
    let id = store.create("tasks", json!({"a": 1})).await.unwrap();

    assert!(store
        .update("tasks", id.to_hex(), json!({"c": {"nested": true}}))
        .await
        .unwrap());

    let doc = store.get("tasks", id).await.unwrap().unwrap();
    assert_eq!(doc.get("a"), Some(&json!(1)));
    assert_eq!(doc.get("c"), Some(&json!({"nested": true})));
}

#[tokio::test]
async fn test_update_missing_document_is_false() {
    let store = memory_store();

    assert!(!store
        .update("tasks", MISSING_ID, json!({"a": 1}))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_empty_patch_is_false_without_backend_call() {
    let (store, connector) = unreachable_store();

    assert!(!store.update("tasks", MISSING_ID, json!({})).await.unwrap());
    assert!(connector.opened().is_empty());
}

#[tokio::test]
async fn test_update_rejects_bad_patches() {
    let store = memory_store();
    let id = store.create("tasks", json!({"a": 1})).await.unwrap();

    let err = store.update("tasks", &id, json!([1])).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::NotAMapping { found: "array" })
    ));
    let err = store
        .update("tasks", &id, json!({"_id": MISSING_ID}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::ReservedField { .. })
    ));
}

#[tokio::test]
async fn test_create_rejects_path_and_operator_field_names() {
    let (store, connector) = unreachable_store();

    for document in [
        json!({"a": {"b": 1}, "$where": "x"}),
        json!({"a.b": 1}),
        json!({"": 1}),
        json!({"a": {"$set": 1}}),
    ] {
        let err = store.create("tasks", document).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidFieldName { .. })
        ));
    }
    assert!(connector.opened().is_empty());
}

#[tokio::test]
async fn test_update_rejects_dotted_patch_and_keeps_document() {
    let store = memory_store();
    let id = store.create("tasks", json!({"a": {"b": 1}})).await.unwrap();

    let err = store
        .update("tasks", &id, json!({"a.b": 2}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::InvalidFieldName { ref field, .. }) if field == "a.b"
    ));
    let err = store
        .update("tasks", &id, json!({"$inc": {"n": 1}}))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let doc = store.get("tasks", &id).await.unwrap().unwrap();
    assert_eq!(doc.to_value(), json!({"_id": id.to_hex(), "a": {"b": 1}}));
}

#[tokio::test]
async fn test_find_one_by_rejects_invalid_field_names() {
    let (store, connector) = unreachable_store();

    for field in ["a.b", "$where", ""] {
        let err = store
            .find_one_by("users", field, &json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidFieldName { .. })
        ));
    }
    assert!(connector.opened().is_empty());
}

#[tokio::test]
async fn test_delete_twice_is_true_then_false() {
    let store = memory_store();
    let id = store.create("tasks", json!({"a": 1})).await.unwrap();

    assert!(store.delete("tasks", &id).await.unwrap());
    assert!(!store.delete("tasks", &id).await.unwrap());
    assert!(store.get("tasks", &id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_store_reports_not_connected() {
    let (store, connector) = unreachable_store();

    let err = store.create("tasks", json!({"a": 1})).await.unwrap_err();
    assert!(matches!(err, StoreError::NotConnected { attempted: 1 }));
    assert!(store.list("tasks").await.unwrap_err().is_not_connected());
    assert!(store
        .update("tasks", MISSING_ID, json!({"a": 1}))
        .await
        .unwrap_err()
        .is_not_connected());
    assert!(store.delete("tasks", MISSING_ID).await.unwrap_err().is_not_connected());
    assert!(store.collection_names().await.unwrap_err().is_not_connected());

    assert_eq!(store.manager().state(), ConnectionState::Disconnected);
    assert_eq!(connector.opened().len(), 5);
}

#[tokio::test]
async fn test_unique_field_policy_rejects_duplicates() {
    let policies = PolicyTable::new().with("users", UniqueField::new("username"));
    let store = memory_store().with_policies(policies);

    store
        .create("users", json!({"username": "ada", "password": "x"}))
        .await
        .unwrap();
    let err = store
        .create("users", json!({"username": "ada", "password": "y"}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::DuplicateKey { ref collection, ref field, .. })
            if collection == "users" && field == "username"
    ));
    assert_eq!(store.list("users").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_policies_only_apply_to_their_collection() {
    let policies = PolicyTable::new().with("users", UniqueField::new("username"));
    let store = memory_store().with_policies(policies);

    store.create("tasks", json!({"username": "ada"})).await.unwrap();
    store.create("tasks", json!({"username": "ada"})).await.unwrap();

    assert_eq!(store.list("tasks").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_find_one_by_field() {
    let store = memory_store();
    let id = store
        .create("users", json!({"username": "ada", "role": "admin"}))
        .await
        .unwrap();

    let found = store
        .find_one_by("users", "username", &json!("ada"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), &id);
    assert!(store
        .find_one_by("users", "username", &json!("grace"))
        .await
        .unwrap()
        .is_none());

    let by_id = store
        .find_one_by("users", "_id", &json!(id.to_hex()))
        .await
        .unwrap();
    assert_eq!(by_id.map(|doc| *doc.id()), Some(id));
    assert!(store
        .find_one_by("users", "_id", &json!(42))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_collection_names_are_live_and_sorted() {
    let store = memory_store();
    assert!(store.collection_names().await.unwrap().is_empty());

    store.create("users", json!({"a": 1})).await.unwrap();
    store.create("tasks", json!({"a": 1})).await.unwrap();

    assert_eq!(
        store.collection_names().await.unwrap(),
        vec!["tasks".to_owned(), "users".to_owned()]
    );
}

#[tokio::test]
async fn test_connectivity_failure_demotes_and_next_call_reconnects() {
    let (store, connector) = scripted_store(
        ScriptedConnector::new().reachable("memory://a"),
        &["memory://a"],
    );
    store.create("tasks", json!({"a": 1})).await.unwrap();
    connector.backends()[0].close().await;

    let err = store.list("tasks").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Backend { operation: Operation::Read, ref collection, .. } if collection == "tasks"
    ));
    assert_eq!(store.manager().state(), ConnectionState::Disconnected);

    assert!(store.list("tasks").await.unwrap().is_empty());
    assert_eq!(connector.backends().len(), 2);
    assert!(store.manager().is_connected());
}

#[tokio::test]
async fn test_shutdown_then_reuse_reconnects() {
    let store = memory_store();
    store.create("tasks", json!({"a": 1})).await.unwrap();

    store.shutdown().await;
    store.shutdown().await;
    assert_eq!(store.manager().state(), ConnectionState::Disconnected);

    store.create("tasks", json!({"a": 2})).await.unwrap();
    assert_eq!(store.manager().attempts(), 2);
}

#[tokio::test]
async fn test_clones_share_the_connection() {
    let store = memory_store();
    let clone = store.clone();

    let id = store.create("tasks", json!({"a": 1})).await.unwrap();

    assert!(clone.get("tasks", &id).await.unwrap().is_some());
    assert_eq!(store.manager().attempts(), 1);
}

#[tokio::test]
async fn test_file_backend_persists_across_stores() {
    let temp_dir = tempdir().unwrap();
    let uri = format!("file://{}", temp_dir.path().join("db").display());
    let open = || DocumentStore::new(Arc::new(ConnectionManager::with_default_connector(vec![uri.clone()])));

    let store = open();
    let id = store
        .create("tasks", json!({"title": "persist me", "done": false}))
        .await
        .unwrap();
    assert!(store.update("tasks", &id, json!({"done": true})).await.unwrap());
    store.shutdown().await;

    let reopened = open();
    let doc = reopened.get("tasks", &id).await.unwrap().unwrap();
    assert_eq!(doc.get("title"), Some(&json!("persist me")));
    assert_eq!(doc.get("done"), Some(&json!(true)));
    assert_eq!(
        reopened.collection_names().await.unwrap(),
        vec!["tasks".to_owned()]
    );
    assert!(reopened.delete("tasks", &id).await.unwrap());
    assert!(!reopened.delete("tasks", &id).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_creates_share_one_connection() {
    let store = memory_store();

    let tasks: Vec<_> = (0 .. 16)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move { store.create("tasks", json!({"n": n})).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.list("tasks").await.unwrap().len(), 16);
    assert_eq!(store.manager().attempts(), 1);
}

#[tokio::test]
async fn test_store_from_config_uses_primary_uri() {
    let config = crate::Config {
        primary_uri: Some("memory://primary".to_owned()),
        ..crate::Config::default()
    };
    let store = DocumentStore::from_config(&config);

    store.create("tasks", json!({"a": 1})).await.unwrap();

    assert_eq!(store.manager().endpoint().as_deref(), Some("memory://primary"));
    assert!(store.policies().is_empty());
}

#[tokio::test]
async fn test_backend_error_reports_operation() {
    let (store, connector) = scripted_store(
        ScriptedConnector::new().reachable("memory://a"),
        &["memory://a"],
    );
    let id = store.create("tasks", json!({"a": 1})).await.unwrap();
    connector.backends()[0].close().await;

    let err = store.delete("tasks", &id).await.unwrap_err();

    assert!(err.is_backend());
    assert!(err.to_string().contains("during delete on collection 'tasks'"));
    let backend = connector.backends()[0].clone();
    assert!(backend.ping().await.is_err());
}
