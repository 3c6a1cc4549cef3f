use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{
    config::Config,
    connection::ConnectionManager,
    constants::ID_FIELD,
    error::Operation,
    object_id::{IntoObjectId, ObjectId},
    policy::{PolicyError, PolicyTable},
    validation::validate_collection_name,
    Document,
    Result,
};
use super::operations::{
    backend_failure,
    connection,
    into_mapping,
    reject_reserved,
    validate_field_name,
    validate_field_names,
};

/// What a read found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every document of the collection (read without an identifier).
    Documents(Vec<Document>),
    /// The document with the requested identifier.
    Document(Document),
    /// No document has the requested identifier, or the identifier is malformed.
    NotFound,
}

impl ReadOutcome {
    /// Returns `true` when nothing was found.
    pub const fn is_not_found(&self) -> bool { matches!(*self, Self::NotFound) }

    /// Converts the outcome into plain JSON: an array, an object or `null`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Documents(docs) => Value::Array(docs.iter().map(Document::to_value).collect()),
            Self::Document(doc) => doc.to_value(),
            Self::NotFound => Value::Null,
        }
    }
}

/// CRUD access to named collections over a managed connection.
///
/// Every operation validates its input first, then makes sure a connection is held
/// (connecting lazily through the [`ConnectionManager`] if needed) and finally runs a
/// single backend round trip. Failures are reported through [`crate::StoreError`]:
/// bad input as `Validation`, an unreachable store as `NotConnected` and anything
/// the backend rejects as `Backend`. A well-formed identifier that matches nothing
/// is a normal outcome.
///
/// The store is cheap to clone; clones share the connection and the policies.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use docstore::{ConnectionManager, DocumentStore, ReadOutcome};
/// use serde_json::json;
///
/// # async fn example() -> docstore::Result<()> {
/// let manager = Arc::new(ConnectionManager::with_default_connector(vec!["memory://".to_owned()]));
/// let store = DocumentStore::new(manager);
///
/// let id = store.create("tasks", json!({"title": "write docs", "done": false})).await?;
/// assert!(store.update("tasks", &id, json!({"done": true})).await?);
/// assert!(matches!(store.read("tasks", Some(&id.to_hex())).await?, ReadOutcome::Document(_)));
/// assert!(store.delete("tasks", &id).await?);
/// assert!(!store.delete("tasks", &id).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DocumentStore {
    /// Connection shared by every operation.
    manager:  Arc<ConnectionManager>,
    /// Insert rules per collection.
    policies: Arc<PolicyTable>,
}

impl DocumentStore {
    /// Creates a store over `manager` without any collection policies.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            policies: Arc::new(PolicyTable::default()),
        }
    }

    /// Replaces the collection policies.
    #[must_use]
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = Arc::new(policies);
        self
    }

    /// Creates a store with its own manager built from `config`.
    pub fn from_config(config: &Config) -> Self { Self::new(Arc::new(ConnectionManager::from_config(config))) }

    /// Returns the connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> { &self.manager }

    /// Returns the collection policies.
    pub fn policies(&self) -> &PolicyTable { &self.policies }

    /// Inserts `document` into `collection` and returns its new identifier.
    ///
    /// # Arguments
    ///
    /// * `collection` - Target collection; created on first insert.
    /// * `document` - A JSON object. The identifier is assigned by the store, so the
    ///   object must not carry an `_id` field.
    ///
    /// # Errors
    ///
    /// * `Validation` - the collection name is invalid, the document is not an
    ///   object, it carries `_id`, a field name is empty, dotted or starts with `$`,
    ///   or a collection policy rejects it.
    /// * `NotConnected` - no endpoint could be reached.
    /// * `Backend` - the backend failed the insert or a policy lookup.
    pub async fn create(&self, collection: &str, document: Value) -> Result<ObjectId> {
        trace!("Creating document in {}", collection);
        validate_collection_name(collection)?;
        let fields = into_mapping(document)?;
        reject_reserved(&fields)?;
        validate_field_names(&fields)?;

        let active = connection(&self.manager, collection, Operation::Create).await?;
        for policy in self.policies.policies_for(collection) {
            match policy
                .check(active.backend.as_ref(), collection, &fields)
                .await
            {
                Ok(()) => {},
                Err(PolicyError::Violation(violation)) => {
                    warn!("Insert into {} rejected: {}", collection, violation);
                    return Err(violation.into());
                },
                Err(PolicyError::Backend(e)) => {
                    return Err(backend_failure(&self.manager, &active, collection, Operation::Create, e).await);
                },
            }
        }

        match active.backend.insert_one(collection, fields).await {
            Ok(id) => {
                debug!("Created document {} in {}", id, collection);
                Ok(id)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Create, e).await),
        }
    }

    /// Reads one document, or the whole collection when `id` is `None`.
    ///
    /// A malformed identifier cannot match anything and yields
    /// [`ReadOutcome::NotFound`] without contacting the backend. A collection that
    /// does not exist reads as empty.
    ///
    /// # Errors
    ///
    /// * `Validation` - the collection name is invalid.
    /// * `NotConnected` - no endpoint could be reached.
    /// * `Backend` - the backend failed the read.
    pub async fn read(&self, collection: &str, id: Option<&str>) -> Result<ReadOutcome> {
        validate_collection_name(collection)?;
        let Some(raw_id) = id
        else {
            return self.list(collection).await.map(ReadOutcome::Documents);
        };
        let Ok(id) = ObjectId::parse_str(raw_id)
        else {
            debug!("Identifier {:?} is malformed, nothing to read in {}", raw_id, collection);
            return Ok(ReadOutcome::NotFound);
        };
        Ok(self
            .fetch(collection, &id)
            .await?
            .map_or(ReadOutcome::NotFound, ReadOutcome::Document))
    }

    /// Returns every document of `collection`.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::read`].
    pub async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        validate_collection_name(collection)?;
        let active = connection(&self.manager, collection, Operation::Read).await?;
        match active.backend.find_all(collection).await {
            Ok(docs) => {
                debug!("Read {} document(s) from {}", docs.len(), collection);
                Ok(docs)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Read, e).await),
        }
    }

    /// Returns the document with identifier `id`, if any.
    ///
    /// Like [`DocumentStore::read`], a malformed identifier yields `None`.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::read`].
    pub async fn get(&self, collection: &str, id: impl IntoObjectId) -> Result<Option<Document>> {
        validate_collection_name(collection)?;
        match id.into_object_id() {
            Ok(id) => self.fetch(collection, &id).await,
            Err(e) => {
                debug!("{}, nothing to read in {}", e, collection);
                Ok(None)
            },
        }
    }

    /// Returns some document of `collection` whose `field` equals `value`.
    ///
    /// Looking up by `_id` behaves like [`DocumentStore::get`] with the value as a hex
    /// identifier.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::read`], plus `Validation` when `field` is empty,
    /// dotted or starts with `$`.
    pub async fn find_one_by(&self, collection: &str, field: &str, value: &Value) -> Result<Option<Document>> {
        validate_collection_name(collection)?;
        validate_field_name(field)?;
        if field == ID_FIELD {
            return match *value {
                Value::String(ref id) => self.get(collection, id.as_str()).await,
                _ => Ok(None),
            };
        }
        let active = connection(&self.manager, collection, Operation::Read).await?;
        match active
            .backend
            .find_one_by_field(collection, field, value)
            .await
        {
            Ok(found) => {
                trace!(
                    "Lookup of {}.{} found a match: {}",
                    collection,
                    field,
                    found.is_some()
                );
                Ok(found)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Read, e).await),
        }
    }

    /// Merges `patch` into the document with identifier `id`.
    ///
    /// Fields in `patch` overwrite or extend the stored document; fields it does not
    /// mention are kept.
    ///
    /// # Returns
    ///
    /// `true` iff a document matched and at least one stored value changed. A missing
    /// document, an empty patch and a patch equal to the stored values all yield
    /// `false`; an empty patch does not contact the backend.
    ///
    /// # Errors
    ///
    /// * `Validation` - the collection name or identifier is invalid, the patch is not
    ///   an object, it tries to change `_id` or a field name is empty, dotted or
    ///   starts with `$`.
    /// * `NotConnected` - no endpoint could be reached.
    /// * `Backend` - the backend failed the update.
    pub async fn update(&self, collection: &str, id: impl IntoObjectId, patch: Value) -> Result<bool> {
        validate_collection_name(collection)?;
        let id = id.into_object_id()?;
        let patch = into_mapping(patch)?;
        reject_reserved(&patch)?;
        validate_field_names(&patch)?;
        if patch.is_empty() {
            debug!("Empty patch for {} in {}, nothing to update", id, collection);
            return Ok(false);
        }

        let active = connection(&self.manager, collection, Operation::Update).await?;
        match active.backend.update_one(collection, &id, patch).await {
            Ok(outcome) => {
                let changed = outcome.matched > 0 && outcome.modified > 0;
                debug!(
                    "Update of {} in {}: matched {}, modified {}",
                    id, collection, outcome.matched, outcome.modified
                );
                Ok(changed)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Update, e).await),
        }
    }

    /// Removes the document with identifier `id`.
    ///
    /// Returns `true` iff a document was removed, so a repeated delete returns `false`.
    ///
    /// # Errors
    ///
    /// * `Validation` - the collection name or identifier is invalid.
    /// * `NotConnected` - no endpoint could be reached.
    /// * `Backend` - the backend failed the delete.
    pub async fn delete(&self, collection: &str, id: impl IntoObjectId) -> Result<bool> {
        validate_collection_name(collection)?;
        let id = id.into_object_id()?;

        let active = connection(&self.manager, collection, Operation::Delete).await?;
        match active.backend.delete_one(collection, &id).await {
            Ok(deleted) => {
                debug!("Delete of {} in {} removed {} document(s)", id, collection, deleted);
                Ok(deleted > 0)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Delete, e).await),
        }
    }

    /// Lists the collections that currently exist, freshly queried from the backend.
    ///
    /// # Errors
    ///
    /// * `NotConnected` - no endpoint could be reached.
    /// * `Backend` - the backend failed the listing.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let active = connection(&self.manager, ALL_COLLECTIONS, Operation::ListCollections).await?;
        match active.backend.list_collection_names().await {
            Ok(mut names) => {
                names.sort();
                Ok(names)
            },
            Err(e) => {
                Err(backend_failure(
                    &self.manager,
                    &active,
                    ALL_COLLECTIONS,
                    Operation::ListCollections,
                    e,
                )
                .await)
            },
        }
    }

    /// Releases the connection. The next operation reconnects lazily.
    pub async fn shutdown(&self) {
        info!("Shutting down document store");
        self.manager.disconnect().await;
    }

    /// Fetches one document by a well-formed identifier.
    async fn fetch(&self, collection: &str, id: &ObjectId) -> Result<Option<Document>> {
        let active = connection(&self.manager, collection, Operation::Read).await?;
        match active.backend.find_by_id(collection, id).await {
            Ok(found) => {
                if found.is_none() {
                    debug!("Document {} not found in {}", id, collection);
                }
                Ok(found)
            },
            Err(e) => Err(backend_failure(&self.manager, &active, collection, Operation::Read, e).await),
        }
    }
}

/// Collection label used in errors about store-wide operations.
const ALL_COLLECTIONS: &str = "*";
