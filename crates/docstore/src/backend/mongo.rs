use std::time::Duration;

use futures::TryStreamExt as _;
use mongodb::{
    bson::{self, doc, Bson, Document as BsonDocument},
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
    Client,
    Collection,
    Database,
};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    backend::{redact, Backend, BackendError, BackendResult, UpdateOutcome},
    constants::ID_FIELD,
    Document,
    ObjectId,
};

/// Document store served by a MongoDB deployment.
///
/// The driver owns connection pooling and per-operation timeouts; this type only
/// translates between JSON mappings and BSON and classifies driver errors.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    /// Driver handle, shared by every in-flight operation.
    client:   Client,
    /// Selected database.
    database: Database,
}

impl MongoBackend {
    /// Builds a client for `uri`.
    ///
    /// The database named in the URI path wins over `database`. No round trip is made
    /// here; the caller confirms liveness with [`Backend::ping`].
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidUri` when the driver rejects the URI.
    pub async fn open(uri: &str, database: &str, connect_timeout: Duration) -> BackendResult<Self> {
        trace!("Building MongoDB client for {}", redact(uri));
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            BackendError::InvalidUri {
                uri:    redact(uri),
                reason: e.to_string(),
            }
        })?;
        options.server_selection_timeout = Some(connect_timeout);
        options.connect_timeout = Some(connect_timeout);
        let client = Client::with_options(options).map_err(classify)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(database));
        debug!("MongoDB client targets database {}", database.name());
        Ok(Self {
            client,
            database,
        })
    }

    /// Typed handle of a collection.
    fn collection(&self, name: &str) -> Collection<BsonDocument> { self.database.collection(name) }
}

/// Maps a driver error onto the backend taxonomy.
fn classify(err: MongoError) -> BackendError {
    let connectivity = matches!(
        *err.kind,
        ErrorKind::ServerSelection { .. } |
            ErrorKind::Io(_) |
            ErrorKind::ConnectionPoolCleared { .. } |
            ErrorKind::DnsResolve { .. }
    );
    if connectivity {
        BackendError::Connectivity {
            reason: err.to_string(),
        }
    }
    else {
        BackendError::Operation {
            reason: err.to_string(),
        }
    }
}

/// Converts JSON fields into a BSON document.
fn to_bson_document(fields: &Map<String, Value>) -> BackendResult<BsonDocument> {
    bson::to_document(fields).map_err(|e| {
        BackendError::Operation {
            reason: format!("document cannot be encoded as BSON: {}", e),
        }
    })
}

/// Filter selecting one identifier.
fn id_filter(id: &ObjectId) -> BsonDocument {
    let mut filter = BsonDocument::new();
    filter.insert(ID_FIELD, id.as_bson());
    filter
}

/// Converts a stored BSON document into a [`Document`].
fn from_bson_document(mut raw: BsonDocument) -> BackendResult<Document> {
    let id = match raw.remove(ID_FIELD) {
        Some(Bson::ObjectId(oid)) => ObjectId::from(oid),
        other => {
            return Err(BackendError::Corrupted {
                reason: format!("document has a non-ObjectId identifier: {:?}", other),
            });
        },
    };
    match Bson::Document(raw).into_relaxed_extjson() {
        Value::Object(fields) => Ok(Document::new(id, fields)),
        other => {
            Err(BackendError::Corrupted {
                reason: format!("document {} decoded to a non-object: {}", id, other),
            })
        },
    }
}

#[async_trait::async_trait]
impl Backend for MongoBackend {
    async fn ping(&self) -> BackendResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                BackendError::Connectivity {
                    reason: e.to_string(),
                }
            })?;
        Ok(())
    }

    async fn list_collection_names(&self) -> BackendResult<Vec<String>> {
        self.database
            .list_collection_names()
            .await
            .map_err(classify)
    }

    async fn insert_one(&self, collection: &str, fields: Map<String, Value>) -> BackendResult<ObjectId> {
        let document = to_bson_document(&fields)?;
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(classify)?;
        match result.inserted_id {
            Bson::ObjectId(oid) => Ok(ObjectId::from(oid)),
            other => {
                Err(BackendError::Corrupted {
                    reason: format!("server assigned a non-ObjectId identifier: {}", other),
                })
            },
        }
    }

    async fn find_all(&self, collection: &str) -> BackendResult<Vec<Document>> {
        let raw: Vec<BsonDocument> = self
            .collection(collection)
            .find(doc! {})
            .await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(classify)?;
        raw.into_iter().map(from_bson_document).collect()
    }

    async fn find_by_id(&self, collection: &str, id: &ObjectId) -> BackendResult<Option<Document>> {
        self.collection(collection)
            .find_one(id_filter(id))
            .await
            .map_err(classify)?
            .map(from_bson_document)
            .transpose()
    }

    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> BackendResult<Option<Document>> {
        let value = bson::to_bson(value).map_err(|e| {
            BackendError::Operation {
                reason: format!("lookup value cannot be encoded as BSON: {}", e),
            }
        })?;
        let mut filter = BsonDocument::new();
        filter.insert(field, value);
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(classify)?
            .map(from_bson_document)
            .transpose()
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &ObjectId,
        patch: Map<String, Value>,
    ) -> BackendResult<UpdateOutcome> {
        let set = to_bson_document(&patch)?;
        let result = self
            .collection(collection)
            .update_one(id_filter(id), doc! { "$set": set })
            .await
            .map_err(classify)?;
        Ok(UpdateOutcome {
            matched:  result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, id: &ObjectId) -> BackendResult<u64> {
        let result = self
            .collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(classify)?;
        Ok(result.deleted_count)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        debug!("MongoDB client shut down");
    }
}
