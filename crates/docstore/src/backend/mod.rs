//! Concrete document stores that a connection can point at.
//!
//! The Connection Manager only ever sees two traits: a [`Connector`] that turns a
//! candidate URI into a live [`Backend`], and the [`Backend`] itself, which is the
//! narrow set of single-document operations the Document Store needs. Which backend
//! serves a URI is decided by its scheme, see [`Endpoint`].

use std::{fmt, sync::Arc, time::Duration};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{constants::DEFAULT_DATABASE_NAME, Document, ObjectId};

/// Backend error types.
pub mod error;
/// URI classification.
pub mod endpoint;
/// Filesystem-backed store.
pub mod file;
/// In-memory store.
pub mod memory;
/// MongoDB store.
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use endpoint::{redact, Endpoint};
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "mongodb")]
pub use mongo::MongoBackend;

/// Result of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Number of documents that matched the identifier.
    pub matched:  u64,
    /// Number of documents whose stored state actually changed.
    pub modified: u64,
}

/// A live connection to a document store.
///
/// Implementations must be safe for concurrent use by many in-flight operations;
/// every method is a single-document (or single-listing) round trip and is atomic
/// at the granularity of one document.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Lightweight round trip confirming the connection is usable.
    async fn ping(&self) -> BackendResult<()>;

    /// Names of the collections that currently exist.
    async fn list_collection_names(&self) -> BackendResult<Vec<String>>;

    /// Inserts a document and returns the identifier the backend assigned.
    async fn insert_one(&self, collection: &str, fields: Map<String, Value>) -> BackendResult<ObjectId>;

    /// Every document of the collection, in no particular order.
    async fn find_all(&self, collection: &str) -> BackendResult<Vec<Document>>;

    /// The document with the given identifier, if any.
    async fn find_by_id(&self, collection: &str, id: &ObjectId) -> BackendResult<Option<Document>>;

    /// Some document whose `field` equals `value`, if any.
    async fn find_one_by_field(&self, collection: &str, field: &str, value: &Value)
    -> BackendResult<Option<Document>>;

    /// Merges `patch` into the document with the given identifier.
    async fn update_one(
        &self,
        collection: &str,
        id: &ObjectId,
        patch: Map<String, Value>,
    ) -> BackendResult<UpdateOutcome>;

    /// Removes the document with the given identifier, returning how many were removed.
    async fn delete_one(&self, collection: &str, id: &ObjectId) -> BackendResult<u64>;

    /// Releases the underlying resources. Further calls are unspecified but must not panic.
    async fn close(&self);
}

/// Opens backends for candidate URIs.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection for `uri`. The caller performs the liveness check.
    async fn open(&self, uri: &str) -> BackendResult<Arc<dyn Backend>>;
}

/// Connector dispatching on the URI scheme to the built-in backends.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    /// Database selected on servers that host several.
    database:        String,
    /// Upper bound for server selection on network backends.
    connect_timeout: Duration,
}

impl DefaultConnector {
    /// Creates a connector selecting `database`, bounding network connects by `connect_timeout`.
    pub fn new(database: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            database: database.into(),
            connect_timeout,
        }
    }

    /// Returns the database name selected on multi-database servers.
    pub fn database(&self) -> &str { &self.database }

    /// Returns the bound applied to network connects.
    pub const fn connect_timeout(&self) -> Duration { self.connect_timeout }
}

impl Default for DefaultConnector {
    fn default() -> Self {
        Self::new(
            DEFAULT_DATABASE_NAME,
            Duration::from_millis(crate::constants::DEFAULT_CONNECT_TIMEOUT_MS),
        )
    }
}

#[async_trait::async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, uri: &str) -> BackendResult<Arc<dyn Backend>> {
        trace!("Opening backend for {}", redact(uri));
        let endpoint = Endpoint::parse(uri)?;
        debug!("Candidate {} classified as {:?}", redact(uri), endpoint_kind(&endpoint));
        match endpoint {
            Endpoint::Memory {
                ..
            } => Ok(Arc::new(MemoryBackend::new())),
            Endpoint::File {
                root,
            } => Ok(Arc::new(FileBackend::open(root).await?)),
            #[cfg(feature = "mongodb")]
            Endpoint::Mongo {
                uri,
            } => {
                Ok(Arc::new(
                    MongoBackend::open(&uri, &self.database, self.connect_timeout).await?,
                ))
            },
            #[cfg(not(feature = "mongodb"))]
            Endpoint::Mongo {
                ..
            } => {
                Err(BackendError::UnsupportedScheme {
                    scheme: "mongodb".to_owned(),
                })
            },
        }
    }
}

/// Short backend label for log lines.
const fn endpoint_kind(endpoint: &Endpoint) -> &'static str {
    match *endpoint {
        Endpoint::Memory {
            ..
        } => "memory",
        Endpoint::File {
            ..
        } => "file",
        Endpoint::Mongo {
            ..
        } => "mongodb",
    }
}
