use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{
    backend::{Backend, BackendError, BackendResult, UpdateOutcome},
    Document,
    ObjectId,
};

/// Documents of one collection keyed by identifier.
type CollectionMap = HashMap<ObjectId, Map<String, Value>>;

/// Process-local document store, used as a last-resort fallback and in tests.
///
/// Each instance starts empty and its contents vanish with it. After [`Backend::close`]
/// every operation fails with a connectivity error, exactly like a dropped network
/// connection would.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Collections, created on first insert.
    collections: RwLock<HashMap<String, CollectionMap>>,
    /// Set once the backend has been closed.
    closed:      AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty store.
    pub fn new() -> Self { Self::default() }

    /// Fails when the backend has been closed.
    fn check_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Connectivity {
                reason: "in-memory store has been closed".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn ping(&self) -> BackendResult<()> { self.check_open() }

    async fn list_collection_names(&self) -> BackendResult<Vec<String>> {
        self.check_open()?;
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn insert_one(&self, collection: &str, fields: Map<String, Value>) -> BackendResult<ObjectId> {
        self.check_open()?;
        let id = ObjectId::new();
        trace!("Inserting {} into in-memory collection {}", id, collection);
        self.collections
            .write()
            .await
            .entry(collection.to_owned())
            .or_default()
            .insert(id, fields);
        Ok(id)
    }

    async fn find_all(&self, collection: &str) -> BackendResult<Vec<Document>> {
        self.check_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_id(&self, collection: &str, id: &ObjectId) -> BackendResult<Option<Document>> {
        self.check_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(*id, fields.clone())))
    }

    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> BackendResult<Option<Document>> {
        self.check_open()?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|&(_, fields)| fields.get(field) == Some(value))
                .map(|(id, fields)| Document::new(*id, fields.clone()))
        }))
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &ObjectId,
        patch: Map<String, Value>,
    ) -> BackendResult<UpdateOutcome> {
        self.check_open()?;
        let mut collections = self.collections.write().await;
        let Some(fields) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Ok(UpdateOutcome::default());
        };

        let mut doc = Document::new(*id, std::mem::take(fields));
        let changed = doc.apply_patch(&patch);
        *fields = doc.into_fields();
        Ok(UpdateOutcome {
            matched:  1,
            modified: u64::from(changed),
        })
    }

    async fn delete_one(&self, collection: &str, id: &ObjectId) -> BackendResult<u64> {
        self.check_open()?;
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        Ok(u64::from(removed))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("In-memory store closed");
        }
    }
}
