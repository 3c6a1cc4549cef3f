//! Filesystem-backed document store.
//!
//! Layout under the root directory:
//! - `data/` holds one directory per collection, created on first write
//! - `data/{collection}/{id}.json` holds one document with its metadata

/// Directory walking helpers.
pub mod streaming;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{fs as tokio_fs, sync::Mutex};
use tracing::{debug, error, trace};

use crate::{
    backend::{Backend, BackendError, BackendResult, UpdateOutcome},
    constants::{DATA_DIR, DOCUMENT_EXTENSION},
    Document,
    ObjectId,
};
use self::streaming::stream_document_ids;

/// On-disk representation of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    /// Identifier, repeated inside the file so a renamed file is detectable.
    id:         ObjectId,
    /// When the document was inserted.
    created_at: DateTime<Utc>,
    /// When a field value last changed.
    updated_at: DateTime<Utc>,
    /// The document fields.
    data:       Map<String, Value>,
}

/// Document store persisted as JSON files below a root directory.
///
/// Reads go straight to the filesystem. Writes are serialized through one lock so
/// that the read-merge-write of an update is atomic per document, and every file is
/// written to a temporary sibling first and renamed into place.
#[derive(Debug)]
pub struct FileBackend {
    /// The root directory of the store.
    root:       PathBuf,
    /// Serializes writers.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Connectivity` when the root directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref().to_path_buf();
        trace!("Opening filesystem store at {:?}", root);
        tokio_fs::create_dir_all(&root).await.map_err(|e| {
            error!("Failed to create store root directory {:?}: {}", root, e);
            BackendError::Connectivity {
                reason: format!("cannot create {}: {}", root.display(), e),
            }
        })?;
        debug!("Store root directory created or already exists: {:?}", root);
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory of the store.
    pub fn root(&self) -> &Path { &self.root }

    /// Directory of a collection.
    fn collection_path(&self, collection: &str) -> PathBuf { self.root.join(DATA_DIR).join(collection) }

    /// File of a document.
    fn document_path(&self, collection: &str, id: &ObjectId) -> PathBuf {
        self.collection_path(collection)
            .join(format!("{}.{}", id, DOCUMENT_EXTENSION))
    }

    /// Reads one stored document, `None` if the file does not exist.
    async fn read_stored(&self, collection: &str, id: &ObjectId) -> BackendResult<Option<StoredDocument>> {
        let file_path = self.document_path(collection, id);
        match tokio_fs::read_to_string(&file_path).await {
            Ok(content) => {
                let stored: StoredDocument = serde_json::from_str(&content).map_err(|e| {
                    error!("Failed to parse JSON for document {}: {}", id, e);
                    e
                })?;
                if stored.id != *id {
                    return Err(BackendError::Corrupted {
                        reason: format!("file {} contains document {}", file_path.display(), stored.id),
                    });
                }
                Ok(Some(stored))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("IO error reading document {}: {}", id, e);
                Err(e.into())
            },
        }
    }

    /// Writes one stored document through a temporary file.
    async fn write_stored(&self, collection: &str, stored: &StoredDocument) -> BackendResult<()> {
        let dir = self.collection_path(collection);
        tokio_fs::create_dir_all(&dir).await.map_err(|e| {
            error!("Failed to create collection directory {:?}: {}", dir, e);
            e
        })?;
        let file_path = self.document_path(collection, &stored.id);
        let tmp_path = dir.join(format!(".{}.tmp", stored.id));
        let json = serde_json::to_string_pretty(stored)?;
        tokio_fs::write(&tmp_path, json).await.map_err(|e| {
            error!("Failed to write document {} to {:?}: {}", stored.id, tmp_path, e);
            e
        })?;
        tokio_fs::rename(&tmp_path, &file_path).await.map_err(|e| {
            error!("Failed to move document {} into place: {}", stored.id, e);
            e
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for FileBackend {
    async fn ping(&self) -> BackendResult<()> {
        match tokio_fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => {
                Err(BackendError::Connectivity {
                    reason: format!("{} is not a directory", self.root.display()),
                })
            },
            Err(e) => {
                Err(BackendError::Connectivity {
                    reason: format!("{} is not accessible: {}", self.root.display(), e),
                })
            },
        }
    }

    async fn list_collection_names(&self) -> BackendResult<Vec<String>> {
        trace!("Listing collections");
        let data_path = self.root.join(DATA_DIR);
        let mut entries = match tokio_fs::read_dir(&data_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read data directory {:?}: {}", data_path, e);
                return Err(e.into());
            },
        };

        let mut collections = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() &&
                let Some(name) = entry.file_name().to_str()
            {
                collections.push(name.to_owned());
            }
        }
        debug!("Found {} collections", collections.len());
        Ok(collections)
    }

    async fn insert_one(&self, collection: &str, fields: Map<String, Value>) -> BackendResult<ObjectId> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let stored = StoredDocument {
            id:         ObjectId::new(),
            created_at: now,
            updated_at: now,
            data:       fields,
        };
        self.write_stored(collection, &stored).await?;
        debug!("Document {} inserted into {}", stored.id, collection);
        Ok(stored.id)
    }

    async fn find_all(&self, collection: &str) -> BackendResult<Vec<Document>> {
        let ids: Vec<ObjectId> = stream_document_ids(self.collection_path(collection))
            .try_collect()
            .await?;
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted between listing and reading.
            if let Some(stored) = self.read_stored(collection, &id).await? {
                documents.push(Document::new(stored.id, stored.data));
            }
        }
        Ok(documents)
    }

    async fn find_by_id(&self, collection: &str, id: &ObjectId) -> BackendResult<Option<Document>> {
        Ok(self
            .read_stored(collection, id)
            .await?
            .map(|stored| Document::new(stored.id, stored.data)))
    }

    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> BackendResult<Option<Document>> {
        let mut ids = stream_document_ids(self.collection_path(collection));
        while let Some(id) = ids.try_next().await? {
            if let Some(stored) = self.read_stored(collection, &id).await? &&
                stored.data.get(field) == Some(value)
            {
                return Ok(Some(Document::new(stored.id, stored.data)));
            }
        }
        Ok(None)
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &ObjectId,
        patch: Map<String, Value>,
    ) -> BackendResult<UpdateOutcome> {
        let _guard = self.write_lock.lock().await;
        let Some(mut stored) = self.read_stored(collection, id).await?
        else {
            return Ok(UpdateOutcome::default());
        };

        let mut doc = Document::new(stored.id, stored.data);
        let changed = doc.apply_patch(&patch);
        stored.data = doc.into_fields();
        if changed {
            stored.updated_at = Utc::now();
            self.write_stored(collection, &stored).await?;
            debug!("Document {} updated in {}", id, collection);
        }
        Ok(UpdateOutcome {
            matched:  1,
            modified: u64::from(changed),
        })
    }

    async fn delete_one(&self, collection: &str, id: &ObjectId) -> BackendResult<u64> {
        let _guard = self.write_lock.lock().await;
        let file_path = self.document_path(collection, id);
        match tokio_fs::remove_file(&file_path).await {
            Ok(()) => {
                debug!("Document {} deleted from {}", id, collection);
                Ok(1)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Document {} not found, already deleted or never existed", id);
                Ok(0)
            },
            Err(e) => {
                error!("IO error deleting document {}: {}", id, e);
                Err(e.into())
            },
        }
    }

    async fn close(&self) {
        trace!("Filesystem store at {:?} released", self.root);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("nested").join("store");
        let backend = FileBackend::open(&root).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.root(), root.as_path());
        backend.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_fails_when_root_removed() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("store");
        let backend = FileBackend::open(&root).await.unwrap();
        tokio_fs::remove_dir_all(&root).await.unwrap();
        assert!(backend.ping().await.unwrap_err().is_connectivity());
    }

    #[tokio::test]
    async fn test_insert_writes_json_file() {
        let temp_dir = tempdir().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();
        let id = backend
            .insert_one("tasks", fields(json!({"title": "write"})))
            .await
            .unwrap();

        let path = temp_dir
            .path()
            .join("data")
            .join("tasks")
            .join(format!("{}.json", id));
        let content = tokio_fs::read_to_string(&path).await.unwrap();
        let raw: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(raw["id"], json!(id.to_hex()));
        assert_eq!(raw["data"], json!({"title": "write"}));
        assert!(raw["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let temp_dir = tempdir().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();
        assert!(backend.find_all("tasks").await.unwrap().is_empty());

        let id = backend
            .insert_one("tasks", fields(json!({"a": 1, "b": 2})))
            .await
            .unwrap();
        let outcome = backend
            .update_one("tasks", &id, fields(json!({"b": 3})))
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        let outcome = backend
            .update_one("tasks", &id, fields(json!({"b": 3})))
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.modified, 0);

        let doc = backend.find_by_id("tasks", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields(), &fields(json!({"a": 1, "b": 3})));

        assert_eq!(backend.delete_one("tasks", &id).await.unwrap(), 1);
        assert_eq!(backend.delete_one("tasks", &id).await.unwrap(), 0);
        assert!(backend.find_by_id("tasks", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_collections_and_find_by_field() {
        let temp_dir = tempdir().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();
        assert!(backend.list_collection_names().await.unwrap().is_empty());

        backend
            .insert_one("users", fields(json!({"username": "alice"})))
            .await
            .unwrap();
        backend
            .insert_one("tasks", fields(json!({"title": "t"})))
            .await
            .unwrap();

        let mut names = backend.list_collection_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["tasks".to_owned(), "users".to_owned()]);

        let alice = backend
            .find_one_by_field("users", "username", &json!("alice"))
            .await
            .unwrap();
        assert_eq!(alice.unwrap().get("username"), Some(&json!("alice")));
        assert!(backend
            .find_one_by_field("users", "username", &json!("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let id = {
            let backend = FileBackend::open(temp_dir.path()).await.unwrap();
            backend
                .insert_one("tasks", fields(json!({"x": "v"})))
                .await
                .unwrap()
        };
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();
        let doc = backend.find_by_id("tasks", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("x"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn test_mismatched_file_is_reported_as_corrupted() {
        let temp_dir = tempdir().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();
        let id = backend.insert_one("tasks", Map::new()).await.unwrap();
        let other = ObjectId::new();
        let dir = temp_dir.path().join("data").join("tasks");
        tokio_fs::rename(
            dir.join(format!("{}.json", id)),
            dir.join(format!("{}.json", other)),
        )
        .await
        .unwrap();
        assert!(matches!(
            backend.find_by_id("tasks", &other).await,
            Err(BackendError::Corrupted { .. })
        ));
    }
}
