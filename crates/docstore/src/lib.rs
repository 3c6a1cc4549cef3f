//! Resilient access to a document store.
//!
//! The crate is split in two layers:
//!
//! - [`ConnectionManager`] owns a single connection. It tries an ordered list of
//!   candidate URIs, keeps the first one that answers a liveness check and releases
//!   it on request, on drop or on a termination signal.
//! - [`DocumentStore`] offers create, read, update and delete on named collections
//!   over that connection. It connects lazily, validates every input before touching
//!   the backend and reports failures through the closed [`StoreError`] taxonomy.
//!
//! Backends are picked by URI scheme: `mongodb://` and `mongodb+srv://` (with the
//! default `mongodb` feature), `file://` for a directory of JSON files and
//! `memory://` for a process-local store.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use docstore::{ConnectionManager, DocumentStore, PolicyTable, UniqueField};
//! use serde_json::json;
//!
//! # async fn example() -> docstore::Result<()> {
//! let manager = Arc::new(ConnectionManager::with_default_connector(vec![
//!     String::new(),
//!     "memory://tasktracker".to_owned(),
//! ]));
//! let store = DocumentStore::new(manager)
//!     .with_policies(PolicyTable::new().with("users", UniqueField::new("username")));
//!
//! let id = store.create("users", json!({"username": "ada"})).await?;
//! assert!(store.get("users", &id).await?.is_some());
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod constants;
pub mod document;
pub mod error;
pub mod object_id;
pub mod policy;
pub mod store;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, BackendError, Connector, DefaultConnector, Endpoint};
pub use config::{Config, ConfigError};
pub use connection::{ActiveConnection, ConnectionManager, ConnectionState};
pub use document::Document;
pub use error::{Operation, Result, StoreError, ValidationError};
pub use object_id::{IntoObjectId, ObjectId};
pub use policy::{InsertPolicy, PolicyError, PolicyTable, UniqueField};
pub use store::{DocumentStore, ReadOutcome};
