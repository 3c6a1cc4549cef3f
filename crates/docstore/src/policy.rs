//! Per-collection rules enforced before a document is inserted.
//!
//! Rules are registered explicitly per collection in a [`PolicyTable`] and handed to
//! the Document Store at construction. Nothing is enforced for a collection that has
//! no entry.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    backend::{Backend, BackendError},
    error::ValidationError,
};

/// Why a policy rejected an insert.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The document breaks the rule.
    #[error(transparent)]
    Violation(#[from] ValidationError),
    /// The backend lookup needed to evaluate the rule failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A rule evaluated against every document about to be inserted into a collection.
#[async_trait::async_trait]
pub trait InsertPolicy: Send + Sync + fmt::Debug {
    /// Checks `fields` before they are inserted into `collection`.
    ///
    /// `backend` is the live connection the insert will go to, available for lookups.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Violation` to reject the document and
    /// `PolicyError::Backend` when the check itself could not be carried out.
    async fn check(
        &self,
        backend: &dyn Backend,
        collection: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), PolicyError>;
}

/// Rejects a document whose value for `field` already exists in the collection.
///
/// Documents without the field are accepted. The check and the insert are two
/// separate round trips, so two concurrent inserts of the same value can both pass;
/// a unique index on the server closes that gap where one is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueField {
    field: String,
}

impl UniqueField {
    /// Creates a policy keeping `field` unique.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Returns the guarded field.
    pub fn field(&self) -> &str { &self.field }
}

#[async_trait::async_trait]
impl InsertPolicy for UniqueField {
    async fn check(
        &self,
        backend: &dyn Backend,
        collection: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), PolicyError> {
        let Some(value) = fields.get(&self.field)
        else {
            return Ok(());
        };
        trace!("Checking uniqueness of {}.{}", collection, self.field);
        if let Some(existing) = backend
            .find_one_by_field(collection, &self.field, value)
            .await?
        {
            debug!(
                "Insert into {} rejected: {} already used by {}",
                collection,
                self.field,
                existing.id()
            );
            return Err(ValidationError::DuplicateKey {
                collection: collection.to_owned(),
                field:      self.field.clone(),
                value:      value.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Insert policies keyed by collection name.
///
/// # Examples
///
/// ```rust
/// use docstore::{PolicyTable, UniqueField};
///
/// let policies = PolicyTable::new().with("users", UniqueField::new("username"));
/// assert_eq!(policies.policies_for("users").len(), 1);
/// assert!(policies.policies_for("tasks").is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, Vec<Arc<dyn InsertPolicy>>>,
}

impl PolicyTable {
    /// Creates an empty table.
    pub fn new() -> Self { Self::default() }

    /// Adds `policy` to the rules of `collection`.
    #[must_use]
    pub fn with(mut self, collection: impl Into<String>, policy: impl InsertPolicy + 'static) -> Self {
        self.insert(collection, Arc::new(policy));
        self
    }

    /// Adds an already shared policy to the rules of `collection`.
    pub fn insert(&mut self, collection: impl Into<String>, policy: Arc<dyn InsertPolicy>) {
        self.policies
            .entry(collection.into())
            .or_default()
            .push(policy);
    }

    /// Returns the rules of `collection`, in registration order.
    pub fn policies_for(&self, collection: &str) -> &[Arc<dyn InsertPolicy>] {
        self.policies
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` when no collection has a rule.
    pub fn is_empty(&self) -> bool { self.policies.is_empty() }
}
