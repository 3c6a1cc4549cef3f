use std::fmt;

use thiserror::Error;

/// The CRUD operation a failure was raised from.
///
/// Carried by [`StoreError::Backend`] so that a logged or surfaced failure always
/// names both the collection and the operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Inserting a new document.
    Create,
    /// Listing a collection or fetching one document.
    Read,
    /// Merging a patch into an existing document.
    Update,
    /// Removing a document.
    Delete,
    /// Listing the collections of the connected database.
    ListCollections,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ListCollections => "list_collections",
        };
        f.write_str(name)
    }
}

/// Malformed caller input, always detected before any backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A document or patch was not a key-value mapping.
    #[error("Expected a key-value mapping, found {found}")]
    NotAMapping {
        found: &'static str,
    },

    /// The identifier is not exactly 24 hexadecimal characters.
    #[error("Invalid identifier: '{id}'")]
    InvalidIdentifier {
        id: String,
    },

    /// The caller tried to supply or overwrite the reserved identifier field.
    #[error("Field '{field}' is reserved and assigned by the store")]
    ReservedField {
        field: String,
    },

    /// A field name would be read as a path or an operator by some backends.
    #[error("Invalid field name '{field}': {reason}")]
    InvalidFieldName {
        field:  String,
        reason: &'static str,
    },

    /// The collection name cannot be used by the store.
    #[error("Invalid collection name: '{name}'")]
    InvalidCollectionName {
        name: String,
    },

    /// A per-collection uniqueness policy rejected the insert.
    #[error("Duplicate value for unique field '{field}' in collection '{collection}': {value}")]
    DuplicateKey {
        collection: String,
        field:      String,
        value:      String,
    },
}

/// Uniform failure of a Document Store operation.
///
/// This is the whole error surface handed to collaborators: backend-native error
/// types never cross it. A well-formed identifier that matches nothing is not an
/// error and is reported through the return value instead (`ReadOutcome::NotFound`,
/// or `false` from `update`/`delete`).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input was rejected before the backend was contacted.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No candidate endpoint could be reached.
    #[error("Not connected: none of {attempted} candidate endpoint(s) could be reached")]
    NotConnected {
        attempted: usize,
    },

    /// The backend accepted the connection but failed this operation.
    #[error("Backend failure during {operation} on collection '{collection}': {reason}")]
    Backend {
        collection: String,
        operation:  Operation,
        reason:     String,
    },
}

impl StoreError {
    /// Returns `true` for input validation failures.
    pub const fn is_validation(&self) -> bool { matches!(*self, Self::Validation(_)) }

    /// Returns `true` when the store could not (re)establish a connection.
    pub const fn is_not_connected(&self) -> bool { matches!(*self, Self::NotConnected { .. }) }

    /// Returns `true` when the backend failed an otherwise valid operation.
    pub const fn is_backend(&self) -> bool { matches!(*self, Self::Backend { .. }) }
}

/// Result type alias for Document Store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
