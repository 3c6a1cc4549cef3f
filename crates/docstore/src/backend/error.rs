use thiserror::Error;

/// Failure reported by a concrete backend.
///
/// These errors stay inside the crate: the Document Store logs them and maps them
/// onto [`crate::StoreError`]. The split between [`BackendError::Connectivity`] and the
/// other variants decides whether the current connection is dropped.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The endpoint could not be reached or stopped answering.
    #[error("Connectivity failure: {reason}")]
    Connectivity {
        reason: String,
    },

    /// The backend rejected or failed a specific operation.
    #[error("Operation failed: {reason}")]
    Operation {
        reason: String,
    },

    /// The candidate URI could not be parsed.
    #[error("Invalid connection URI '{uri}': {reason}")]
    InvalidUri {
        uri:    String,
        reason: String,
    },

    /// No backend serves this URI scheme in the current build.
    #[error("Unsupported URI scheme '{scheme}'")]
    UnsupportedScheme {
        scheme: String,
    },

    /// I/O operations failed.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Stored data is not in the expected shape.
    #[error("Stored data is corrupted: {reason}")]
    Corrupted {
        reason: String,
    },
}

impl BackendError {
    /// Returns `true` when the failure means the connection itself is gone.
    pub const fn is_connectivity(&self) -> bool { matches!(*self, Self::Connectivity { .. }) }
}

/// Result type alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
