//! Constants for reserved names, defaults and environment keys used throughout the crate.
//!
//! This module centralizes all special names to prevent typos and ensure consistency.

/// Reserved document field holding the store-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// Database name used when none is configured.
pub const DEFAULT_DATABASE_NAME: &str = "tasktracker";

/// Well-known local endpoint tried after the primary URI.
pub const DEFAULT_LOCAL_HOST: &str = "mongodb://localhost:27017";

/// Default upper bound for a single connect attempt (open + liveness check).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Environment variable carrying the primary connection URI.
pub const ENV_PRIMARY_URI: &str = "MONGO_URI";

/// Environment variable overriding the database name.
pub const ENV_DATABASE: &str = "DOCSTORE_DATABASE";

/// Environment variable enabling the in-memory fallback candidate.
pub const ENV_MEMORY_FALLBACK: &str = "DOCSTORE_MEMORY_FALLBACK";

/// Environment variable overriding the connect timeout, in milliseconds.
pub const ENV_CONNECT_TIMEOUT_MS: &str = "DOCSTORE_CONNECT_TIMEOUT_MS";

/// URI scheme of the in-memory backend.
pub const MEMORY_SCHEME: &str = "memory";

/// URI scheme of the filesystem backend.
pub const FILE_SCHEME: &str = "file";

/// URI schemes served by the MongoDB driver.
pub const MONGODB_SCHEMES: &[&str] = &["mongodb", "mongodb+srv"];

/// Directory holding collection directories inside a filesystem store.
pub const DATA_DIR: &str = "data";

/// File extension for document files in a filesystem store.
pub const DOCUMENT_EXTENSION: &str = "json";

/// Length of an identifier in its external (hex) representation.
pub const OBJECT_ID_HEX_LEN: usize = 24;

/// Length of an identifier in bytes.
pub const OBJECT_ID_LEN: usize = 12;
