//! Environment-supplied connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_DATABASE_NAME,
    DEFAULT_LOCAL_HOST,
    ENV_CONNECT_TIMEOUT_MS,
    ENV_DATABASE,
    ENV_MEMORY_FALLBACK,
    ENV_PRIMARY_URI,
    MEMORY_SCHEME,
};

/// Malformed configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value that cannot be interpreted.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key:    String,
        value:  String,
        reason: String,
    },
}

/// Connection configuration.
///
/// The candidate list derived from it is exactly the primary URI (when set)
/// followed by the well-known local default, optionally followed by an in-memory
/// store when `memory_fallback` is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Highest-priority connection URI, usually supplied through `MONGO_URI`.
    pub primary_uri:     Option<String>,
    /// Database used by the local default endpoint and by servers without a URI path.
    pub database:        String,
    /// Append `memory://<database>` as the last candidate.
    pub memory_fallback: bool,
    /// Upper bound for one connect attempt on network backends.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_uri:     None,
            database:        DEFAULT_DATABASE_NAME.to_owned(),
            memory_fallback: false,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable cannot be interpreted.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Unset and blank variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable cannot be interpreted.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        trace!("Loading configuration");
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.primary_uri = get(ENV_PRIMARY_URI);
        if let Some(database) = get(ENV_DATABASE) {
            config.database = database;
        }
        if let Some(raw) = get(ENV_MEMORY_FALLBACK) {
            config.memory_fallback = parse_bool(ENV_MEMORY_FALLBACK, &raw)?;
        }
        if let Some(raw) = get(ENV_CONNECT_TIMEOUT_MS) {
            let millis = raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue {
                    key:    ENV_CONNECT_TIMEOUT_MS.to_owned(),
                    value:  raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.connect_timeout = Duration::from_millis(millis);
        }

        debug!(
            "Configuration loaded (primary URI set: {}, database: {}, memory fallback: {})",
            config.primary_uri.is_some(),
            config.database,
            config.memory_fallback
        );
        Ok(config)
    }

    /// The well-known local endpoint for the configured database.
    pub fn default_uri(&self) -> String { format!("{}/{}", DEFAULT_LOCAL_HOST, self.database) }

    /// Ordered connection candidates, highest priority first.
    ///
    /// An unset primary URI is kept as an empty entry, which the Connection Manager
    /// skips without counting it as an attempt.
    pub fn candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.primary_uri.clone().unwrap_or_default(), self.default_uri()];
        if self.memory_fallback {
            candidates.push(format!("{}://{}", MEMORY_SCHEME, self.database));
        }
        candidates
    }
}

/// Parses the usual spellings of a boolean flag.
fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => {
            Err(ConfigError::InvalidValue {
                key:    key.to_owned(),
                value:  raw.to_owned(),
                reason: "expected true/false".to_owned(),
            })
        },
    }
}

/// Serde helpers representing a `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize as _, Deserializer, Serializer};

    /// Serializes as milliseconds.
    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserializes from milliseconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
