use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use docstore::{Config, ConfigError, ConnectionManager, DocumentStore, PolicyTable, StoreError, UniqueField};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Environment file read when `--env-file` is not given.
const DEFAULT_ENV_FILE: &str = ".env";

/// Command handlers for the docstore CLI.
///
/// Each submodule implements one subcommand. Handlers return the JSON value to print
/// so that output formatting stays in one place.
/// Create command module.
mod create;
/// Delete command module.
mod delete;
/// Get command module.
mod get;
/// List command module.
mod list;
/// Status command module.
mod status;
/// Update command module.
mod update;

/// Failure of a CLI invocation.
#[derive(Error, Debug)]
pub enum CliError {
    /// The store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The environment holds an invalid setting.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The environment file exists but cannot be read or parsed.
    #[error("Cannot load environment file {path}: {source}")]
    EnvFile {
        path:   String,
        source: dotenvy::Error,
    },
    /// A `--data` argument is not valid JSON.
    #[error("Invalid JSON in --data: {source}")]
    InvalidJson {
        source: serde_json::Error,
    },
    /// The command was interrupted by a termination signal.
    #[error("Interrupted by shutdown signal")]
    Interrupted,
}

/// The CLI for the docstore document access layer.
///
/// Connection settings come from the environment (`MONGO_URI`, `DOCSTORE_DATABASE`,
/// `DOCSTORE_MEMORY_FALLBACK`, `DOCSTORE_CONNECT_TIMEOUT_MS`), optionally completed
/// by a `.env` file, and can be overridden by the global flags below.
#[derive(Parser)]
#[command(name = "docstore", version, about)]
pub struct Cli {
    #[command(subcommand)]
    /// The subcommand to execute.
    pub command: Commands,

    #[command(flatten)]
    /// Where and how to connect.
    pub connection: ConnectionArgs,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (can be used multiple times: -v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Connection settings shared by every subcommand.
#[derive(Args, Clone, Debug, Default)]
pub struct ConnectionArgs {
    /// Primary connection URI, tried before the local default (overrides MONGO_URI)
    #[arg(long, global = true)]
    pub uri:             Option<String>,
    /// Database name (overrides DOCSTORE_DATABASE)
    #[arg(long, global = true)]
    pub database:        Option<String>,
    /// Fall back to an in-memory store when no server is reachable
    #[arg(long, global = true)]
    pub memory_fallback: bool,
    /// Keep a field unique within a collection, as COLLECTION:FIELD (repeatable)
    #[arg(long = "unique", value_name = "COLLECTION:FIELD", value_parser = parse_unique, global = true)]
    pub unique:          Vec<(String, String)>,
    /// Environment file supplying unset variables [default: .env]
    #[arg(long, value_name = "PATH", global = true)]
    pub env_file:        Option<PathBuf>,
}

impl ConnectionArgs {
    /// Merges the flags over the configuration read from the environment.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(ref uri) = self.uri {
            config.primary_uri = Some(uri.clone());
        }
        if let Some(ref database) = self.database {
            config.database = database.clone();
        }
        config.memory_fallback |= self.memory_fallback;
        config
    }

    /// Builds the policy table from the `--unique` flags.
    pub fn policies(&self) -> PolicyTable {
        self.unique
            .iter()
            .fold(PolicyTable::new(), |table, (collection, field)| {
                table.with(collection.clone(), UniqueField::new(field.clone()))
            })
    }

    /// Path of the environment file to read.
    pub fn env_file(&self) -> &Path {
        self.env_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_ENV_FILE))
    }

    /// Reads the configuration from `process` lookups, completed by the environment
    /// file and overridden by these flags.
    ///
    /// Variables set in the process win over the file, as with `dotenv`.
    ///
    /// # Errors
    ///
    /// Returns `CliError::EnvFile` when the file exists but is malformed and
    /// `CliError::Config` when a variable is malformed.
    pub fn load_config<F>(&self, process: F) -> Result<Config, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = read_env_file(self.env_file())?;
        let config = Config::from_lookup(|key| process(key).or_else(|| file.get(key).cloned()))?;
        Ok(self.apply(config))
    }

    /// Builds a store from the environment overridden by these flags.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionArgs::load_config`].
    pub fn build_store(&self) -> Result<DocumentStore, CliError> {
        let config = self.load_config(|key| std::env::var(key).ok())?;
        debug!("Using database {}", config.database);
        let manager = Arc::new(ConnectionManager::from_config(&config));
        Ok(DocumentStore::new(manager).with_policies(self.policies()))
    }
}

/// Reads the variables of an environment file. A missing file yields none.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, CliError> {
    let env_error = |source: dotenvy::Error| {
        CliError::EnvFile {
            path: path.display().to_string(),
            source,
        }
    };
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => {
            debug!("No environment file at {}", path.display());
            return Ok(HashMap::new());
        },
        Err(e) => {
            warn!("Failed to open environment file {}: {}", path.display(), e);
            return Err(env_error(e));
        },
    };
    let vars = entries
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(env_error)?;
    debug!("Loaded {} variable(s) from {}", vars.len(), path.display());
    Ok(vars)
}

/// Parses a `COLLECTION:FIELD` pair.
fn parse_unique(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((collection, field)) if !collection.is_empty() && !field.is_empty() => {
            Ok((collection.to_owned(), field.to_owned()))
        },
        _ => Err(format!("expected COLLECTION:FIELD, got '{}'", s)),
    }
}

/// Parses the JSON given to `--data`.
pub fn parse_data(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|source| {
        CliError::InvalidJson {
            source,
        }
    })
}

/// Enumeration of all available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Insert a new document and print its identifier.
    ///
    /// The document must be a JSON object without an `_id` field.
    Create(create::CreateArgs),
    /// Print one document, or `null` when it does not exist.
    Get(get::GetArgs),
    /// Print every document of a collection as a JSON array.
    List(list::ListArgs),
    /// Merge fields into an existing document and print whether anything changed.
    Update(update::UpdateArgs),
    /// Delete a document and print whether it existed.
    Delete(delete::DeleteArgs),
    /// Connect and print the connection state, endpoint and collections.
    Status(status::StatusArgs),
}

/// Execute the specified CLI command against `store`.
///
/// # Arguments
/// * `store` - The store to operate on; connects lazily.
/// * `command` - The parsed subcommand.
///
/// # Returns
/// The JSON value to print on success.
pub async fn run_command(store: &DocumentStore, command: Commands) -> Result<Value, CliError> {
    match command {
        Commands::Create(args) => create::run(store, args).await,
        Commands::Get(args) => get::run(store, args).await,
        Commands::List(args) => list::run(store, args).await,
        Commands::Update(args) => update::run(store, args).await,
        Commands::Delete(args) => delete::run(store, args).await,
        Commands::Status(args) => status::run(store, args).await,
    }
}

/// Store over a fresh directory for command tests.
#[cfg(test)]
pub fn test_store(dir: &tempfile::TempDir) -> DocumentStore {
    let uri = format!("file://{}", dir.path().join("store").display());
    DocumentStore::new(Arc::new(ConnectionManager::with_default_connector(vec![uri])))
}
