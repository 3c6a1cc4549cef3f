use clap::Args;
use docstore::DocumentStore;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::CliError;

/// Arguments for status command.
#[derive(Args, Clone, Default)]
pub struct StatusArgs {}

/// Connect and report the connection.
///
/// An unreachable store is reported, not treated as a failure.
///
/// # Arguments
/// * `store` - The store whose connection is inspected.
/// * `_args` - The parsed command-line arguments for status.
///
/// # Returns
/// The state, endpoint, collections and number of connection attempts.
pub async fn run(store: &DocumentStore, _args: StatusArgs) -> Result<Value, CliError> {
    let manager = store.manager();
    let state = manager.connect_default().await;
    let collections = if manager.is_connected() {
        info!("Connected to {}", manager.endpoint().unwrap_or_default());
        store.collection_names().await?
    }
    else {
        warn!("No candidate endpoint is reachable");
        Vec::new()
    };
    Ok(json!({
        "state": state.to_string(),
        "endpoint": manager.endpoint(),
        "collections": collections,
        "attempts": manager.attempts(),
    }))
}
