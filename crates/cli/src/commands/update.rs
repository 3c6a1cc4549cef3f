use clap::Args;
use docstore::DocumentStore;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{parse_data, CliError};

/// Arguments for update command.
#[derive(Args, Clone, Default)]
pub struct UpdateArgs {
    /// Collection name
    #[arg(short, long)]
    pub collection: String,
    /// Document identifier (24 hexadecimal characters)
    #[arg(short, long)]
    pub id:         String,
    /// Fields to merge into the document, as a JSON object
    #[arg(short, long)]
    pub data:       String,
}

/// Merge fields into an existing document.
///
/// Only the given fields are written; the rest of the document is kept.
///
/// # Arguments
/// * `store` - The store holding the document.
/// * `args` - The parsed command-line arguments for update.
///
/// # Returns
/// `{"updated": bool}`, `true` only if a stored value actually changed.
pub async fn run(store: &DocumentStore, args: UpdateArgs) -> Result<Value, CliError> {
    let patch = parse_data(&args.data)?;
    match store.update(&args.collection, &args.id, patch).await {
        Ok(updated) => {
            info!(
                "Update of document '{}' in collection '{}' changed data: {}",
                args.id, args.collection, updated
            );
            Ok(json!({ "updated": updated }))
        },
        Err(e) => {
            error!(
                "Failed to update document '{}' in collection '{}': {}",
                args.id, args.collection, e
            );
            Err(e.into())
        },
    }
}
