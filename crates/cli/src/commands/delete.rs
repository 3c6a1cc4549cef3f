use clap::Args;
use docstore::DocumentStore;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::CliError;

/// Arguments for delete command.
#[derive(Args, Clone, Default)]
pub struct DeleteArgs {
    /// Collection name
    #[arg(short, long)]
    pub collection: String,
    /// Document identifier (24 hexadecimal characters)
    #[arg(short, long)]
    pub id:         String,
}

/// Delete a document from a collection.
///
/// # Arguments
/// * `store` - The store holding the document.
/// * `args` - The parsed command-line arguments for delete.
///
/// # Returns
/// `{"deleted": bool}`, `false` when no such document existed.
pub async fn run(store: &DocumentStore, args: DeleteArgs) -> Result<Value, CliError> {
    match store.delete(&args.collection, &args.id).await {
        Ok(deleted) => {
            if deleted {
                info!(
                    "Document '{}' deleted from collection '{}'",
                    args.id, args.collection
                );
            }
            else {
                warn!(
                    "Document '{}' not found in collection '{}'",
                    args.id, args.collection
                );
            }
            Ok(json!({ "deleted": deleted }))
        },
        Err(e) => {
            error!(
                "Failed to delete document '{}' from collection '{}': {}",
                args.id, args.collection, e
            );
            Err(e.into())
        },
    }
}
