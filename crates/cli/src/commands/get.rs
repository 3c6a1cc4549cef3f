use clap::Args;
use docstore::{DocumentStore, ReadOutcome};
use serde_json::Value;
use tracing::{error, info, warn};

use super::CliError;

/// Arguments for get command.
#[derive(Args, Clone, Default)]
pub struct GetArgs {
    /// Collection name
    #[arg(short, long)]
    pub collection: String,
    /// Document identifier (24 hexadecimal characters)
    #[arg(short, long)]
    pub id:         String,
}

/// Retrieve a document from a collection.
///
/// A missing document, or an identifier that cannot exist, is not an error: the
/// command succeeds and yields `null`.
///
/// # Arguments
/// * `store` - The store to read from.
/// * `args` - The parsed command-line arguments for get.
///
/// # Returns
/// The document including `_id`, or `null`.
pub async fn run(store: &DocumentStore, args: GetArgs) -> Result<Value, CliError> {
    match store.read(&args.collection, Some(&args.id)).await {
        Ok(ReadOutcome::NotFound) => {
            warn!("Document '{}' not found in collection '{}'", args.id, args.collection);
            Ok(Value::Null)
        },
        Ok(outcome) => {
            info!("Document '{}' retrieved successfully", args.id);
            Ok(outcome.into_value())
        },
        Err(e) => {
            error!(
                "Failed to get document '{}' from collection '{}': {}",
                args.id, args.collection, e
            );
            Err(e.into())
        },
    }
}
