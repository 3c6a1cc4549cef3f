use clap::Args;
use docstore::DocumentStore;
use serde_json::Value;
use tracing::{error, info};

use super::CliError;

/// Arguments for list command.
#[derive(Args, Clone, Default)]
pub struct ListArgs {
    /// Collection name
    #[arg(short, long)]
    pub collection: String,
}

/// List every document of a collection.
///
/// # Arguments
/// * `store` - The store to read from.
/// * `args` - The parsed command-line arguments for list.
///
/// # Returns
/// A JSON array of documents, empty for a collection that was never written.
pub async fn run(store: &DocumentStore, args: ListArgs) -> Result<Value, CliError> {
    match store.read(&args.collection, None).await {
        Ok(outcome) => {
            let value = outcome.into_value();
            info!(
                "Listed {} document(s) from collection '{}'",
                value.as_array().map_or(0, Vec::len),
                args.collection
            );
            Ok(value)
        },
        Err(e) => {
            error!("Failed to list collection '{}': {}", args.collection, e);
            Err(e.into())
        },
    }
}
