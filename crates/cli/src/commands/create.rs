use clap::Args;
use docstore::DocumentStore;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{parse_data, CliError};

/// Arguments for create command.
#[derive(Args, Clone, Default)]
pub struct CreateArgs {
    /// Collection name
    #[arg(short, long)]
    pub collection: String,
    /// Document data as a JSON object
    #[arg(short, long)]
    pub data:       String,
}

/// Insert a new document into a collection.
///
/// # Arguments
/// * `store` - The store to insert into.
/// * `args` - The parsed command-line arguments for create.
///
/// # Returns
/// `{"_id": "<hex>"}` for the new document.
pub async fn run(store: &DocumentStore, args: CreateArgs) -> Result<Value, CliError> {
    let document = parse_data(&args.data)?;
    match store.create(&args.collection, document).await {
        Ok(id) => {
            info!("Document {} created in collection '{}'", id, args.collection);
            Ok(json!({ "_id": id.to_hex() }))
        },
        Err(e) => {
            error!(
                "Failed to create document in collection '{}': {}",
                args.collection, e
            );
            Err(e.into())
        },
    }
}
