use clap::Parser;
use docstore::connection::shutdown_signal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    commands::{run_command, Cli, CliError},
    logging::init_tracing,
};

/// Run the docstore CLI application.
///
/// This is the main entry point for the CLI. It parses command-line arguments,
/// initializes tracing, executes the requested command and releases the
/// connection afterwards, also when a termination signal interrupts the command.
///
/// # Returns
/// The JSON value to print on success, or a `CliError` on failure.
pub async fn run() -> Result<Value, CliError> {
    let cli = Cli::parse();

    init_tracing(cli.json, cli.verbose);

    let store = cli.connection.build_store()?;
    let result = tokio::select! {
        result = run_command(&store, cli.command) => result,
        () = shutdown_signal() => {
            warn!("Shutdown signal received, abandoning command");
            Err(CliError::Interrupted)
        },
    };
    store.shutdown().await;
    debug!("Connection released");
    result
}

/// Renders command output for stdout.
pub fn render(value: &Value) -> String { serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()) }

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render_is_pretty_json() {
        assert_eq!(render(&json!({"deleted": true})), "{\n  \"deleted\": true\n}");
        assert_eq!(render(&Value::Null), "null");
    }
}
