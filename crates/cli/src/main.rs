use std::process::ExitCode;

use tracing::error;

/// CLI module for command-line interface logic.
mod cli;
/// Commands module for subcommand implementations.
mod commands;
/// Logging module for setting up tracing.
mod logging;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(output) => {
            #[allow(clippy::print_stdout, reason = "CLI output")]
            {
                println!("{}", cli::render(&output));
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("{}", e);
            #[allow(clippy::print_stderr, reason = "errors must be visible without -v")]
            {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        },
    }
}
