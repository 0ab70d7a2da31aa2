use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use rensv_relayd::{Cli, run, wait_for_shutdown_signal};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    rensv_observability::init(cli.log_format);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    match run(cli, shutdown).await {
        Ok(summary) => {
            tracing::info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "exiting"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal startup error");
            ExitCode::FAILURE
        }
    }
}
