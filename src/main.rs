//! Main entry point for the transit-harvester CLI

use clap::Parser;
use tracing::error;
use transit_harvester::cli::Cli;
use transit_harvester::logging::init_tracing;
use transit_harvester::shutdown::ShutdownCoordinator;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_format) {
        eprintln!("Failed to install tracing subscriber: {e}");
    }

    // Ctrl+C abandons the current run; a write already in progress completes
    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - stopping after any in-progress write...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = cli.execute(shutdown).await.map_err(|e| anyhow::anyhow!(e));

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
