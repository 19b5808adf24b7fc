//! Harvest commands: the poll loop and one-shot refresh

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::{CliError, StatusArgs};
use crate::config::{
    HarvestConfig, RetryPolicy, DEFAULT_BACKOFF_BASE_MS, DEFAULT_CONCURRENCY,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATA_DIR, DEFAULT_FETCH_TIMEOUT_SECS,
    DEFAULT_FRESHNESS_WINDOW_SECS, DEFAULT_MAX_ATTEMPTS, MAX_CONCURRENCY,
};
use crate::fetcher::endpoints::Endpoints;
use crate::logging::LogFormat;
use crate::orchestrator::{Orchestrator, TickOutcome};
use crate::shutdown::SharedShutdown;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Transit data harvester CLI
#[derive(Parser, Debug)]
#[command(name = "transit-harvester")]
#[command(about = "Harvest Hong Kong bus and minibus reference data into JSON snapshots", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the dataset files
    #[arg(long, global = true, env = "HARVEST_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Per-attempt request timeout in seconds
    #[arg(long, global = true, env = "HARVEST_FETCH_TIMEOUT_SECS",
          default_value_t = DEFAULT_FETCH_TIMEOUT_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_secs: u64,

    /// Attempts per request before giving up (range: 1-20)
    #[arg(long, global = true, env = "HARVEST_MAX_ATTEMPTS",
          default_value_t = DEFAULT_MAX_ATTEMPTS,
          value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Backoff base in milliseconds; attempt n waits base * 2^n
    #[arg(long, global = true, env = "HARVEST_BACKOFF_MS", default_value_t = DEFAULT_BACKOFF_BASE_MS)]
    pub backoff_ms: u64,

    /// Maximum snapshot age in seconds before a refresh
    #[arg(long, global = true, env = "HARVEST_FRESHNESS_SECS",
          default_value_t = DEFAULT_FRESHNESS_WINDOW_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub freshness_secs: u64,

    /// In-flight requests per fan-out phase (max: 32)
    ///
    /// Upstream APIs rate-limit aggressively; values above 10 mostly buy
    /// more 429 responses.
    #[arg(long, global = true, env = "HARVEST_CONCURRENCY",
          default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Address for the Prometheus metrics endpoint (disabled when unset)
    #[arg(long, global = true, env = "HARVEST_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Log line format
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum,
          ignore_case = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Refresh stale datasets, then re-check every freshness window until interrupted
    Run,

    /// Check once, refresh if any dataset is stale, then exit
    Once {
        /// Refresh even if every dataset is fresh
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Show the freshness of each dataset file
    Status(StatusArgs),
}

impl Cli {
    /// Build the harvest configuration from the parsed options
    pub fn to_config(&self) -> Result<HarvestConfig, CliError> {
        let config = HarvestConfig {
            data_dir: self.data_dir.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms)),
            freshness_window: Duration::from_secs(self.freshness_secs),
            concurrency: self.concurrency,
            endpoints: Endpoints::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Execute the selected command
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.to_config()?;

        match self.command.clone().unwrap_or(Commands::Run) {
            Commands::Status(args) => args.execute(&config),
            Commands::Run => {
                self.start_metrics().await?;
                let orchestrator = Orchestrator::from_config(config, shutdown)?;
                orchestrator.run_forever().await;
                Ok(())
            }
            Commands::Once { force } => {
                self.start_metrics().await?;
                let orchestrator = Orchestrator::from_config(config, shutdown)?;
                match orchestrator.tick(force).await? {
                    TickOutcome::Skipped => info!("All datasets fresh, nothing to do"),
                    TickOutcome::Refreshed(summary) => info!(?summary, "Datasets refreshed"),
                    TickOutcome::Interrupted => info!("Interrupted before persistence, nothing written"),
                }
                Ok(())
            }
        }
    }

    async fn start_metrics(&self) -> Result<(), CliError> {
        let Some(addr) = self.metrics_addr else {
            return Ok(());
        };
        crate::metrics::init_metrics(addr)
            .await
            .map_err(|e| CliError::MetricsError(e.to_string()))
    }
}
