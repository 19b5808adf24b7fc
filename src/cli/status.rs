//! Status command: freshness of each dataset file

use clap::Args;
use serde::Serialize;
use std::time::Duration;

use super::CliError;
use crate::config::HarvestConfig;
use crate::snapshot::freshness::now_ms;
use crate::snapshot::{check_all, Dataset, Freshness, SnapshotStore};

/// Output format for the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Status command arguments
#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Freshness report line for one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    /// Dataset
    pub dataset: Dataset,
    /// File path
    pub path: String,
    /// Cache state and age
    #[serde(flatten)]
    pub freshness: Freshness,
}

/// Classify every dataset file under `config.data_dir` as of `now_ms`
pub fn collect_status(config: &HarvestConfig, now_ms: i64) -> Vec<DatasetStatus> {
    let store = SnapshotStore::new(config.data_dir.clone());
    check_all(&store, config.freshness_window, now_ms)
        .into_iter()
        .map(|(dataset, freshness)| DatasetStatus {
            dataset,
            path: store.path_for(dataset).display().to_string(),
            freshness,
        })
        .collect()
}

/// Render an age as `1d 2h 3m`, dropping leading zero units
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    let (days, hours, minutes) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    match (days, hours) {
        (0, 0) if minutes == 0 => format!("{secs}s"),
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h {minutes}m"),
    }
}

impl StatusArgs {
    /// Print the status report
    pub fn execute(&self, config: &HarvestConfig) -> Result<(), CliError> {
        let report = collect_status(config, now_ms());

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Human => {
                println!(
                    "Data directory: {} (window {})",
                    config.data_dir.display(),
                    format_age(config.freshness_window)
                );
                for line in &report {
                    let age = line
                        .freshness
                        .age()
                        .map(|age| format!("age {}", format_age(age)))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<12} {:<8} {:<14} {}",
                        line.dataset.label(),
                        line.freshness.label(),
                        age,
                        line.path
                    );
                }
            }
        }

        Ok(())
    }
}
