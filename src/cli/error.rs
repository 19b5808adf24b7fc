//! CLI error types and conversions

use crate::config::ConfigError;
use crate::orchestrator::HarvestError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Harvest error
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(String),

    /// Output could not be rendered
    #[error("output error: {0}")]
    OutputError(#[from] serde_json::Error),
}
