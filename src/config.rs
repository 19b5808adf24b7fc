//! Harvest configuration constants and runtime settings

use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::endpoints::Endpoints;

/// Per-attempt request timeout in seconds.
/// The upstream APIs answer within a second or two; bulk stop and fare feeds
/// are several MB and need the headroom.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Total attempts per URL, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base backoff in milliseconds; attempt `n` (0-based) waits `base * 2^n`
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound for a single backoff sleep
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Snapshot freshness window (24 hours)
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Default in-flight fetches per fan-out phase
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Hard cap on fan-out concurrency, to stay polite with the public APIs
pub const MAX_CONCURRENCY: usize = 32;

/// Default snapshot directory
pub const DEFAULT_DATA_DIR: &str = "static/data";

/// Calculate exponential backoff delay for a 0-based attempt index
pub fn calculate_backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Retry behaviour of the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling (>= 1)
    pub max_attempts: u32,
    /// Backoff base
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Create a policy; a zero attempt ceiling is raised to one
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Sleep before the attempt following `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(self.backoff_base, attempt)
    }

    /// Sum of all sleeps when every attempt fails
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value is outside its accepted range
    #[error("invalid {name}: {reason}")]
    OutOfRange {
        /// Option name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Everything a harvest run needs to know
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Directory holding the four dataset files
    pub data_dir: PathBuf,
    /// Per-attempt request timeout
    pub fetch_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Retry policy
    pub retry: RetryPolicy,
    /// Maximum snapshot age
    pub freshness_window: Duration,
    /// In-flight fetches per fan-out phase
    pub concurrency: usize,
    /// Upstream URL templates
    pub endpoints: Endpoints,
}

impl HarvestConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::OutOfRange {
                name: "concurrency",
                reason: format!(
                    "{} is outside 1..={MAX_CONCURRENCY}",
                    self.concurrency
                ),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "fetch timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.freshness_window.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "freshness window",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            freshness_window: Duration::from_secs(DEFAULT_FRESHNESS_WINDOW_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            endpoints: Endpoints::default(),
        }
    }
}
