//! Observability metrics for the harvester
//!
//! Tracks upstream request outcomes, 429s, retry backoff, fetch failures,
//! snapshot writes and pipeline runs.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; recording without an installed
//!   recorder is a no-op, so library code records unconditionally
//! - Optional Prometheus exporter bound by the binary (`--metrics-addr`)

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Correlation ID source for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize the Prometheus exporter
///
/// Idempotent: later calls are ignored.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of upstream HTTP requests"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit responses"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Upstream request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "fetch_failures_total",
        Unit::Count,
        "Resources given up on, by failure kind"
    );
    describe_counter!(
        "snapshot_writes_total",
        Unit::Count,
        "Dataset snapshots persisted"
    );
    describe_counter!(
        "pipeline_runs_total",
        Unit::Count,
        "Pipeline runs by outcome"
    );
    describe_histogram!(
        "pipeline_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of a pipeline run"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if the exporter is installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Host part of a URL, used as a low-cardinality label
pub fn endpoint_label(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Timing and outcome of one HTTP attempt
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording an attempt against `url`
    pub fn start(url: &str, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        let endpoint = endpoint_label(url);

        debug!(
            correlation_id = %correlation_id,
            url = %url,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "http_429_errors_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit response (429)"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a transport error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Correlation ID of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);
    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a resource given up on
pub fn record_fetch_failure(kind: &'static str) {
    counter!("fetch_failures_total", "kind" => kind).increment(1);
}

/// Record a persisted dataset
pub fn record_snapshot_written(dataset: &'static str, records: usize) {
    counter!("snapshot_writes_total", "dataset" => dataset).increment(1);
    debug!(dataset, records, "Snapshot write recorded");
}

/// Pipeline run tracker
pub struct PipelineMetrics {
    start_time: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::start()
    }
}

impl PipelineMetrics {
    /// Start tracking a run
    pub fn start() -> Self {
        info!("Pipeline run started");
        Self {
            start_time: Instant::now(),
        }
    }

    /// Record a run that persisted all datasets
    pub fn record_success(&self) {
        let duration = self.start_time.elapsed();
        counter!("pipeline_runs_total", "outcome" => "success").increment(1);
        histogram!("pipeline_duration_seconds").record(duration.as_secs_f64());
        info!(duration_secs = duration.as_secs(), "Pipeline run completed");
    }

    /// Record a run abandoned by shutdown
    pub fn record_interrupted(&self) {
        counter!("pipeline_runs_total", "outcome" => "interrupted").increment(1);
        warn!(
            duration_secs = self.start_time.elapsed().as_secs(),
            "Pipeline run interrupted before persistence"
        );
    }

    /// Record a run whose persistence failed
    pub fn record_failure(&self, error: &str) {
        counter!("pipeline_runs_total", "outcome" => "failure").increment(1);
        error!(
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Pipeline run failed"
        );
    }
}
