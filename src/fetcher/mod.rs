//! Outbound HTTP access
//!
//! Every upstream request in the crate goes through a [`Fetcher`]. The
//! production implementation is [`retrying::RetryingFetcher`], which layers
//! bounded exponential backoff over a [`transport::Transport`].

use async_trait::async_trait;
use serde_json::Value;

pub mod endpoints;
pub mod retry_formatter;
pub mod retrying;
pub mod transport;

use retry_formatter::RetryErrorType;

/// Fetch failures.
///
/// A failure means "no data for this resource in this run"; callers degrade
/// to an empty result and carry on.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Permanent client error (4xx other than 429); never retried
    #[error("client error {status} for {url}")]
    ClientError {
        /// Requested URL
        url: String,
        /// HTTP status
        status: u16,
    },

    /// Every attempt failed with a retryable error
    #[error("gave up on {url} after {attempts} attempts ({}): {message}", kind.description())]
    Exhausted {
        /// Requested URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Classification of the last error
        kind: RetryErrorType,
        /// Last error message
        message: String,
    },
}

impl FetchError {
    /// Short label for metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            FetchError::ClientError { .. } => "client_error",
            FetchError::Exhausted { kind, .. } => kind.label(),
        }
    }

    /// URL that failed
    pub fn url(&self) -> &str {
        match self {
            FetchError::ClientError { url, .. } | FetchError::Exhausted { url, .. } => url,
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Single-method fetch interface used by every pipeline stage
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and decode its body as JSON
    async fn fetch(&self, url: &str) -> FetchResult<Value>;
}

/// Fetcher handle cloned into fan-out jobs
pub type SharedFetcher = std::sync::Arc<dyn Fetcher>;

/// Strip a UTF-8 byte-order mark and parse the body as JSON
pub fn decode_json(body: &[u8]) -> Result<Value, serde_json::Error> {
    const BOM: &[u8] = b"\xEF\xBB\xBF";
    let body = body.strip_prefix(BOM).unwrap_or(body);
    serde_json::from_slice(body)
}
