//! Retrying fetcher
//!
//! Single point of outbound HTTP access with:
//! - Bounded attempt ceiling with exponential backoff (`base * 2^attempt`)
//! - 429 awareness (backoff and retry)
//! - Fail-fast on permanent client errors
//! - Retry on transport errors, 5xx and undecodable bodies
//! - Byte-order-mark stripping before JSON decoding

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::retry_formatter::{classify_status, classify_transport, RetryContext, RetryErrorType};
use super::transport::Transport;
use super::{decode_json, FetchError, FetchResult, Fetcher};
use crate::config::RetryPolicy;
use crate::metrics::{self, HttpRequestMetrics};

/// Fetcher that retries transient failures according to a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Create a fetcher over the given transport
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Policy in use
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Attempt loop.
    ///
    /// Retries on:
    /// - Transport errors (timeout, connection refused)
    /// - 429 rate limit responses
    /// - 5xx server errors and other non-success statuses
    /// - Bodies that fail to decode as JSON
    ///
    /// Does not retry on:
    /// - 4xx client errors (except 429)
    async fn fetch_with_retry(&self, url: &str) -> FetchResult<Value> {
        let max_attempts = self.policy.max_attempts;
        let mut last_failure: Option<(RetryErrorType, String)> = None;

        for attempt in 0..max_attempts {
            let attempt_no = attempt + 1;
            let request_metrics = HttpRequestMetrics::start(url, attempt_no);
            debug!(url = %url, attempt = attempt_no, max_attempts, "Fetching");

            let failure = match self.transport.get(url).await {
                Err(e) => {
                    request_metrics.record_network_error();
                    (classify_transport(&e), e.to_string())
                }
                Ok(response) => {
                    request_metrics.record_complete(response.status);

                    if response.is_success() {
                        match decode_json(&response.body) {
                            Ok(value) => {
                                if let Some((error_type, _)) = last_failure {
                                    let ctx = RetryContext::new(
                                        attempt_no,
                                        max_attempts,
                                        error_type,
                                        self.policy.backoff(attempt),
                                        url,
                                        "",
                                    );
                                    info!("{}", ctx.format_success());
                                }
                                return Ok(value);
                            }
                            Err(e) => (RetryErrorType::Decode, format!("invalid JSON: {e}")),
                        }
                    } else {
                        let error_type = classify_status(response.status);
                        if !error_type.is_retryable() {
                            warn!(
                                url = %url,
                                status = response.status,
                                "Client error, not retrying"
                            );
                            metrics::record_fetch_failure("client_error");
                            return Err(FetchError::ClientError {
                                url: url.to_string(),
                                status: response.status,
                            });
                        }
                        (error_type, format!("HTTP {}", response.status))
                    }
                }
            };

            let (error_type, message) = failure;
            if attempt_no < max_attempts {
                let backoff = self.policy.backoff(attempt);
                let ctx = RetryContext::new(
                    attempt_no,
                    max_attempts,
                    error_type,
                    backoff,
                    url,
                    message.as_str(),
                );
                warn!(error = %message, "{}", ctx.format_retry());
                metrics::record_retry_backoff(backoff, attempt_no);
                tokio::time::sleep(backoff).await;
            } else {
                let ctx = RetryContext::new(
                    attempt_no,
                    max_attempts,
                    error_type,
                    std::time::Duration::ZERO,
                    url,
                    message.as_str(),
                );
                warn!("{}", ctx.format_failure());
            }
            last_failure = Some((error_type, message));
        }

        // All attempts exhausted
        let (kind, message) = last_failure
            .unwrap_or((RetryErrorType::NetworkGeneric, "no attempt made".to_string()));
        metrics::record_fetch_failure(kind.label());
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            kind,
            message,
        })
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<Value> {
        self.fetch_with_retry(url).await
    }
}
