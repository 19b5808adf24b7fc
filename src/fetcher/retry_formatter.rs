//! Retry classification and log message formatting for the retrying fetcher.
//!
//! Keeps the wording of retry, recovery and give-up messages in one place so
//! every upstream API is reported the same way.

use std::time::Duration;

use super::transport::TransportError;

/// Classification of fetch errors for retry decisions and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Client errors (4xx, except 429)
    ClientError(u16),
    /// Body arrived but is not valid JSON
    Decode,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                400 => "invalid request",
                403 => "forbidden",
                404 => "resource not found",
                _ => "client error",
            },
            Self::Decode => "malformed response body",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "timeout",
            Self::NetworkOffline => "offline",
            Self::RateLimit => "rate_limit",
            Self::ServerError(_) => "server_error",
            Self::ClientError(_) => "client_error",
            Self::Decode => "decode",
            Self::NetworkGeneric => "network",
        }
    }

    /// Suggested remediation shown when a resource is given up on.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Upstream is slow; consider raising --fetch-timeout-secs",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower --concurrency or raise --backoff-ms",
            Self::ServerError(_) => "The data provider may be degraded; the next run will retry",
            Self::ClientError(_) => "The resource does not exist upstream; check the endpoint template",
            Self::Decode => "Upstream returned non-JSON content; the next run will retry",
            Self::NetworkGeneric => "Check network connectivity",
        }
    }

    /// Whether another attempt can help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryErrorType::ClientError(_))
    }
}

/// Classify an HTTP status that is not a success
pub fn classify_status(status: u16) -> RetryErrorType {
    match status {
        429 => RetryErrorType::RateLimit,
        400..=499 => RetryErrorType::ClientError(status),
        500..=599 => RetryErrorType::ServerError(status),
        _ => RetryErrorType::NetworkGeneric,
    }
}

/// Classify a transport failure
pub fn classify_transport(err: &TransportError) -> RetryErrorType {
    match err {
        TransportError::Timeout(_) => RetryErrorType::NetworkTimeout,
        TransportError::Connect(_) => RetryErrorType::NetworkOffline,
        TransportError::Other(_) => RetryErrorType::NetworkGeneric,
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Attempt ceiling
    pub max_attempts: u32,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// URL being fetched
    pub url: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used by the retry loop.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        url: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            url: url.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds ({})",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.url
        )
    }

    /// Format recovery message when a later attempt works.
    pub fn format_success(&self) -> String {
        format!(
            "Attempt {}/{} succeeded after earlier failures ({})",
            self.attempt, self.max_attempts, self.url
        )
    }

    /// Format the give-up summary.
    pub fn format_failure(&self) -> String {
        [
            format!("[FAILED] {} after {} attempts", self.url, self.attempt),
            format!("  Last error: {}", self.error_message),
            format!("  Suggestion: {}", self.error_type.suggestion()),
        ]
        .join("\n")
    }
}
