//! HTTP transport used underneath the retrying fetcher
//!
//! The [`Transport`] trait is the seam between retry policy and the wire: the
//! production [`HttpTransport`] wraps a shared `reqwest::Client`, tests plug in
//! scripted transports.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Status and raw body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Undecoded body bytes
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Build a response from a status and body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Request or body read timed out
    #[error("timeout: {0}")]
    Timeout(String),
    /// Connection could not be established
    #[error("connect error: {0}")]
    Connect(String),
    /// Anything else reqwest reports
    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// One GET, no retries
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a GET request and return status plus body
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// Build the HTTP client shared by every request of a harvester process.
///
/// Both timeouts are mandatory so that no request can hang a run.
pub fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .user_agent(concat!("transit-harvester/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
}

impl HttpTransport {
    /// Create a transport with its own client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::with_client(Arc::new(build_http_client(
            connect_timeout,
            request_timeout,
        )?)))
    }

    /// Reuse an existing client (Arc for cheap cloning)
    pub fn with_client(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}
