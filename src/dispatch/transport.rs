//! Transport to the ingest service.
//!
//! The pipeline only needs "send this batch, tell me if it worked". The
//! reqwest-based [`HttpTransport`] is available with the `http` feature.

use crate::signal::Signal;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network/HTTP error
    #[error("Transport network error: {0}")]
    Network(String),
    /// Server returned an error response
    #[error("Transport server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// JSON serialization error
    #[error("Transport serialization error: {0}")]
    Serialization(String),
    /// The configured URL cannot be used
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),
}

/// Sends batches of signals to the collection endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a batch as one unit. Any error means the whole batch failed.
    async fn send(&self, batch: &[Signal]) -> Result<(), TransportError>;

    /// URL signals are posted to.
    fn service_url(&self) -> String;
}

/// Thread-safe shared transport.
pub type SharedTransport = Arc<dyn Transport>;

/// Resolve the ingest URL for a base URL and optional namespace.
///
/// `https://host` becomes `https://host/v2/`, or
/// `https://host/v2/namespace/<ns>/` when a namespace is set.
pub fn service_url(base_url: &str, namespace: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{base}/v2/namespace/{ns}/"),
        None => format!("{base}/v2/"),
    }
}

/// Transport posting JSON batches over HTTP.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Create a transport for the given base URL and optional namespace.
    pub fn new(base_url: &str, namespace: Option<&str>) -> Result<Self, TransportError> {
        let raw = service_url(base_url, namespace);
        let url = reqwest::Url::parse(&raw)
            .map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("signal-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client, url })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[Signal]) -> Result<(), TransportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let body =
            serde_json::to_vec(batch).map_err(|e| TransportError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Server {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(count = batch.len(), url = %self.url, "Delivered signal batch");
        Ok(())
    }

    fn service_url(&self) -> String {
        self.url.to_string()
    }
}
