// crates/core/src/transport.rs
//! Transport trait for the pull endpoints, plus the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub timeout: Option<Duration>,
    /// Cancelling this token abandons the request with
    /// [`TransportError::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

/// A decoded JSON response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Value,
}

/// Fetches JSON documents for the monitor.
///
/// Implementations include:
/// - `HttpTransport`: reqwest over HTTP(S)
/// - in-memory fakes in tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and decode the body as JSON. Non-2xx responses are errors.
    async fn fetch_json(&self, url: &str, opts: &FetchOptions) -> Result<JsonResponse, TransportError>;

    /// GET `primary`, retrying once against `fallback` when the primary
    /// route could not be resolved.
    async fn fetch_json_with_fallback(
        &self,
        primary: &str,
        fallback: Option<&str>,
        opts: &FetchOptions,
    ) -> Result<JsonResponse, TransportError> {
        match self.fetch_json(primary, opts).await {
            Err(err) if err.warrants_fallback() => match fallback {
                Some(fallback) if fallback != primary => {
                    tracing::debug!(primary, fallback, error = %err, "primary endpoint unresolved, trying fallback");
                    self.fetch_json(fallback, opts).await
                }
                _ => Err(err),
            },
            result => result,
        }
    }
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: None,
        }
    }

    /// Timeout applied when the request options carry none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<JsonResponse, TransportError> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(timeout) = timeout.or(self.default_timeout) {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let body = serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
        Ok(JsonResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_json(&self, url: &str, opts: &FetchOptions) -> Result<JsonResponse, TransportError> {
        match &opts.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TransportError::Cancelled),
                result = self.get(url, opts.timeout) => result,
            },
            None => self.get(url, opts.timeout).await,
        }
    }
}
