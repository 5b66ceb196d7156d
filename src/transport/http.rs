//! The real network, over `reqwest`.

use super::{Method, Request, Response, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Settings for [`HttpTransport`].
///
/// | Option | Default | Description |
/// |--------|---------|-------------|
/// | `timeout_ms` | 30000 | Whole-request timeout |
/// | `default_headers` | none | Sent with every request, before per-request headers. A request header of the same name wins |
///
/// ```
/// use nucleon::transport::TransportConfig;
///
/// let config = TransportConfig {
///     timeout_ms: 5_000,
///     ..Default::default()
/// };
/// assert!(config.default_headers.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_ms: u64,
    pub default_headers: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            default_headers: Vec::new(),
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Wraps an existing client, keeping its own timeout settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            config: TransportConfig::default(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        // `header` appends, so a default the request sets itself is skipped.
        let overridden = |name: &str| {
            request
                .headers
                .iter()
                .any(|(own, _)| own.eq_ignore_ascii_case(name))
        };
        let defaults = self
            .config
            .default_headers
            .iter()
            .filter(|(name, _)| !overridden(name));

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in defaults.chain(&request.headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        debug!(status, len = bytes.len(), "Response received");

        if bytes.is_empty() {
            return Ok(Response::empty(status));
        }
        match serde_json::from_slice(&bytes) {
            Ok(body) => Ok(Response::json(status, body)),
            // Error pages are often HTML; the status alone decides the outcome.
            Err(_) if !(200..300).contains(&status) => Ok(Response::empty(status)),
            Err(e) => {
                warn!(status, error = %e, "Undecodable success body");
                Err(TransportError::Decode(e.to_string()))
            }
        }
    }
}
