//! reqwest-backed transport.

use super::traits::*;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL};
use std::time::Duration;
use tracing::{debug, warn};

const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Settings for [`HttpTransport`].
///
/// Defaults: 10s connect timeout, no extra headers.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Opens event streams with a plain HTTP GET. Proxies are never used;
/// redirects are followed.
pub struct HttpTransport {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpConfig::default())
    }

    pub fn with_config(config: HttpConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Client(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            headers: config.headers,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &OpenRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .get(request.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // An empty id means "no resume point": send no header at all.
        if let Some(id) = request.last_event_id.as_deref().filter(|id| !id.is_empty()) {
            match HeaderValue::from_str(id) {
                Ok(value) => builder = builder.header(LAST_EVENT_ID, value),
                Err(_) => warn!("Not sending Last-Event-ID {:?}: invalid header value", id),
            }
        }

        debug!(
            "GET {} (last_event_id={:?})",
            request.url, request.last_event_id
        );
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        let url = resp.url().clone();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(Response { status, url, body })
    }
}
