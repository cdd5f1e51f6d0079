use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::Url;

/// Response body as a stream of chunks. `None` from the stream is a clean
/// end of stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// What the connection state machine asks the transport to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: Url,
    /// Sent as `Last-Event-ID` when resuming.
    pub last_event_id: Option<String>,
}

/// An HTTP response with its body still unread.
pub struct Response {
    pub status: u16,
    /// Final URL after any redirects the transport followed.
    pub url: Url,
    pub body: ByteStream,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Issues the HTTP GET for an event stream. Implement this to plug in a
/// different HTTP stack.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream. Non-200 statuses are returned as `Ok`; only
    /// transport faults are errors.
    async fn open(&self, request: &OpenRequest) -> Result<Response, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Client error: {0}")]
    Client(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Client(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
