//! Connection state machine: Connecting → Connected → Disconnected.
//!
//! Each state runs one step and returns the next state. Steps never fail;
//! every fault is logged and degrades to [`Disconnected`]. The driving loop
//! in [`crate::event_source`] decides whether and when to reconnect.

use crate::parser::EventParser;
use crate::transport::{ByteStream, OpenRequest, Transport, TransportError};
use crate::types::{ReadyState, ServerSentEvent};
use futures::StreamExt;
use reqwest::Url;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Exactly one of the three connection states.
#[derive(Debug)]
pub enum ConnectionState {
    Connecting(Connecting),
    Connected(Connected),
    Disconnected(Disconnected),
}

impl ConnectionState {
    pub fn ready_state(&self) -> ReadyState {
        match self {
            Self::Connecting(_) => ReadyState::Connecting,
            Self::Connected(_) => ReadyState::Open,
            Self::Disconnected(_) => ReadyState::Closed,
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            Self::Connecting(state) => &state.url,
            Self::Connected(state) => &state.url,
            Self::Disconnected(state) => &state.url,
        }
    }

    pub fn last_event_id(&self) -> Option<&str> {
        match self {
            Self::Connecting(state) => state.last_event_id.as_deref(),
            Self::Connected(state) => state.last_event_id.as_deref(),
            Self::Disconnected(state) => state.last_event_id.as_deref(),
        }
    }

    /// Run one step. `Disconnected` is inert and returns itself.
    pub async fn step<F>(
        self,
        transport: &dyn Transport,
        on_event: &mut F,
        cancel: &CancellationToken,
    ) -> ConnectionState
    where
        F: FnMut(ServerSentEvent) + Send,
    {
        match self {
            Self::Connecting(state) => state.run(transport, cancel).await,
            Self::Connected(state) => state.run(on_event, cancel).await,
            Self::Disconnected(state) => Self::Disconnected(state),
        }
    }
}

// ---------------------------------------------------------------------------
// Connecting
// ---------------------------------------------------------------------------

/// About to issue the GET request.
#[derive(Debug, Clone)]
pub struct Connecting {
    url: Url,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl Connecting {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            last_event_id: None,
            retry: None,
        }
    }

    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let url =
            Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(url))
    }

    /// Resume after the given event id.
    pub fn with_last_event_id(mut self, id: Option<String>) -> Self {
        self.last_event_id = id;
        self
    }

    /// Carry a server-suggested reconnect delay forward.
    pub fn with_retry(mut self, retry: Option<Duration>) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Issue the request. 200 → Connected; anything else, a transport
    /// fault or cancellation → Disconnected with the original URL.
    pub async fn run(
        self,
        transport: &dyn Transport,
        cancel: &CancellationToken,
    ) -> ConnectionState {
        let request = OpenRequest {
            url: self.url.clone(),
            last_event_id: self.last_event_id.clone(),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = transport.open(&request) => result,
        };

        match result {
            Ok(response) if response.status == 200 => {
                debug!("Connected to {}", response.url);
                ConnectionState::Connected(Connected {
                    url: response.url,
                    body: response.body,
                    parser: EventParser::new(),
                    last_event_id: self.last_event_id,
                    retry: self.retry,
                })
            }
            Ok(response) => {
                info!(
                    "Failed to connect to {}: HTTP status {}",
                    self.url, response.status
                );
                self.into_disconnected()
            }
            Err(e) => {
                info!("Failed to connect to {}: {}", self.url, e);
                self.into_disconnected()
            }
        }
    }

    fn into_disconnected(self) -> ConnectionState {
        ConnectionState::Disconnected(Disconnected {
            url: self.url,
            last_event_id: self.last_event_id,
            retry: self.retry,
        })
    }
}

// ---------------------------------------------------------------------------
// Connected
// ---------------------------------------------------------------------------

/// Owns the open response stream and the parser for it. Dropping this
/// closes the stream.
pub struct Connected {
    /// Response URL, after redirects.
    url: Url,
    body: ByteStream,
    parser: EventParser,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("url", &self.url.as_str())
            .field("parser", &self.parser)
            .field("last_event_id", &self.last_event_id)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Connected {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Read one chunk and deliver every event it completes.
    ///
    /// Data keeps the connection; end of stream, a read fault or
    /// cancellation yields Disconnected with the response URL.
    pub async fn run<F>(mut self, on_event: &mut F, cancel: &CancellationToken) -> ConnectionState
    where
        F: FnMut(ServerSentEvent) + Send,
    {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Read from {} cancelled", self.url);
                return self.into_disconnected();
            }
            chunk = self.body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let last_event_id = &mut self.last_event_id;
                let retry = &mut self.retry;
                let delivered = self.parser.feed(&bytes, |event| {
                    if let Some(id) = &event.last_event_id {
                        // An empty id resets the resume point.
                        *last_event_id = (!id.is_empty()).then(|| id.clone());
                    }
                    if let Some(delay) = event.retry_delay() {
                        *retry = Some(delay);
                    }
                    on_event(event);
                });
                trace!("Read {} bytes, {} events", bytes.len(), delivered);
                ConnectionState::Connected(self)
            }
            None => {
                debug!("No bytes read. End of stream from {}", self.url);
                self.into_disconnected()
            }
            Some(Err(e)) => {
                warn!("Read from {} failed: {}", self.url, e);
                self.into_disconnected()
            }
        }
    }

    fn into_disconnected(self) -> ConnectionState {
        // The body stream and any partial frame are dropped here.
        ConnectionState::Disconnected(Disconnected {
            url: self.url,
            last_event_id: self.last_event_id,
            retry: self.retry,
        })
    }
}

// ---------------------------------------------------------------------------
// Disconnected
// ---------------------------------------------------------------------------

/// End of one connection attempt. Carries what the next attempt needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnected {
    /// URL to reconnect to: the requested URL after a failed connect, the
    /// response URL after a dropped stream.
    pub url: Url,
    pub last_event_id: Option<String>,
    /// Reconnect delay suggested by the server.
    pub retry: Option<Duration>,
}

impl Disconnected {
    pub fn reconnect(self) -> Connecting {
        Connecting::new(self.url)
            .with_last_event_id(self.last_event_id)
            .with_retry(self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockResponse;
    use crate::transport::MockTransport;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_connecting_parse_rejects_relative_url() {
        assert!(matches!(
            Connecting::parse("/events"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(Connecting::parse("http://localhost/events").is_ok());
    }

    #[test]
    fn test_reconnect_carries_state() {
        let disconnected = Disconnected {
            url: url("http://localhost/a"),
            last_event_id: Some("42".into()),
            retry: Some(Duration::from_millis(500)),
        };
        let connecting = disconnected.reconnect();
        assert_eq!(connecting.url().as_str(), "http://localhost/a");
        assert_eq!(connecting.last_event_id(), Some("42"));
        assert_eq!(connecting.retry, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_ready_state() {
        let state = ConnectionState::Connecting(Connecting::new(url("http://localhost/")));
        assert_eq!(state.ready_state(), ReadyState::Connecting);
    }

    #[tokio::test]
    async fn test_connected_tracks_last_event_id_and_retry() {
        let transport = MockTransport::new(vec![MockResponse::chunks([
            "id: 1\ndata: a\n\nretry: 250\ndata: b\n\n",
        ])]);
        let cancel = CancellationToken::new();
        let mut events = Vec::new();
        let mut on_event = |e: ServerSentEvent| events.push(e);

        let mut state = ConnectionState::Connecting(Connecting::new(url("http://localhost/")));
        loop {
            state = state.step(&transport, &mut on_event, &cancel).await;
            if let ConnectionState::Disconnected(d) = &state {
                assert_eq!(d.last_event_id.as_deref(), Some("1"));
                assert_eq!(d.retry, Some(Duration::from_millis(250)));
                break;
            }
        }
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_step_is_inert() {
        let transport = MockTransport::new(vec![]);
        let cancel = CancellationToken::new();
        let mut events = Vec::new();
        let mut on_event = |e: ServerSentEvent| events.push(e);
        let state = ConnectionState::Disconnected(Disconnected {
            url: url("http://localhost/"),
            last_event_id: None,
            retry: None,
        });
        let next = state.step(&transport, &mut on_event, &cancel).await;
        assert!(matches!(next, ConnectionState::Disconnected(_)));
        assert!(transport.requests().is_empty());
        assert!(events.is_empty());
    }
}
