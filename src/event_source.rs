//! `EventSource`: drives the connection state machine until cancelled.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//! use yosse::EventSource;
//!
//! # async fn example() -> Result<(), yosse::transport::TransportError> {
//! let source = EventSource::new("http://localhost:8080/events")?;
//! let mut events = source.into_stream(CancellationToken::new());
//! while let Some(event) = events.next().await {
//!     println!("{}: {}", event.event_name(), event.data);
//! }
//! # Ok(())
//! # }
//! ```

use crate::retry::{log_give_up, log_reconnect, RetryConfig};
use crate::state::{Connecting, ConnectionState};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::types::{ReadyState, ServerSentEvent};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Called whenever the ready state changes.
pub type StateChangeFn = Arc<dyn Fn(ReadyState) + Send + Sync>;

/// Events produced by [`EventSource::into_stream`].
pub type EventStream = UnboundedReceiverStream<ServerSentEvent>;

/// A reconnecting SSE client for one URL.
pub struct EventSource {
    url: Url,
    transport: Arc<dyn Transport>,
    pub retry_config: RetryConfig,
    /// Deliver events whose frame had no recognized field.
    pub empty_events: bool,
    last_event_id: Option<String>,
    on_state_change: Option<StateChangeFn>,
}

impl EventSource {
    /// Client for `url` over the default HTTP transport.
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url =
            Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(url, Arc::new(transport)))
    }

    pub fn with_transport(url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            url,
            transport,
            retry_config: RetryConfig::default(),
            empty_events: false,
            last_event_id: None,
            on_state_change: None,
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Resume a previous session: the first request carries `Last-Event-ID`.
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    pub fn with_empty_events(mut self, deliver: bool) -> Self {
        self.empty_events = deliver;
        self
    }

    pub fn on_state_change(mut self, f: impl Fn(ReadyState) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Id of the most recent event that carried one.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Connect and deliver events until `cancel` fires or the retry budget
    /// is exhausted.
    pub async fn run<F>(&mut self, mut on_event: F, cancel: CancellationToken)
    where
        F: FnMut(ServerSentEvent) + Send,
    {
        let empty_events = self.empty_events;
        let mut deliver = |event: ServerSentEvent| {
            if event.is_empty() && !empty_events {
                trace!("Skipping empty event");
                return;
            }
            on_event(event);
        };

        let transport = Arc::clone(&self.transport);
        let mut state = ConnectionState::Connecting(
            Connecting::new(self.url.clone()).with_last_event_id(self.last_event_id.clone()),
        );
        let mut reported: Option<ReadyState> = None;
        let mut attempt: usize = 0;

        loop {
            self.report(&mut reported, state.ready_state());
            if cancel.is_cancelled() {
                debug!("Event source for {} cancelled", self.url);
                break;
            }

            state = match state {
                ConnectionState::Disconnected(disconnected) => {
                    attempt += 1;
                    if !self.retry_config.allows(attempt) {
                        log_give_up(attempt, &disconnected.url);
                        break;
                    }

                    let delay = self.retry_config.next_delay(attempt, disconnected.retry);
                    log_reconnect(
                        attempt,
                        self.retry_config.max_retries,
                        &delay,
                        &disconnected.url,
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    ConnectionState::Connecting(disconnected.reconnect())
                }
                state => {
                    let next = state.step(transport.as_ref(), &mut deliver, &cancel).await;
                    if matches!(next, ConnectionState::Connected(_)) {
                        attempt = 0;
                    }
                    if self.last_event_id.as_deref() != next.last_event_id() {
                        self.last_event_id = next.last_event_id().map(str::to_string);
                    }
                    next
                }
            };
        }

        self.report(&mut reported, ReadyState::Closed);
    }

    /// Run the loop on a background task and return its events as a stream.
    /// Dropping the stream stops the loop and closes the connection.
    pub fn into_stream(mut self, cancel: CancellationToken) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = self.run(move |event| { let _ = tx.send(event); }, cancel) => {}
                _ = sender.closed() => debug!("Event stream dropped, stopping"),
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    fn report(&self, reported: &mut Option<ReadyState>, state: ReadyState) {
        if *reported == Some(state) {
            return;
        }
        *reported = Some(state);
        debug!("Ready state for {}: {:?}", self.url, state);
        if let Some(f) = &self.on_state_change {
            f(state);
        }
    }
}
