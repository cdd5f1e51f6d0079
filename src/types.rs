use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event type consumers should assume when a frame carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One decoded message unit from a `text/event-stream`.
///
/// Built fresh for every frame, handed to the consumer once, never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSentEvent {
    /// Value of the last `event:` field in the frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Concatenated `data:` values, each terminated by `\n`.
    #[serde(default)]
    pub data: String,
    /// Value of the `id:` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
    /// Reconnect delay suggested by the server (milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl ServerSentEvent {
    /// The event type, falling back to `"message"`.
    pub fn event_name(&self) -> &str {
        self.event_type.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry.map(Duration::from_millis)
    }

    /// True when the frame carried no recognized field at all
    /// (e.g. a frame made only of comments).
    pub fn is_empty(&self) -> bool {
        self.event_type.is_none()
            && self.data.is_empty()
            && self.last_event_id.is_none()
            && self.retry.is_none()
    }

    /// Deserialize the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Readiness of a connection, mirroring the browser `EventSource.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}
