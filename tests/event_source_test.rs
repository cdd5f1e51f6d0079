//! Tests for the reconnecting EventSource loop using MockTransport.

use futures::StreamExt;
use reqwest::Url;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use yosse::transport::mock::MockResponse;
use yosse::transport::MockTransport;
use yosse::*;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn fast_retry(max: usize) -> RetryConfig {
    RetryConfig {
        max_retries: Some(max),
        initial_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 1,
    }
}

async fn collect(source: &mut EventSource) -> Vec<ServerSentEvent> {
    let mut events = Vec::new();
    source
        .run(|e| events.push(e), CancellationToken::new())
        .await;
    events
}

#[tokio::test]
async fn test_reconnects_and_resumes_with_last_event_id() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["id: 1\ndata: a\n\n"]),
        MockResponse::chunks(["id: 2\ndata: b\n\n"]),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/events"), transport.clone())
        .with_retry_config(fast_retry(1));

    let events = collect(&mut source).await;

    let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
    assert_eq!(data, vec!["a\n", "b\n"]);
    assert_eq!(source.last_event_id(), Some("2"));

    let requests = transport.requests();
    // Two streams, then one failed attempt exhausts the budget.
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].last_event_id, None);
    assert_eq!(requests[1].last_event_id.as_deref(), Some("1"));
    assert_eq!(requests[2].last_event_id.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_initial_last_event_id_is_sent() {
    let transport = Arc::new(MockTransport::new(vec![MockResponse::status(503)]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone())
        .with_retry_config(RetryConfig::none())
        .with_last_event_id("resume-here");

    collect(&mut source).await;

    assert_eq!(
        transport.requests()[0].last_event_id.as_deref(),
        Some("resume-here")
    );
}

#[tokio::test]
async fn test_gives_up_after_max_consecutive_failures() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::status(500),
        MockResponse::status(502),
        MockResponse::status(503),
        MockResponse::chunks(["data: never\n\n"]),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone())
        .with_retry_config(fast_retry(2));

    let events = collect(&mut source).await;

    assert!(events.is_empty());
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_successful_connection_resets_attempts() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::status(500),
        MockResponse::chunks(["data: 1\n\n"]),
        MockResponse::status(500),
        MockResponse::chunks(["data: 2\n\n"]),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone())
        .with_retry_config(fast_retry(1));

    let events = collect(&mut source).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "1\n");
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_retry_hint_sets_reconnect_delay() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["retry: 5000\ndata: first\n\n"]),
        MockResponse::chunks(["data: second\n\n"]),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone())
        .with_retry_config(RetryConfig {
            max_retries: Some(1),
            initial_delay_ms: 1,
            backoff_multiplier: 1.0,
            max_delay_ms: 1,
        });

    let start = tokio::time::Instant::now();
    let events = collect(&mut source).await;

    assert_eq!(events.len(), 2);
    // Two reconnects, each waiting the 5s the server asked for.
    assert!(start.elapsed() >= Duration::from_millis(10_000));
}

#[tokio::test]
async fn test_empty_events_suppressed_by_default() {
    let body = [":keepalive\n\n\ndata: x\n\n"];
    let transport = Arc::new(MockTransport::chunks(body));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport)
        .with_retry_config(RetryConfig::none());

    let events = collect(&mut source).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "x\n");

    let transport = Arc::new(MockTransport::chunks(body));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport)
        .with_retry_config(RetryConfig::none())
        .with_empty_events(true);

    let events = collect(&mut source).await;
    assert_eq!(events.len(), 3);
    assert!(events[0].is_empty());
    assert!(events[1].is_empty());
}

#[tokio::test]
async fn test_state_changes_reported() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = states.clone();
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["data: a\n\n"]),
        MockResponse::status(500),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport)
        .with_retry_config(fast_retry(1))
        .on_state_change(move |s| seen.lock().unwrap().push(s));

    collect(&mut source).await;

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ReadyState::Connecting,
            ReadyState::Open,
            ReadyState::Closed,
            ReadyState::Connecting,
            ReadyState::Closed,
        ]
    );
}

#[tokio::test]
async fn test_cancel_stops_stalled_stream() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["data: a\n\n"]).then_hang()
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let mut events = Vec::new();
    let run = source.run(
        |e| {
            events.push(e);
            trigger.cancel();
        },
        cancel,
    );
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel should stop the loop");

    assert_eq!(events.len(), 1);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_into_stream_yields_events_then_ends() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["data: 1\n\ndata: ", "2\n\n"]),
        MockResponse::chunks(["event: last\ndata: 3\n\n"]),
    ]));
    let source = EventSource::with_transport(url("http://localhost/"), transport)
        .with_retry_config(fast_retry(1));

    let events: Vec<ServerSentEvent> = source
        .into_stream(CancellationToken::new())
        .collect()
        .await;

    let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
    assert_eq!(data, vec!["1\n", "2\n", "3\n"]);
    assert_eq!(events[2].event_name(), "last");
}

#[tokio::test]
async fn test_dropping_stream_stops_loop() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["data: a\n\n"]).then_hang()
    ]));
    let source = EventSource::with_transport(url("http://localhost/"), transport.clone());

    let mut stream = source.into_stream(CancellationToken::new());
    let first = stream.next().await.expect("one event");
    assert_eq!(first.data, "a\n");
    drop(stream);

    // The background task releases its transport handle once it stops.
    tokio::time::timeout(Duration::from_secs(5), async {
        while Arc::strong_count(&transport) > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop should stop after the stream is dropped");
}

#[tokio::test]
async fn test_empty_id_resets_resume_point() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::chunks(["id: 1\ndata: a\n\nid:\ndata: b\n\n"]),
        MockResponse::status(500),
    ]));
    let mut source = EventSource::with_transport(url("http://localhost/"), transport.clone())
        .with_retry_config(fast_retry(1))
        .with_last_event_id("0");

    let events = collect(&mut source).await;

    assert_eq!(events.len(), 2);
    assert_eq!(source.last_event_id(), None);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].last_event_id.as_deref(), Some("0"));
    assert_eq!(requests[1].last_event_id, None);
}
