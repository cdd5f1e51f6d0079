//! Tail an event stream and print every event.
//!
//! Run with: cargo run --example tail -- http://localhost:8080/events

use tokio_util::sync::CancellationToken;
use yosse::*;

#[tokio::main]
async fn main() {
    let url = std::env::args()
        .nth(1)
        .expect("Usage: tail <url>");

    let mut source = EventSource::new(&url)
        .expect("Invalid URL")
        .on_state_change(|state| eprintln!("--- {:?} ---", state));

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stop.cancel();
    });

    source
        .run(
            |event| {
                if let Some(id) = &event.last_event_id {
                    println!("[{}] id={}", event.event_name(), id);
                } else {
                    println!("[{}]", event.event_name());
                }
                print!("{}", event.data);
            },
            cancel,
        )
        .await;

    if let Some(id) = source.last_event_id() {
        eprintln!("Last event id: {}", id);
    }
}
