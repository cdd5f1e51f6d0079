pub mod event_source;
pub mod parser;
pub mod retry;
pub mod state;
pub mod transport;
pub mod types;

pub use event_source::{EventSource, EventStream};
pub use parser::{process_event, EventParser};
pub use retry::RetryConfig;
pub use state::{Connected, Connecting, ConnectionState, Disconnected};
pub use types::*;
