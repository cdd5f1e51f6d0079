pub mod http;
pub mod mock;
pub mod traits;

pub use http::{HttpConfig, HttpTransport};
pub use mock::MockTransport;
pub use traits::*;
