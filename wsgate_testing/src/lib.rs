//! In-memory transport doubles for exercising a
//! [`WebSocketEndpoint`](wsgate::WebSocketEndpoint) without sockets.
//!
//! [`MockHandshaker`] answers the engine's upgrade selector the way a real
//! transport would and hands back a [`MockConnection`] that records every
//! outbound frame and read request.
//!
//! ```rust
//! use wsgate::{WebSocketEndpoint, WebSocketService};
//! use wsgate_testing::MockHandshaker;
//!
//! # async fn example() {
//! let endpoint = WebSocketEndpoint::default();
//! endpoint.attach(WebSocketService::builder("chat").build()).unwrap();
//! let (handshaker, conn) = MockHandshaker::new(1, "/chat");
//! endpoint.upgrade(Box::new(handshaker)).await.unwrap();
//! assert!(conn.is_open());
//! # }
//! ```

pub mod connection;
pub mod handshaker;
pub mod macros;
pub mod metrics;
pub mod wait;

pub use connection::{MockConnection, Outbound};
pub use handshaker::{MockHandshaker, RecordedParams};
pub use metrics::{DebugSnapshot, counter_value, debugging_recorder, snapshot};
pub use wait::{eventually, within};

/// Result type used by test helpers and integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
