#![doc(html_root_url = "https://docs.rs/wsgate/latest")]
//! Public API for the `wsgate` library.
//!
//! This crate provides the protocol layer of a WebSocket server: per-path
//! service registration, handshake orchestration with sub-protocol
//! negotiation, pull-based dispatch of inbound frames to asynchronous
//! handlers and an outbound push API. A listener runtime built on
//! `tokio-tungstenite` is included in [`server`].

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod hooks;
pub mod metrics;
pub mod panic;
pub mod prelude;
pub mod push;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_util;

pub use connection::WebSocketConnection;
pub use endpoint::WebSocketEndpoint;
pub use error::{ConnectionError, HandlerError, TransportError};
pub use hooks::{EventKind, HandlerResult, ServiceHandlers};
pub use push::{OutboundFrame, PushCompletion, PushError};
pub use service::{WebSocketService, WebSocketServiceBuilder};
pub use session::ConnectionId;
pub use transport::CloseFrame;
