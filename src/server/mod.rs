//! Tokio-based WebSocket listener.
//!
//! `WebSocketServer` binds the TCP listener described by a
//! [`ListenerConfig`], upgrades each accepted stream through the
//! tungstenite transport and feeds the resulting events into a
//! [`WebSocketEndpoint`]. Worker tasks accept connections in parallel and
//! stop when the shutdown signal fires.

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{config::ListenerConfig, endpoint::WebSocketEndpoint};

/// WebSocket listener for a single [`ListenerConfig`].
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// or [`Bound`]. New servers start `Unbound` and must call
/// [`WebSocketServer::bind`] or [`WebSocketServer::bind_listener`] before
/// running.
pub struct WebSocketServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) config: Arc<ListenerConfig>,
    pub(crate) endpoint: Arc<WebSocketEndpoint>,
    pub(crate) acceptor: Option<Arc<dyn StreamAcceptor>>,
    pub(crate) workers: usize,
    pub(crate) backoff_config: BackoffConfig,
    /// Time allowed for handler tasks to finish after shutdown.
    pub(crate) shutdown_timeout: Duration,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` transmits only one notification, so a new sender
    /// is needed each time a server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod acceptor;
mod binding;
mod builder;
mod connection;
pub mod error;
mod runtime;
mod transport;

pub use acceptor::{AsyncStream, BoxedStream, PlainAcceptor, StreamAcceptor};
pub use error::ServerError;
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;
pub use transport::{TungsteniteConnection, TungsteniteHandshaker};

#[cfg(test)]
pub(crate) mod test_util;
