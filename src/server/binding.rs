//! Listener binding for [`WebSocketServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use super::{Bound, ServerError, ServerState, Unbound, WebSocketServer};

impl<S> WebSocketServer<S>
where
    S: ServerState,
{
    fn bind_to_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<WebSocketServer<Bound>, ServerError> {
        if self.config.is_secure() && self.acceptor.as_ref().is_none_or(|a| !a.is_secure()) {
            return Err(ServerError::TlsAcceptorMissing(self.config.id()));
        }
        let WebSocketServer {
            config,
            endpoint,
            acceptor,
            workers,
            backoff_config,
            shutdown_timeout,
            ready_tx,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let tokio_listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(WebSocketServer {
            config,
            endpoint,
            acceptor,
            workers,
            backoff_config,
            shutdown_timeout,
            ready_tx,
            state: Bound {
                listener: Arc::new(tokio_listener),
            },
        })
    }
}

impl WebSocketServer<Unbound> {
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Bind to the host and port of the listener configuration.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TlsAcceptorMissing`] for a secure listener
    /// without a TLS acceptor, or [`ServerError::Bind`] if binding fails.
    pub fn bind(self) -> Result<WebSocketServer<Bound>, ServerError> {
        let addr = (self.config.host(), self.config.port());
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Bind to an existing `StdTcpListener`, ignoring the configured address.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<WebSocketServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl WebSocketServer<Bound> {
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}
