//! Construction and tuning of [`WebSocketServer`].

use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use super::{BackoffConfig, ServerError, ServerState, StreamAcceptor, Unbound, WebSocketServer};
use crate::{config::ListenerConfig, endpoint::WebSocketEndpoint, service::WebSocketService};

/// Grace period for handler tasks once shutdown begins.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl WebSocketServer<Unbound> {
    /// Create a server for `config`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). Call [`bind`](Self::bind) before
    /// running the server.
    #[must_use]
    pub fn new(config: ListenerConfig) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let endpoint = Arc::new(WebSocketEndpoint::for_listener(&config));
        Self {
            config: Arc::new(config),
            endpoint,
            acceptor: None,
            workers,
            backoff_config: BackoffConfig::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S> WebSocketServer<S>
where
    S: ServerState,
{
    /// Register a service on the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Registry`] if the service's path is taken.
    pub fn service(self, service: WebSocketService) -> Result<Self, ServerError> {
        self.endpoint.attach(service)?;
        Ok(self)
    }

    /// Supply the acceptor wrapping accepted streams, typically a TLS
    /// implementation.
    #[must_use]
    pub fn with_acceptor<A>(mut self, acceptor: A) -> Self
    where
        A: StreamAcceptor,
    {
        self.acceptor = Some(Arc::new(acceptor));
        self
    }

    /// Set the number of worker tasks to spawn for the server.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Configure the accept-loop back-off.
    #[must_use]
    pub fn accept_backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config.normalized();
        self
    }

    /// Time handler tasks get to finish once shutdown starts.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Returns the configured number of worker tasks for the server.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Listener configuration.
    #[must_use]
    pub fn config(&self) -> &ListenerConfig { &self.config }

    /// Engine shared by all connections of the listener.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<WebSocketEndpoint> { &self.endpoint }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::server::test_util::listener_config;

    #[rstest]
    fn new_server_defaults(listener_config: ListenerConfig) {
        let server = WebSocketServer::new(listener_config);
        assert!(server.worker_count() >= 1);
        assert!(server.local_addr().is_none());
        assert!(server.acceptor.is_none());
    }

    #[rstest]
    #[case(0, 1)]
    #[case(4, 4)]
    fn worker_count_is_at_least_one(
        listener_config: ListenerConfig,
        #[case] requested: usize,
        #[case] expected: usize,
    ) {
        let server = WebSocketServer::new(listener_config).workers(requested);
        assert_eq!(server.worker_count(), expected);
    }

    #[rstest]
    fn duplicate_service_paths_fail(listener_config: ListenerConfig) {
        let server = WebSocketServer::new(listener_config)
            .service(WebSocketService::builder("echo").build())
            .expect("first service");
        let err = server
            .service(WebSocketService::builder("again").path("/echo").build())
            .err()
            .expect("duplicate path");
        assert!(matches!(err, ServerError::Registry(_)));
    }

    #[rstest]
    fn backoff_is_normalized(listener_config: ListenerConfig) {
        let server = WebSocketServer::new(listener_config).accept_backoff(BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5),
        });
        assert_eq!(server.backoff_config.initial_delay, Duration::from_millis(5));
        assert_eq!(server.backoff_config.max_delay, Duration::from_millis(50));
    }
}
