//! Per-listener engine state.
//!
//! A [`WebSocketEndpoint`] bundles the service registry, connection
//! registry, handshake orchestrator, frame dispatcher and outbound writer
//! of one listener. Nothing here is process-global: two listeners never
//! share connection state.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::{
    config::ListenerConfig,
    connection::WebSocketConnection,
    dispatch::FrameDispatcher,
    handshake::{HandshakeError, HandshakeOrchestrator, HandshakeSettings},
    push::OutboundWriter,
    registry::{RegistryError, ServiceRegistry},
    service::WebSocketService,
    session::ConnectionManager,
    transport::{EventSink, Handshaker, TransportEvent},
};

/// Engine for one WebSocket listener.
pub struct WebSocketEndpoint {
    registry: Arc<ServiceRegistry>,
    connections: Arc<ConnectionManager>,
    orchestrator: HandshakeOrchestrator,
    dispatcher: Arc<FrameDispatcher>,
    writer: OutboundWriter,
    tracker: TaskTracker,
}

impl WebSocketEndpoint {
    /// Create an endpoint with the given handshake settings.
    #[must_use]
    pub fn new(settings: HandshakeSettings) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let connections = Arc::new(ConnectionManager::new());
        let tracker = TaskTracker::new();
        let writer = OutboundWriter::new(Arc::clone(&connections), tracker.clone());
        let orchestrator = HandshakeOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&connections),
            writer.clone(),
            tracker.clone(),
            settings,
        );
        let dispatcher = Arc::new(FrameDispatcher::new(
            Arc::clone(&connections),
            writer.clone(),
            tracker.clone(),
        ));
        Self {
            registry,
            connections,
            orchestrator,
            dispatcher,
            writer,
            tracker,
        }
    }

    /// Create an endpoint for a validated listener configuration.
    #[must_use]
    pub fn for_listener(config: &ListenerConfig) -> Self { Self::new(HandshakeSettings::from(config)) }

    /// Register a service on this listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePath`] if the path is taken.
    pub fn attach(&self, service: WebSocketService) -> Result<Arc<WebSocketService>, RegistryError> {
        self.registry.register(service)
    }

    /// Remove the service registered at `path`.
    ///
    /// Connections already upgraded for it stay open.
    pub fn detach(&self, path: &str) -> Option<Arc<WebSocketService>> { self.registry.deregister(path) }

    /// Upgrade a connection, logging any failure.
    pub async fn accept(&self, handshaker: Box<dyn Handshaker>) { self.orchestrator.accept(handshaker).await; }

    /// Upgrade a connection and return its handle.
    ///
    /// # Errors
    ///
    /// See [`HandshakeOrchestrator::upgrade`].
    pub async fn upgrade(
        &self,
        handshaker: Box<dyn Handshaker>,
    ) -> Result<WebSocketConnection, HandshakeError> {
        self.orchestrator.upgrade(handshaker).await
    }

    /// Route a transport event.
    pub fn dispatch(&self, event: TransportEvent) { self.dispatcher.dispatch(event); }

    /// Sink transports deliver their events to.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> { self.dispatcher.clone() }

    /// Writer for pushing frames by connection id.
    #[must_use]
    pub fn writer(&self) -> &OutboundWriter { &self.writer }

    /// Open connections of this listener.
    #[must_use]
    pub fn connections(&self) -> &ConnectionManager { &self.connections }

    /// Services of this listener.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry { &self.registry }

    /// Tracker of handler and write tasks.
    #[must_use]
    pub fn tracker(&self) -> &TaskTracker { &self.tracker }
}

impl Default for WebSocketEndpoint {
    fn default() -> Self { Self::new(HandshakeSettings::default()) }
}

impl std::fmt::Debug for WebSocketEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketEndpoint")
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
