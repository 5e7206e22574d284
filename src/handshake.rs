//! Upgrade of inbound connections to WebSocket.
//!
//! [`HandshakeOrchestrator`] resolves the service for an upgrade request,
//! hands the service's parameters to the transport, publishes the
//! resulting connection in the [`ConnectionManager`] and starts its
//! `on_open` handler. The first inbound frame is requested exactly once,
//! after `on_open` finishes or immediately when it is unbound.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    config::ListenerConfig,
    connection::WebSocketConnection,
    error::TransportError,
    hooks::run_guarded,
    metrics::{self, HandshakeResult},
    push::OutboundWriter,
    registry::ServiceRegistry,
    service::WebSocketService,
    session::{ConnectionManager, OpenConnectionInfo, SessionError},
    transport::{
        CloseFrame,
        HandshakeParams,
        Handshaker,
        Rejection,
        UpgradeRequest,
        close_code,
    },
};

/// Reason sent when `on_open` fails.
pub const UNEXPECTED_CONDITION: &str = "Unexpected condition";

/// Errors returned by [`HandshakeOrchestrator::upgrade`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// No service is registered for the requested path.
    #[error("no service found to handle the upgrade request for {path}")]
    NoService {
        /// Requested path.
        path: String,
    },
    /// The request exceeded a listener limit.
    #[error("upgrade request rejected with status {status}: {reason}")]
    Rejected {
        /// HTTP status sent to the client.
        status: u16,
        /// Response body.
        reason: String,
    },
    /// The transport failed to complete the upgrade.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport reused the id of a live connection.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Listener-level inputs to every handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// Idle timeout for services that do not set one.
    pub default_idle_timeout: Option<Duration>,
    /// Longest accepted request target.
    pub max_uri_length: Option<usize>,
    /// Largest accepted header block.
    pub max_header_size: Option<usize>,
    /// Value of the `Server` response header.
    pub server_header: String,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            default_idle_timeout: None,
            max_uri_length: None,
            max_header_size: None,
            server_header: format!("wsgate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&ListenerConfig> for HandshakeSettings {
    fn from(config: &ListenerConfig) -> Self {
        let limits = config.request_limits();
        Self {
            default_idle_timeout: config.idle_timeout(),
            max_uri_length: limits.max_uri_length(),
            max_header_size: limits.max_header_size(),
            server_header: config.server_header().to_owned(),
        }
    }
}

/// Pick the first client-requested sub-protocol the service offers.
///
/// ```
/// use wsgate::handshake::negotiate_sub_protocol;
///
/// let offered = ["v1".to_owned(), "v2".to_owned()];
/// let requested = ["v2".to_owned(), "v3".to_owned()];
/// assert_eq!(negotiate_sub_protocol(&offered, &requested), Some("v2"));
/// ```
#[must_use]
pub fn negotiate_sub_protocol<'a>(offered: &[String], requested: &'a [String]) -> Option<&'a str> {
    requested
        .iter()
        .map(|protocol| protocol.trim())
        .find(|protocol| offered.iter().any(|o| o.eq_ignore_ascii_case(protocol)))
}

/// Drives upgrades for one listener.
#[derive(Clone)]
pub struct HandshakeOrchestrator {
    registry: Arc<ServiceRegistry>,
    connections: Arc<ConnectionManager>,
    writer: OutboundWriter,
    tracker: TaskTracker,
    settings: HandshakeSettings,
}

impl HandshakeOrchestrator {
    /// Create an orchestrator over a listener's registry and connections.
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        connections: Arc<ConnectionManager>,
        writer: OutboundWriter,
        tracker: TaskTracker,
        settings: HandshakeSettings,
    ) -> Self {
        Self {
            registry,
            connections,
            writer,
            tracker,
            settings,
        }
    }

    /// Upgrade without a waiting caller; failures are logged.
    pub async fn accept(&self, handshaker: Box<dyn Handshaker>) {
        if let Err(e) = self.upgrade(handshaker).await {
            match e {
                HandshakeError::NoService { .. } | HandshakeError::Rejected { .. } => {
                    info!(error = %e, "upgrade refused");
                }
                _ => error!(error = %e, "unable to complete handshake"),
            }
        }
    }

    /// Upgrade and return the new connection.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::NoService`] when no service matches the
    /// request path, [`HandshakeError::Rejected`] when a request limit is
    /// exceeded and [`HandshakeError::Transport`] when the transport fails.
    /// No connection state exists after an error.
    pub async fn upgrade(
        &self,
        handshaker: Box<dyn Handshaker>,
    ) -> Result<WebSocketConnection, HandshakeError> {
        let selected: OnceLock<Arc<WebSocketService>> = OnceLock::new();
        let refused: OnceLock<HandshakeError> = OnceLock::new();
        let select = |request: &UpgradeRequest| -> Result<HandshakeParams, Rejection> {
            match self.select(request) {
                Ok((service, params)) => {
                    let _ = selected.set(service);
                    Ok(params)
                }
                Err((error, rejection)) => {
                    let _ = refused.set(error);
                    Err(rejection)
                }
            }
        };

        let outcome = match handshaker.handshake(&select).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = refused.into_inner().unwrap_or(HandshakeError::Transport(e));
                metrics::inc_handshakes(match error {
                    HandshakeError::Transport(_) => HandshakeResult::Failed,
                    _ => HandshakeResult::Rejected,
                });
                return Err(error);
            }
        };
        let Some(service) = selected.into_inner() else {
            metrics::inc_handshakes(HandshakeResult::Failed);
            let frame = CloseFrame::new(close_code::UNEXPECTED_CONDITION, UNEXPECTED_CONDITION);
            let _ = outcome.connection.terminate(frame).await;
            return Err(HandshakeError::Transport(TransportError::Handshake(
                "transport completed the upgrade without resolving a service".to_owned(),
            )));
        };

        let transport = Arc::clone(&outcome.connection);
        let info = Arc::new(OpenConnectionInfo::new(
            service,
            outcome.connection,
            outcome.negotiated_sub_protocol,
            outcome.secure,
        ));
        if let Err(e) = self.connections.add(Arc::clone(&info)) {
            metrics::inc_handshakes(HandshakeResult::Failed);
            let _ = transport
                .terminate(CloseFrame::new(close_code::UNEXPECTED_CONDITION, UNEXPECTED_CONDITION))
                .await;
            return Err(e.into());
        }
        transport.registered();
        metrics::inc_handshakes(HandshakeResult::Accepted);
        debug!(
            connection_id = %info.id(),
            path = %info.service().base_path(),
            sub_protocol = ?info.negotiated_sub_protocol(),
            secure = info.is_secure(),
            "connection opened"
        );

        let connection = WebSocketConnection::new(info, self.writer.clone());
        self.start(connection.clone());
        Ok(connection)
    }

    fn select(
        &self,
        request: &UpgradeRequest,
    ) -> Result<(Arc<WebSocketService>, HandshakeParams), (HandshakeError, Rejection)> {
        if let Some(max) = self.settings.max_uri_length
            && request.path.len() > max
        {
            return Err(refuse(414, "URI Too Long"));
        }
        if let Some(max) = self.settings.max_header_size
            && request.header_bytes() > max
        {
            return Err(refuse(431, "Request Header Fields Too Large"));
        }
        let Some(service) = self.registry.resolve(&request.path) else {
            let path = request.path.clone();
            let rejection = Rejection::new(404, format!("no service found for {path}"));
            return Err((HandshakeError::NoService { path }, rejection));
        };
        let params = HandshakeParams {
            sub_protocols: service.sub_protocols().to_vec(),
            idle_timeout: service.idle_timeout().or(self.settings.default_idle_timeout),
            headers: vec![("Server".to_owned(), self.settings.server_header.clone())],
            max_frame_size: service.max_frame_size(),
        };
        Ok((service, params))
    }

    fn start(&self, connection: WebSocketConnection) {
        let Some(on_open) = connection.service().handlers().on_open.clone() else {
            connection.ready();
            return;
        };
        self.tracker.spawn(async move {
            let handler_conn = connection.clone();
            let result = run_guarded(move || on_open(handler_conn)).await;
            connection.ready();
            if let Err(e) = result {
                metrics::inc_handler_errors();
                error!(connection_id = %connection.id(), error = %e, "onOpen handler failed");
                let frame = CloseFrame::new(close_code::UNEXPECTED_CONDITION, UNEXPECTED_CONDITION);
                if let Err(e) = connection.info().transport().terminate(frame).await {
                    warn!(connection_id = %connection.id(), error = %e, "failed to terminate connection");
                }
            }
        });
    }
}

fn refuse(status: u16, reason: &str) -> (HandshakeError, Rejection) {
    (
        HandshakeError::Rejected {
            status,
            reason: reason.to_owned(),
        },
        Rejection::new(status, reason),
    )
}

impl std::fmt::Debug for HandshakeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
