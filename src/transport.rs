//! Contract between the protocol core and a WebSocket transport.
//!
//! The core never touches sockets or frame encoding. A transport performs
//! the HTTP upgrade through a [`Handshaker`], hands back a
//! [`TransportConnection`] for outbound frames and flow control, and reports
//! inbound activity as [`TransportEvent`] values through an [`EventSink`].
//!
//! Reads are pull-based: after the handshake the transport delivers nothing
//! until [`TransportConnection::read_next_frame`] is called, and each call
//! releases at most one data or control frame event.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::TransportError, session::ConnectionId};

/// Standard close status codes used by the engine.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away, used on listener shutdown.
    pub const GOING_AWAY: u16 = 1001;
    /// No status code was present in the close frame.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// Message too big to process.
    pub const TOO_BIG: u16 = 1009;
    /// Server hit an unexpected condition.
    pub const UNEXPECTED_CONDITION: u16 = 1011;
}

/// Status code and reason of a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code.
    pub code: u16,
    /// Human readable reason, possibly empty.
    pub reason: String,
}

impl CloseFrame {
    /// Build a close frame.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Upgrade request as seen by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target, including any query string.
    pub path: String,
    /// Sub-protocols listed by the client, in preference order.
    pub requested_sub_protocols: Vec<String>,
    /// Request headers as name/value pairs.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Create a request for `path` with no headers.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add the sub-protocols the client asks for.
    #[must_use]
    pub fn with_sub_protocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.requested_sub_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up the first header with `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Total bytes of header names and values.
    #[must_use]
    pub fn header_bytes(&self) -> usize {
        self.headers
            .iter()
            .map(|(name, value)| name.len() + value.len())
            .sum()
    }
}

/// Parameters the engine hands to the transport for a resolved upgrade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Sub-protocols the service is willing to speak.
    pub sub_protocols: Vec<String>,
    /// Idle period after which an idle event is raised, if any.
    pub idle_timeout: Option<Duration>,
    /// Extra response headers.
    pub headers: Vec<(String, String)>,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

/// Refusal of an upgrade request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status code to respond with.
    pub status: u16,
    /// Response body.
    pub reason: String,
}

impl Rejection {
    /// Create a rejection with the given status and body.
    #[must_use]
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Result of a successful upgrade.
pub struct HandshakeOutcome {
    /// Handle to the upgraded connection.
    pub connection: std::sync::Arc<dyn TransportConnection>,
    /// Sub-protocol written in the upgrade response, if any.
    pub negotiated_sub_protocol: Option<String>,
    /// Whether the connection runs over TLS.
    pub secure: bool,
}

impl std::fmt::Debug for HandshakeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeOutcome")
            .field("connection", &self.connection.id())
            .field("negotiated_sub_protocol", &self.negotiated_sub_protocol)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Callback used by a [`Handshaker`] to resolve an upgrade request.
pub type UpgradeSelector<'a> =
    &'a (dyn Fn(&UpgradeRequest) -> Result<HandshakeParams, Rejection> + Send + Sync);

/// Transport primitive performing a single HTTP upgrade.
#[async_trait]
pub trait Handshaker: Send {
    /// Read the upgrade request, ask `select` how to answer it and complete
    /// or refuse the upgrade accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] when `select` refused the
    /// request, or another [`TransportError`] if the upgrade failed.
    async fn handshake(
        self: Box<Self>,
        select: UpgradeSelector<'_>,
    ) -> Result<HandshakeOutcome, TransportError>;
}

/// Operations the engine performs on an upgraded connection.
///
/// Outbound methods complete once the frame has been handed to the socket.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Identifier unique among the transport's live connections.
    fn id(&self) -> ConnectionId;

    /// Whether the socket is still usable.
    fn is_open(&self) -> bool;

    /// Send a text frame; `is_final` clear marks a fragment.
    async fn push_text(&self, text: String, is_final: bool) -> Result<(), TransportError>;

    /// Send a binary frame; `is_final` clear marks a fragment.
    async fn push_binary(&self, data: Bytes, is_final: bool) -> Result<(), TransportError>;

    /// Send a ping control frame.
    async fn push_ping(&self, data: Bytes) -> Result<(), TransportError>;

    /// Send a pong control frame.
    async fn push_pong(&self, data: Bytes) -> Result<(), TransportError>;

    /// Start the closing handshake.
    async fn close(&self, frame: CloseFrame) -> Result<(), TransportError>;

    /// The engine has registered the connection.
    ///
    /// Called once, right after registration. Transports must not deliver
    /// events for the connection before this.
    fn registered(&self) {}

    /// Allow the transport to deliver the next inbound frame.
    fn read_next_frame(&self);

    /// Send a close frame and drop the connection without waiting for the
    /// peer.
    async fn terminate(&self, frame: CloseFrame) -> Result<(), TransportError>;
}

/// Inbound activity reported by a transport.
#[derive(Debug)]
#[non_exhaustive]
pub enum TransportEvent {
    /// Text frame received.
    Text {
        /// Connection the frame arrived on.
        id: ConnectionId,
        /// Frame payload.
        data: String,
        /// Whether this frame completes the message.
        is_final: bool,
    },
    /// Binary frame received.
    Binary {
        /// Connection the frame arrived on.
        id: ConnectionId,
        /// Frame payload.
        data: Bytes,
        /// Whether this frame completes the message.
        is_final: bool,
    },
    /// Ping received.
    Ping {
        /// Connection the frame arrived on.
        id: ConnectionId,
        /// Application data.
        data: Bytes,
    },
    /// Pong received.
    Pong {
        /// Connection the frame arrived on.
        id: ConnectionId,
        /// Application data.
        data: Bytes,
    },
    /// Peer closed the connection or it dropped.
    Close {
        /// Connection that closed.
        id: ConnectionId,
        /// Close status and reason.
        frame: CloseFrame,
    },
    /// The transport failed.
    Error {
        /// Connection that failed.
        id: ConnectionId,
        /// Failure cause.
        error: TransportError,
    },
    /// No traffic for the configured idle period.
    IdleTimeout {
        /// Idle connection.
        id: ConnectionId,
    },
}

impl TransportEvent {
    /// Connection the event belongs to.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Text { id, .. }
            | Self::Binary { id, .. }
            | Self::Ping { id, .. }
            | Self::Pong { id, .. }
            | Self::Close { id, .. }
            | Self::Error { id, .. }
            | Self::IdleTimeout { id } => *id,
        }
    }
}

/// Receiver of [`TransportEvent`]s.
pub trait EventSink: Send + Sync {
    /// Hand an event to the engine. Must not block.
    fn deliver(&self, event: TransportEvent);
}
