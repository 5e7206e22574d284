//! Handle passed to service handlers.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    push::{OutboundFrame, OutboundWriter, PushCompletion},
    service::WebSocketService,
    session::{ConnectionId, OpenConnectionInfo},
};

/// Cheap, cloneable handle to an open WebSocket connection.
///
/// Handlers receive one with every event. Outbound operations return a
/// [`PushCompletion`] that resolves once the transport has written, or
/// failed to write, the frame.
#[derive(Clone)]
pub struct WebSocketConnection {
    info: Arc<OpenConnectionInfo>,
    writer: OutboundWriter,
}

impl WebSocketConnection {
    pub(crate) fn new(info: Arc<OpenConnectionInfo>, writer: OutboundWriter) -> Self {
        Self { info, writer }
    }

    /// Transport-assigned identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.info.id() }

    /// Sub-protocol agreed during the handshake.
    #[must_use]
    pub fn negotiated_sub_protocol(&self) -> Option<&str> { self.info.negotiated_sub_protocol() }

    /// Whether the connection runs over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool { self.info.is_secure() }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool { self.info.is_open() }

    /// Service the connection was upgraded for.
    #[must_use]
    pub fn service(&self) -> &Arc<WebSocketService> { self.info.service() }

    /// Start reading inbound frames now instead of after `on_open` returns.
    ///
    /// Only the first call on a connection has any effect.
    pub fn ready(&self) {
        if self.info.mark_ready() {
            tracing::trace!(connection_id = %self.id(), "first read requested");
            self.info.transport().read_next_frame();
        }
    }

    /// Send a complete text message.
    pub fn push_text(&self, text: impl Into<String>) -> PushCompletion {
        self.writer
            .push(self.id(), OutboundFrame::Text(text.into()), true)
    }

    /// Send a complete binary message.
    pub fn push_binary(&self, data: impl Into<Bytes>) -> PushCompletion {
        self.writer
            .push(self.id(), OutboundFrame::Binary(data.into()), true)
    }

    /// Send `frame`, marking it final or a fragment.
    pub fn push(&self, frame: OutboundFrame, is_final: bool) -> PushCompletion {
        self.writer.push(self.id(), frame, is_final)
    }

    /// Send a ping.
    pub fn ping(&self, data: impl Into<Bytes>) -> PushCompletion {
        self.writer
            .push(self.id(), OutboundFrame::Ping(data.into()), true)
    }

    /// Send a pong.
    pub fn pong(&self, data: impl Into<Bytes>) -> PushCompletion {
        self.writer
            .push(self.id(), OutboundFrame::Pong(data.into()), true)
    }

    /// Start the closing handshake.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> PushCompletion {
        self.writer.close(self.id(), code, reason)
    }

    pub(crate) fn info(&self) -> &Arc<OpenConnectionInfo> { &self.info }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id())
            .field("negotiated_sub_protocol", &self.negotiated_sub_protocol())
            .field("secure", &self.is_secure())
            .field("open", &self.is_open())
            .finish()
    }
}
