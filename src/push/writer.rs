//! Forwarding of outbound frames to the transport.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::{PushCompletion, PushError, queue::WriteOp};
use crate::{
    session::{ConnectionId, ConnectionManager},
    transport::CloseFrame,
};

/// Data or control frame to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text payload.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
    /// Ping with application data.
    Ping(Bytes),
    /// Pong with application data.
    Pong(Bytes),
}

impl OutboundFrame {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

/// Cloneable writer bound to a listener's connection registry.
#[derive(Clone)]
pub struct OutboundWriter {
    connections: Arc<ConnectionManager>,
    tracker: TaskTracker,
}

impl OutboundWriter {
    /// Create a writer that spawns per-connection drain tasks on `tracker`.
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>, tracker: TaskTracker) -> Self {
        Self {
            connections,
            tracker,
        }
    }

    /// Send `frame` on connection `id`.
    ///
    /// `is_final` only applies to text and binary frames; control frames are
    /// never fragmented.
    ///
    /// The returned completion resolves with
    /// [`PushError::ConnectionNotFound`] when `id` is not registered, or with
    /// the transport's result otherwise. Writes on one connection reach the
    /// transport in call order. Must be called within a Tokio runtime.
    pub fn push(&self, id: ConnectionId, frame: OutboundFrame, is_final: bool) -> PushCompletion {
        let Some(info) = self.connections.get(&id) else {
            debug!(connection_id = %id, kind = frame.kind(), "push to unknown connection");
            return PushCompletion::resolved(Err(PushError::ConnectionNotFound(id)));
        };
        info.outbound().enqueue(
            info.transport(),
            &self.tracker,
            WriteOp::Frame { frame, is_final },
        )
    }

    /// Start closing connection `id` with `code` and `reason`.
    ///
    /// Records the close request but leaves the registry entry in place; it
    /// is removed when the transport reports the close. The close frame is
    /// queued behind earlier pushes on the same connection.
    pub fn close(&self, id: ConnectionId, code: u16, reason: impl Into<String>) -> PushCompletion {
        let Some(info) = self.connections.get(&id) else {
            return PushCompletion::resolved(Err(PushError::ConnectionNotFound(id)));
        };
        if !info.mark_close_requested() {
            debug!(connection_id = %id, "close already requested");
        }
        info.outbound().enqueue(
            info.transport(),
            &self.tracker,
            WriteOp::Close(CloseFrame::new(code, reason)),
        )
    }
}

impl std::fmt::Debug for OutboundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundWriter")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
