//! Routing of transport events to service handlers.
//!
//! Every event is matched to its connection through the
//! [`ConnectionManager`]; events for unknown connections are dropped. Data
//! and control frames go to the matching handler, after which the next
//! frame is requested from the transport, so a connection never has more
//! than one frame handler running. Close and error events remove the
//! connection before their handler runs.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{error, trace, warn};

use crate::{
    connection::WebSocketConnection,
    error::{ConnectionError, HandlerError},
    hooks::{EventKind, HandlerFuture, run_guarded},
    metrics,
    push::OutboundWriter,
    session::ConnectionManager,
    transport::{EventSink, TransportEvent},
};

/// Dispatches [`TransportEvent`]s for one listener.
#[derive(Clone)]
pub struct FrameDispatcher {
    connections: Arc<ConnectionManager>,
    writer: OutboundWriter,
    tracker: TaskTracker,
}

impl FrameDispatcher {
    /// Create a dispatcher spawning handlers on `tracker`.
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionManager>,
        writer: OutboundWriter,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            connections,
            writer,
            tracker,
        }
    }

    /// Route `event` to its connection's handler.
    ///
    /// Never waits for the handler. Must be called within a Tokio runtime.
    pub fn dispatch(&self, event: TransportEvent) {
        let id = event.connection_id();
        let kind = kind_of(&event);
        let terminal = matches!(kind, EventKind::Close | EventKind::Error);
        let info = if terminal {
            self.connections.remove(&id)
        } else {
            self.connections.get(&id)
        };
        let Some(info) = info else {
            trace!(connection_id = %id, event = %kind, "dropping event for unknown connection");
            return;
        };
        if terminal {
            info.mark_closed();
        }
        metrics::inc_frames(kind);
        let conn = WebSocketConnection::new(info, self.writer.clone());
        let handlers = conn.service().handlers().clone();

        match event {
            TransportEvent::Text { data, is_final, .. } => {
                let call = handlers.on_text.map(|h| {
                    let conn = conn.clone();
                    move || h(conn, data, is_final)
                });
                self.run_frame_handler(conn, kind, call);
            }
            TransportEvent::Binary { data, is_final, .. } => {
                let call = handlers.on_binary.map(|h| {
                    let conn = conn.clone();
                    move || h(conn, data, is_final)
                });
                self.run_frame_handler(conn, kind, call);
            }
            TransportEvent::Ping { data, .. } => {
                let call = handlers.on_ping.map(|h| {
                    let conn = conn.clone();
                    move || h(conn, data)
                });
                self.run_frame_handler(conn, kind, call);
            }
            TransportEvent::Pong { data, .. } => {
                let call = handlers.on_pong.map(|h| {
                    let conn = conn.clone();
                    move || h(conn, data)
                });
                self.run_frame_handler(conn, kind, call);
            }
            TransportEvent::IdleTimeout { .. } => {
                if let Some(h) = handlers.on_idle_timeout {
                    let handler_conn = conn.clone();
                    self.tracker.spawn(async move {
                        if let Err(e) = run_guarded(move || h(handler_conn)).await {
                            report_failure(&conn, kind, e).await;
                        }
                    });
                }
            }
            TransportEvent::Close { frame, .. } => {
                trace!(connection_id = %id, code = frame.code, reason = %frame.reason, "connection closed");
                if let Some(h) = handlers.on_close {
                    self.tracker.spawn(async move {
                        if let Err(e) = run_guarded(move || h(conn, frame)).await {
                            metrics::inc_handler_errors();
                            error!(connection_id = %id, error = %e, "onClose handler failed");
                        }
                    });
                }
            }
            TransportEvent::Error { error: cause, .. } => {
                warn!(connection_id = %id, error = %cause, "connection failed");
                if let Some(h) = handlers.on_error {
                    self.tracker.spawn(async move {
                        let cause = ConnectionError::Transport(cause);
                        if let Err(e) = run_guarded(move || h(conn, cause)).await {
                            metrics::inc_handler_errors();
                            error!(connection_id = %id, error = %e, "onError handler failed");
                        }
                    });
                }
            }
        }
    }

    fn run_frame_handler<F>(&self, conn: WebSocketConnection, kind: EventKind, call: Option<F>)
    where
        F: FnOnce() -> HandlerFuture + Send + 'static,
    {
        let Some(call) = call else {
            conn.info().transport().read_next_frame();
            return;
        };
        self.tracker.spawn(async move {
            if let Err(e) = run_guarded(call).await {
                report_failure(&conn, kind, e).await;
            }
            if conn.is_open() {
                conn.info().transport().read_next_frame();
            }
        });
    }
}

impl EventSink for FrameDispatcher {
    fn deliver(&self, event: TransportEvent) { self.dispatch(event); }
}

impl std::fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDispatcher").finish_non_exhaustive()
    }
}

fn kind_of(event: &TransportEvent) -> EventKind {
    match event {
        TransportEvent::Text { .. } => EventKind::Text,
        TransportEvent::Binary { .. } => EventKind::Binary,
        TransportEvent::Ping { .. } => EventKind::Ping,
        TransportEvent::Pong { .. } => EventKind::Pong,
        TransportEvent::Close { .. } => EventKind::Close,
        TransportEvent::Error { .. } => EventKind::Error,
        TransportEvent::IdleTimeout { .. } => EventKind::IdleTimeout,
    }
}

/// Hand a handler failure to `on_error`, or log it when that slot is empty.
async fn report_failure(conn: &WebSocketConnection, kind: EventKind, failure: HandlerError) {
    metrics::inc_handler_errors();
    let id = conn.id();
    let Some(on_error) = conn.service().handlers().on_error.clone() else {
        error!(connection_id = %id, event = %kind, error = %failure, "handler failed");
        return;
    };
    let handler_conn = conn.clone();
    let cause = ConnectionError::Handler(failure);
    if let Err(e) = run_guarded(move || on_error(handler_conn, cause)).await {
        metrics::inc_handler_errors();
        error!(connection_id = %id, event = %kind, error = %e, "onError handler failed");
    }
}
