//! Handler slots attached to a WebSocket service.
//!
//! [`ServiceHandlers`] stores one optional async callback per event kind.
//! Slots are fixed at build time; an unbound slot means the corresponding
//! event is dropped after any bookkeeping the engine performs for it.

use std::{panic::AssertUnwindSafe, sync::Arc};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};

use crate::{
    connection::WebSocketConnection,
    error::{ConnectionError, HandlerError},
    transport::CloseFrame,
};

/// Result produced by every handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Future returned by a boxed handler.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Type alias for the `on_open` callback.
pub type OnOpenHandler = Arc<dyn Fn(WebSocketConnection) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_text` callback. The flag reports a final frame.
pub type OnTextHandler =
    Arc<dyn Fn(WebSocketConnection, String, bool) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_binary` callback. The flag reports a final frame.
pub type OnBinaryHandler =
    Arc<dyn Fn(WebSocketConnection, Bytes, bool) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_ping` and `on_pong` callbacks.
pub type OnControlHandler = Arc<dyn Fn(WebSocketConnection, Bytes) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_close` callback.
pub type OnCloseHandler =
    Arc<dyn Fn(WebSocketConnection, CloseFrame) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_idle_timeout` callback.
pub type OnIdleTimeoutHandler = Arc<dyn Fn(WebSocketConnection) -> HandlerFuture + Send + Sync>;

/// Type alias for the `on_error` callback.
pub type OnErrorHandler =
    Arc<dyn Fn(WebSocketConnection, ConnectionError) -> HandlerFuture + Send + Sync>;

/// Optional handlers bound to a service.
#[derive(Clone, Default)]
pub struct ServiceHandlers {
    /// Invoked once the upgrade completes.
    pub on_open: Option<OnOpenHandler>,
    /// Invoked for each text frame.
    pub on_text: Option<OnTextHandler>,
    /// Invoked for each binary frame.
    pub on_binary: Option<OnBinaryHandler>,
    /// Invoked for each ping frame.
    pub on_ping: Option<OnControlHandler>,
    /// Invoked for each pong frame.
    pub on_pong: Option<OnControlHandler>,
    /// Invoked once when the connection closes.
    pub on_close: Option<OnCloseHandler>,
    /// Invoked each time the connection goes idle.
    pub on_idle_timeout: Option<OnIdleTimeoutHandler>,
    /// Invoked on transport failures and failures of the other handlers.
    pub on_error: Option<OnErrorHandler>,
}

impl std::fmt::Debug for ServiceHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn slot<T>(slot: Option<&T>) -> &'static str {
            if slot.is_some() { "Some(<handler>)" } else { "None" }
        }
        f.debug_struct("ServiceHandlers")
            .field("on_open", &slot(self.on_open.as_ref()))
            .field("on_text", &slot(self.on_text.as_ref()))
            .field("on_binary", &slot(self.on_binary.as_ref()))
            .field("on_ping", &slot(self.on_ping.as_ref()))
            .field("on_pong", &slot(self.on_pong.as_ref()))
            .field("on_close", &slot(self.on_close.as_ref()))
            .field("on_idle_timeout", &slot(self.on_idle_timeout.as_ref()))
            .field("on_error", &slot(self.on_error.as_ref()))
            .finish()
    }
}

/// Kind of event routed to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Handshake completed.
    Open,
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Ping frame.
    Ping,
    /// Pong frame.
    Pong,
    /// Connection closed.
    Close,
    /// Connection idle.
    IdleTimeout,
    /// Transport failure.
    Error,
}

impl EventKind {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Close => "close",
            Self::IdleTimeout => "idle_timeout",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Invoke a handler, turning panics into [`HandlerError::Panicked`].
///
/// Covers both a panic while building the future and one raised while it is
/// polled.
pub(crate) async fn run_guarded<F>(call: F) -> HandlerResult
where
    F: FnOnce() -> HandlerFuture,
{
    let future = match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(future) => future,
        Err(panic) => return Err(panicked(panic)),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(panicked(panic)),
    }
}

fn panicked(panic: Box<dyn std::any::Any + Send>) -> HandlerError {
    HandlerError::Panicked(crate::panic::format_panic(panic).to_string())
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;

    fn boxed(future: impl Future<Output = HandlerResult> + Send + 'static) -> HandlerFuture {
        Box::pin(future)
    }

    #[tokio::test]
    async fn guarded_passes_through_results() {
        let ok = run_guarded(|| boxed(async { Ok(()) })).await;
        assert!(ok.is_ok());
        let err = run_guarded(|| boxed(async { Err(HandlerError::from("bad")) })).await;
        assert_eq!(err.expect_err("handler error").to_string(), "bad");
    }

    #[tokio::test]
    async fn guarded_catches_panic_while_polling() {
        let result = run_guarded(|| boxed(async { panic!("boom") })).await;
        assert!(matches!(result, Err(HandlerError::Panicked(msg)) if msg == "boom"));
    }

    #[tokio::test]
    async fn guarded_catches_panic_while_building() {
        let result = run_guarded(|| -> HandlerFuture { panic!("early") }).await;
        assert!(matches!(result, Err(HandlerError::Panicked(msg)) if msg == "early"));
    }

    #[test]
    fn debug_hides_closures() {
        let handlers = ServiceHandlers::default();
        assert!(format!("{handlers:?}").contains("on_open: \"None\""));
    }
}
