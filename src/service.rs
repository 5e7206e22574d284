//! WebSocket service descriptors.
//!
//! A [`WebSocketService`] names an upgrade path, the sub-protocols it speaks,
//! its per-connection limits and the handlers that receive its events. It is
//! assembled with [`WebSocketServiceBuilder`] and never changes afterwards.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{
    connection::WebSocketConnection,
    error::ConnectionError,
    hooks::{HandlerFuture, HandlerResult, ServiceHandlers},
    transport::CloseFrame,
};

/// Frame size limit applied when none is configured.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65_536;

/// Immutable description of a WebSocket service.
#[derive(Debug)]
pub struct WebSocketService {
    name: String,
    base_path: String,
    sub_protocols: Vec<String>,
    idle_timeout_secs: u64,
    max_frame_size: usize,
    handlers: ServiceHandlers,
}

impl WebSocketService {
    /// Start building a service called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> WebSocketServiceBuilder {
        WebSocketServiceBuilder::new(name)
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Sanitised upgrade path the service is registered under.
    #[must_use]
    pub fn base_path(&self) -> &str { &self.base_path }

    /// Sub-protocols offered during negotiation.
    #[must_use]
    pub fn sub_protocols(&self) -> &[String] { &self.sub_protocols }

    /// Service-level idle timeout, or `None` to inherit the listener's.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Largest inbound frame accepted, in bytes.
    #[must_use]
    pub fn max_frame_size(&self) -> usize { self.max_frame_size }

    /// Handlers bound to the service.
    #[must_use]
    pub fn handlers(&self) -> &ServiceHandlers { &self.handlers }
}

/// Builder for [`WebSocketService`].
///
/// ```
/// use wsgate::service::WebSocketService;
///
/// let service = WebSocketService::builder("chat")
///     .sub_protocols(["v1", "v2"])
///     .max_frame_size(0)
///     .on_text(|conn, text, _final| async move {
///         conn.push_text(text).await?;
///         Ok(())
///     })
///     .build();
/// assert_eq!(service.base_path(), "/chat");
/// assert_eq!(service.max_frame_size(), 65_536);
/// ```
#[derive(Debug)]
#[must_use]
pub struct WebSocketServiceBuilder {
    name: String,
    path: Option<String>,
    sub_protocols: Vec<String>,
    idle_timeout_secs: u64,
    max_frame_size: i64,
    handlers: ServiceHandlers,
}

impl WebSocketServiceBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            sub_protocols: Vec::new(),
            idle_timeout_secs: 0,
            max_frame_size: 0,
            handlers: ServiceHandlers::default(),
        }
    }

    /// Upgrade path; defaults to `/<name>`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sub-protocols the service can negotiate, in server preference order.
    pub fn sub_protocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.sub_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Idle timeout in seconds; `0` inherits the listener's setting.
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Maximum inbound frame size; non-positive values select
    /// [`DEFAULT_MAX_FRAME_SIZE`].
    pub fn max_frame_size(mut self, size: i64) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Bind the `on_open` handler.
    pub fn on_open<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_open = Some(Arc::new(move |conn| -> HandlerFuture {
            Box::pin(handler(conn))
        }));
        self
    }

    /// Bind the `on_text` handler.
    pub fn on_text<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, String, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_text = Some(Arc::new(move |conn, text, is_final| -> HandlerFuture {
            Box::pin(handler(conn, text, is_final))
        }));
        self
    }

    /// Bind the `on_binary` handler.
    pub fn on_binary<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, Bytes, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_binary = Some(Arc::new(move |conn, data, is_final| -> HandlerFuture {
            Box::pin(handler(conn, data, is_final))
        }));
        self
    }

    /// Bind the `on_ping` handler.
    pub fn on_ping<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_ping = Some(Arc::new(move |conn, data| -> HandlerFuture {
            Box::pin(handler(conn, data))
        }));
        self
    }

    /// Bind the `on_pong` handler.
    pub fn on_pong<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_pong = Some(Arc::new(move |conn, data| -> HandlerFuture {
            Box::pin(handler(conn, data))
        }));
        self
    }

    /// Bind the `on_close` handler.
    pub fn on_close<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, CloseFrame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_close = Some(Arc::new(move |conn, frame| -> HandlerFuture {
            Box::pin(handler(conn, frame))
        }));
        self
    }

    /// Bind the `on_idle_timeout` handler.
    pub fn on_idle_timeout<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_idle_timeout = Some(Arc::new(move |conn| -> HandlerFuture {
            Box::pin(handler(conn))
        }));
        self
    }

    /// Bind the `on_error` handler.
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(WebSocketConnection, ConnectionError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.on_error = Some(Arc::new(move |conn, error| -> HandlerFuture {
            Box::pin(handler(conn, error))
        }));
        self
    }

    /// Finish the service.
    #[must_use]
    pub fn build(self) -> WebSocketService {
        let base_path = match self.path {
            Some(path) if !path.trim().is_empty() => sanitize_base_path(&path),
            _ => sanitize_base_path(&self.name),
        };
        let max_frame_size = usize::try_from(self.max_frame_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE);
        WebSocketService {
            name: self.name,
            base_path,
            sub_protocols: self.sub_protocols,
            idle_timeout_secs: self.idle_timeout_secs,
            max_frame_size,
            handlers: self.handlers,
        }
    }
}

/// Normalise an upgrade path for registration and lookup.
///
/// Surrounding whitespace is trimmed, a leading `/` is ensured and trailing
/// slashes are removed unless the path is the root.
///
/// ```
/// use wsgate::service::sanitize_base_path;
///
/// assert_eq!(sanitize_base_path(" chat/ "), "/chat");
/// assert_eq!(sanitize_base_path("///"), "/");
/// ```
#[must_use]
pub fn sanitize_base_path(path: &str) -> String {
    let trimmed = path
        .trim()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
