//! Convenience imports for writing services and running a listener.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsgate::prelude::*;
//!
//! fn echo() -> WebSocketService {
//!     WebSocketService::builder("echo")
//!         .on_text(|conn, text, _| async move {
//!             conn.push_text(text).await?;
//!             Ok(())
//!         })
//!         .build()
//! }
//! ```

pub use crate::{
    config::{ListenerConfig, ListenerConfigBuilder},
    connection::WebSocketConnection,
    error::{ConnectionError, HandlerError},
    hooks::HandlerResult,
    push::{OutboundFrame, PushError},
    server::{ServerError, WebSocketServer},
    service::WebSocketService,
    transport::CloseFrame,
};
