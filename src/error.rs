//! Error types shared by the transport, handler and dispatch layers.

use std::{error::Error as StdError, io};

use thiserror::Error;

use crate::push::PushError;

/// Failures reported by a transport implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Underlying socket I/O failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The peer violated the WebSocket protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection was already closed when the operation ran.
    #[error("connection closed")]
    Closed,
    /// An inbound frame exceeded the negotiated maximum size.
    #[error("frame of {size} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The HTTP upgrade could not be completed.
    #[error("unable to complete handshake: {0}")]
    Handshake(String),
    /// The upgrade request was refused with an HTTP status.
    #[error("upgrade rejected with status {status}: {reason}")]
    Rejected {
        /// HTTP status sent to the client.
        status: u16,
        /// Body sent with the rejection.
        reason: String,
    },
}

/// Failure returned by a service handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandlerError {
    /// Plain failure message.
    #[error("{0}")]
    Message(String),
    /// Failure wrapping an arbitrary error.
    #[error(transparent)]
    Source(Box<dyn StdError + Send + Sync>),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any error type as a handler failure.
    pub fn other<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Source(Box::new(error))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self { Self::Message(message) }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self { Self::Message(message.to_owned()) }
}

impl From<PushError> for HandlerError {
    fn from(error: PushError) -> Self { Self::other(error) }
}

impl From<TransportError> for HandlerError {
    fn from(error: TransportError) -> Self { Self::other(error) }
}

/// Cause passed to a service's `on_error` handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The transport reported a failure on the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Another handler of the same service failed.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}
