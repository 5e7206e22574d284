//! Error types for push operations.

use thiserror::Error;

use crate::{error::TransportError, session::ConnectionId};

/// Errors that can occur when pushing a frame.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PushError {
    /// No open connection is registered under the id.
    #[error("{0} is not an open connection")]
    ConnectionNotFound(ConnectionId),
    /// The transport failed to write the frame.
    #[error("push failed: {0}")]
    Transport(#[from] TransportError),
    /// The write task ended without reporting a result.
    #[error("push task ended before completing")]
    Abandoned,
}
