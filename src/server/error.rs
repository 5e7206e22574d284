//! Errors raised by [`super::WebSocketServer`] operations.

use std::io;

use thiserror::Error;

use crate::{config::ConfigError, registry::RegistryError};

/// Errors that may occur while configuring or running the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Binding or configuring the listener socket failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The listener configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A service could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A secure listener was bound without a TLS acceptor.
    #[error("listener {0} is secure but no TLS stream acceptor was supplied")]
    TlsAcceptorMissing(String),
}
