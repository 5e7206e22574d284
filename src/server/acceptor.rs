//! Stream wrapping applied before the WebSocket upgrade.
//!
//! TLS is supplied by the embedder through [`StreamAcceptor`]; the crate
//! ships only [`PlainAcceptor`].

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// Byte stream the upgrade runs over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased [`AsyncStream`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Turns an accepted TCP stream into the stream the upgrade runs over.
///
/// A TLS implementation performs its handshake in [`Self::accept`] using the
/// listener's [`crate::config::TlsSettings`].
#[async_trait]
pub trait StreamAcceptor: Send + Sync + 'static {
    /// Wrap `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be prepared, such as a failed
    /// TLS handshake. The connection is dropped.
    async fn accept(&self, stream: TcpStream) -> io::Result<BoxedStream>;

    /// Whether streams produced by this acceptor are encrypted.
    fn is_secure(&self) -> bool;
}

/// Passes TCP streams through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainAcceptor;

#[async_trait]
impl StreamAcceptor for PlainAcceptor {
    async fn accept(&self, stream: TcpStream) -> io::Result<BoxedStream> {
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn is_secure(&self) -> bool { false }
}
