//! Recording [`TransportConnection`].

use std::sync::{
    Mutex,
    MutexGuard,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use wsgate::{
    CloseFrame,
    ConnectionId,
    TransportError,
    transport::TransportConnection,
};

/// Frame handed to a [`MockConnection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame and its final flag.
    Text(String, bool),
    /// Binary frame and its final flag.
    Binary(Bytes, bool),
    /// Ping payload.
    Ping(Bytes),
    /// Pong payload.
    Pong(Bytes),
    /// Close frame sent through `close`.
    Close(CloseFrame),
    /// Close frame sent through `terminate`.
    Terminate(CloseFrame),
}

/// Transport connection that records what the engine does with it.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    open: AtomicBool,
    registered: AtomicBool,
    fail_pushes: AtomicBool,
    reads: AtomicUsize,
    outbound: Mutex<Vec<Outbound>>,
}

impl MockConnection {
    /// Create an open connection with `id`.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id: ConnectionId::new(id),
            open: AtomicBool::new(true),
            registered: AtomicBool::new(false),
            fail_pushes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            outbound: Mutex::new(Vec::new()),
        }
    }

    /// Make every later outbound operation fail with
    /// [`TransportError::Closed`].
    pub fn fail_pushes(&self) { self.fail_pushes.store(true, Ordering::SeqCst); }

    /// Simulate the socket dropping.
    pub fn disconnect(&self) { self.open.store(false, Ordering::SeqCst); }

    /// Whether the engine has registered the connection.
    #[must_use]
    pub fn is_registered(&self) -> bool { self.registered.load(Ordering::SeqCst) }

    /// Number of `read_next_frame` calls so far.
    #[must_use]
    pub fn reads(&self) -> usize { self.reads.load(Ordering::SeqCst) }

    /// Frames sent so far, oldest first.
    #[must_use]
    pub fn outbound(&self) -> Vec<Outbound> { self.log().clone() }

    /// Text payloads sent so far.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Text(text, _) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Close frame passed to `terminate`, if any.
    #[must_use]
    pub fn terminated_with(&self) -> Option<CloseFrame> {
        self.log().iter().find_map(|frame| match frame {
            Outbound::Terminate(close) => Some(close.clone()),
            _ => None,
        })
    }

    fn log(&self) -> MutexGuard<'_, Vec<Outbound>> {
        self.outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, frame: Outbound) -> Result<(), TransportError> {
        if self.fail_pushes.load(Ordering::SeqCst) || !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.log().push(frame);
        Ok(())
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    fn id(&self) -> ConnectionId { self.id }

    fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    async fn push_text(&self, text: String, is_final: bool) -> Result<(), TransportError> {
        self.record(Outbound::Text(text, is_final))
    }

    async fn push_binary(&self, data: Bytes, is_final: bool) -> Result<(), TransportError> {
        self.record(Outbound::Binary(data, is_final))
    }

    async fn push_ping(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(Outbound::Ping(data))
    }

    async fn push_pong(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(Outbound::Pong(data))
    }

    async fn close(&self, frame: CloseFrame) -> Result<(), TransportError> {
        self.record(Outbound::Close(frame))
    }

    fn registered(&self) { self.registered.store(true, Ordering::SeqCst); }

    fn read_next_frame(&self) { self.reads.fetch_add(1, Ordering::SeqCst); }

    async fn terminate(&self, frame: CloseFrame) -> Result<(), TransportError> {
        self.log().push(Outbound::Terminate(frame));
        self.disconnect();
        Ok(())
    }
}
