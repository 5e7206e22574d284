//! Test helpers shared across library modules.

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::TransportError,
    service::WebSocketService,
    session::ConnectionId,
    transport::{CloseFrame, TransportConnection},
};

/// Build a handler-less service registered at `path`.
pub fn service(path: &str) -> Arc<WebSocketService> {
    Arc::new(WebSocketService::builder("test").path(path).build())
}

/// Minimal in-memory transport connection that records what it was asked
/// to do.
#[derive(Default)]
pub struct StubConnection {
    id: u64,
    closed: AtomicBool,
    fail: AtomicBool,
    reads: AtomicUsize,
    pushed: Mutex<Vec<String>>,
    closes: Mutex<Vec<CloseFrame>>,
}

impl StubConnection {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn fail_pushes(&self) { self.fail.store(true, Ordering::SeqCst); }

    pub fn reads(&self) -> usize { self.reads.load(Ordering::SeqCst) }

    pub fn pushed(&self) -> Vec<String> { self.pushed.lock().expect("lock").clone() }

    pub fn closes(&self) -> Vec<CloseFrame> { self.closes.lock().expect("lock").clone() }

    fn record(&self, entry: String) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.pushed.lock().expect("lock").push(entry);
        Ok(())
    }
}

#[async_trait]
impl TransportConnection for StubConnection {
    fn id(&self) -> ConnectionId { ConnectionId::new(self.id) }

    fn is_open(&self) -> bool { !self.closed.load(Ordering::SeqCst) }

    async fn push_text(&self, text: String, _is_final: bool) -> Result<(), TransportError> {
        self.record(format!("text:{text}"))
    }

    async fn push_binary(&self, data: Bytes, _is_final: bool) -> Result<(), TransportError> {
        self.record(format!("binary:{}", data.len()))
    }

    async fn push_ping(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(format!("ping:{}", data.len()))
    }

    async fn push_pong(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(format!("pong:{}", data.len()))
    }

    async fn close(&self, frame: CloseFrame) -> Result<(), TransportError> {
        self.closes.lock().expect("lock").push(frame);
        Ok(())
    }

    fn read_next_frame(&self) { self.reads.fetch_add(1, Ordering::SeqCst); }

    async fn terminate(&self, frame: CloseFrame) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.lock().expect("lock").push(frame);
        Ok(())
    }
}

/// Poll `check` until it holds or a second elapses.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
