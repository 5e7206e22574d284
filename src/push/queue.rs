//! Per-connection write queue.
//!
//! Every connection owns one [`OutboundQueue`]. The first write spawns a
//! drain task that hands queued writes to the transport one at a time, so
//! frames reach the wire in the order the pushes were issued, whether or
//! not the caller awaits each completion.

use std::sync::{Arc, OnceLock};

use tokio::{select, sync::mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, trace};

use super::{OutboundFrame, PushCompletion, PushError};
use crate::{
    session::ConnectionId,
    transport::{CloseFrame, TransportConnection},
};

/// A single queued transport operation.
#[derive(Debug)]
pub(crate) enum WriteOp {
    Frame { frame: OutboundFrame, is_final: bool },
    Close(CloseFrame),
}

#[derive(Debug)]
struct WriteRequest {
    op: WriteOp,
    done: tokio::sync::oneshot::Sender<Result<(), PushError>>,
}

/// Call-ordered writes for one connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    sender: OnceLock<mpsc::UnboundedSender<WriteRequest>>,
    closed: CancellationToken,
}

impl OutboundQueue {
    /// Queue `op` behind every earlier write on this connection.
    ///
    /// Must be called within a Tokio runtime; the drain task is spawned on
    /// `tracker` by the first call.
    pub(crate) fn enqueue(
        &self,
        transport: &Arc<dyn TransportConnection>,
        tracker: &TaskTracker,
        op: WriteOp,
    ) -> PushCompletion {
        let id = transport.id();
        let (done, completion) = PushCompletion::channel();
        if self.closed.is_cancelled() {
            let _ = done.send(Err(PushError::ConnectionNotFound(id)));
            return completion;
        }
        let sender = self.sender.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tracker.spawn(drain(Arc::clone(transport), rx, self.closed.clone()));
            tx
        });
        if let Err(mpsc::error::SendError(request)) = sender.send(WriteRequest { op, done }) {
            let _ = request.done.send(Err(PushError::ConnectionNotFound(id)));
        }
        completion
    }

    /// Stop the drain task once the queued writes have been attempted.
    ///
    /// Writes issued afterwards resolve with
    /// [`PushError::ConnectionNotFound`].
    pub(crate) fn shut(&self) { self.closed.cancel(); }
}

async fn drain(
    transport: Arc<dyn TransportConnection>,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    closed: CancellationToken,
) {
    let id = transport.id();
    loop {
        let request = select! {
            biased;

            request = rx.recv() => request,
            () = closed.cancelled() => None,
        };
        let Some(WriteRequest { op, done }) = request else {
            break;
        };
        let _ = done.send(write(id, transport.as_ref(), op).await);
    }
    rx.close();
    while let Ok(WriteRequest { done, .. }) = rx.try_recv() {
        let _ = done.send(Err(PushError::ConnectionNotFound(id)));
    }
    trace!(connection_id = %id, "write queue drained");
}

async fn write(
    id: ConnectionId,
    transport: &dyn TransportConnection,
    op: WriteOp,
) -> Result<(), PushError> {
    let (kind, result) = match op {
        WriteOp::Frame { frame, is_final } => {
            let kind = frame.kind();
            let result = match frame {
                OutboundFrame::Text(text) => transport.push_text(text, is_final).await,
                OutboundFrame::Binary(data) => transport.push_binary(data, is_final).await,
                OutboundFrame::Ping(data) => transport.push_ping(data).await,
                OutboundFrame::Pong(data) => transport.push_pong(data).await,
            };
            (kind, result)
        }
        WriteOp::Close(frame) => ("close", transport.close(frame).await),
    };
    match &result {
        Ok(()) => trace!(connection_id = %id, kind, "frame pushed"),
        Err(e) => debug!(connection_id = %id, kind, error = %e, "push failed"),
    }
    result.map_err(PushError::Transport)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_util::StubConnection;

    #[tokio::test]
    async fn writes_keep_call_order_without_awaiting() {
        let stub = Arc::new(StubConnection::new(1));
        let transport: Arc<dyn TransportConnection> = stub.clone();
        let queue = OutboundQueue::default();
        let tracker = TaskTracker::new();

        let completions: Vec<_> = (0..50)
            .map(|i| {
                queue.enqueue(
                    &transport,
                    &tracker,
                    WriteOp::Frame {
                        frame: OutboundFrame::Text(i.to_string()),
                        is_final: true,
                    },
                )
            })
            .collect();
        for completion in completions {
            completion.await.expect("write succeeds");
        }

        let expected: Vec<String> = (0..50).map(|i| format!("text:{i}")).collect();
        assert_eq!(stub.pushed(), expected);
    }

    #[tokio::test]
    async fn shut_queue_refuses_new_writes() {
        let stub = Arc::new(StubConnection::new(2));
        let transport: Arc<dyn TransportConnection> = stub.clone();
        let queue = OutboundQueue::default();
        let tracker = TaskTracker::new();

        queue.shut();
        let result = queue
            .enqueue(&transport, &tracker, WriteOp::Close(CloseFrame::new(1000, "bye")))
            .await;
        assert!(matches!(result, Err(PushError::ConnectionNotFound(id)) if id == ConnectionId::new(2)));
        assert!(stub.closes().is_empty());
    }
}
