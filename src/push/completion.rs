//! Completion future for a single push.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use super::PushError;

/// Resolves with the outcome of a push.
///
/// Dropping the completion does not cancel the write.
#[derive(Debug)]
#[must_use = "a push completion reports whether the frame was written"]
pub struct PushCompletion(oneshot::Receiver<Result<(), PushError>>);

impl PushCompletion {
    /// Create a sender/completion pair.
    pub(crate) fn channel() -> (oneshot::Sender<Result<(), PushError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// Completion that is already resolved with `result`.
    pub(crate) fn resolved(result: Result<(), PushError>) -> Self {
        let (tx, completion) = Self::channel();
        // The receiver lives in `completion`, so the send cannot fail.
        let _ = tx.send(result);
        completion
    }
}

impl Future for PushCompletion {
    type Output = Result<(), PushError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PushError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionId;

    #[tokio::test]
    async fn resolved_completion_yields_result() {
        let completion =
            PushCompletion::resolved(Err(PushError::ConnectionNotFound(ConnectionId::new(1))));
        assert!(matches!(
            completion.await,
            Err(PushError::ConnectionNotFound(id)) if id == ConnectionId::new(1)
        ));
    }

    #[tokio::test]
    async fn dropped_sender_is_abandoned() {
        let (tx, completion) = PushCompletion::channel();
        drop(tx);
        assert!(matches!(completion.await, Err(PushError::Abandoned)));
    }
}
