//! Runtime control for [`WebSocketServer`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    Bound,
    PlainAcceptor,
    ServerError,
    StreamAcceptor,
    WebSocketServer,
    connection::ConnectionServices,
};

impl WebSocketServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the result is currently always `Ok`.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Once shutdown starts the accept loops stop, every open connection is
    /// sent a close frame with status 1001 and handler tasks get the
    /// configured shutdown timeout to finish.
    ///
    /// ```no_run
    /// use tokio::sync::oneshot;
    /// use wsgate::{config::ListenerConfigBuilder, server::WebSocketServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ListenerConfigBuilder::new().port(9090).build()?;
    /// let server = WebSocketServer::new(config).bind()?;
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle.await??;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the result is currently always `Ok`.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let WebSocketServer {
            config,
            endpoint,
            acceptor,
            workers,
            backoff_config,
            shutdown_timeout,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let acceptor: Arc<dyn StreamAcceptor> = acceptor.unwrap_or_else(|| Arc::new(PlainAcceptor));
        let services = ConnectionServices {
            endpoint: Arc::clone(&endpoint),
            acceptor,
        };

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                services.clone(),
                AcceptLoopOptions {
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: backoff_config,
                },
            ));
        }
        info!(
            "listener started: id={}, scheme={}, workers={workers}",
            config.id(),
            config.scheme()
        );

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;

        let handlers = endpoint.tracker();
        handlers.close();
        if timeout(shutdown_timeout, handlers.wait()).await.is_err() {
            warn!(
                "handler tasks still running after shutdown timeout: listener={}, open={}",
                config.id(),
                endpoint.connections().len()
            );
        }
        info!("listener stopped: id={}", config.id());
        Ok(())
    }
}
