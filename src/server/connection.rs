//! Per-connection task of [`super::WebSocketServer`].

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use log::{error, warn};
use tokio::net::TcpStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{StreamAcceptor, transport::TungsteniteHandshaker};
use crate::endpoint::WebSocketEndpoint;

/// What a connection task needs from its listener.
#[derive(Clone)]
pub(super) struct ConnectionServices {
    pub endpoint: Arc<WebSocketEndpoint>,
    pub acceptor: Arc<dyn StreamAcceptor>,
}

/// Spawn a task that upgrades one TCP connection, logging and discarding
/// any panic.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    peer_addr: SocketAddr,
    services: ConnectionServices,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) {
    let reader_tracker = tracker.clone();
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(process_stream(
            stream,
            peer_addr,
            services,
            shutdown,
            reader_tracker,
        ))
        .catch_unwind();

        if let Err(panic) = fut.await {
            let panic_msg = crate::panic::format_panic(panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr}");
            tracing::error!(panic = %panic_msg, %peer_addr, "connection task panicked");
        }
    });
}

async fn process_stream(
    stream: TcpStream,
    peer_addr: SocketAddr,
    services: ConnectionServices,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let ConnectionServices { endpoint, acceptor } = services;
    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("stream acceptor failed: error={e}, peer_addr={peer_addr}");
            return;
        }
    };
    let handshaker = TungsteniteHandshaker::new(stream, endpoint.event_sink())
        .secure(acceptor.is_secure())
        .max_message_size(endpoint.registry().largest_frame_size())
        .shutdown(shutdown, tracker);
    endpoint.accept(Box::new(handshaker)).await;
}
