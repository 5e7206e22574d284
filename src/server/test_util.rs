//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;

use super::{Bound, WebSocketServer};
use crate::{
    config::{ListenerConfig, ListenerConfigBuilder},
    service::WebSocketService,
};

#[fixture]
pub fn listener_config() -> ListenerConfig {
    ListenerConfigBuilder::new()
        .host("127.0.0.1")
        .port(9090)
        .build()
        .expect("valid listener config")
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents races where another process could
/// claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Bind an echo server to `listener`. Must run inside a Tokio runtime.
pub fn bind_echo_server(config: ListenerConfig, listener: StdTcpListener) -> WebSocketServer<Bound> {
    WebSocketServer::new(config)
        .workers(1)
        .service(
            WebSocketService::builder("echo")
                .on_text(|conn, text, _| async move {
                    conn.push_text(text).await?;
                    Ok(())
                })
                .build(),
        )
        .expect("register echo service")
        .bind_listener(listener)
        .expect("Failed to bind")
}
