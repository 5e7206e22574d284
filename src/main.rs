//! Echo server demonstrating `wsgate` usage.
//!
//! Registers one service that sends every text and binary message back to
//! its sender and runs the listener until Ctrl+C.

mod cli;

use std::fs;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsgate::{
    config::ListenerConfigBuilder,
    server::WebSocketServer,
    service::WebSocketService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    let mut builder = match &cli.config {
        Some(path) => ListenerConfigBuilder::from_toml_str(&fs::read_to_string(path)?)?,
        None => ListenerConfigBuilder::new().port(cli::DEFAULT_PORT),
    };
    if let Some(host) = cli.host {
        builder = builder.host(host);
    }
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }
    let config = builder.build()?;

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "prometheus exporter listening");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        tracing::warn!("built without the metrics feature; ignoring --metrics-addr");
    }

    let echo = WebSocketService::builder("echo")
        .path(cli.path)
        .sub_protocols(cli.sub_protocols)
        .idle_timeout_secs(cli.idle_timeout)
        .on_text(|conn, text, _| async move {
            conn.push_text(text).await?;
            Ok(())
        })
        .on_binary(|conn, data, _| async move {
            conn.push_binary(data).await?;
            Ok(())
        })
        .on_idle_timeout(|conn| async move {
            info!(connection_id = %conn.id(), "closing idle connection");
            conn.close(1000, "Idle timeout").await?;
            Ok(())
        })
        .build();

    let server = WebSocketServer::new(config).service(echo)?.bind()?;
    if let Some(addr) = server.local_addr() {
        info!(%addr, "wsgate listening");
    }
    server.run().await?;
    Ok(())
}
