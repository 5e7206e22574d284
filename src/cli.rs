//! Command line interface for the `wsgate` echo server.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Port used when neither the command line nor a configuration file sets one.
pub const DEFAULT_PORT: u16 = 9090;

/// Command line arguments for the `wsgate` binary.
#[derive(Debug, Parser)]
#[command(name = "wsgate", version, about = "WebSocket echo server built on wsgate")]
pub struct Cli {
    /// Listener configuration file in TOML.
    #[arg(short, long, env = "WSGATE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Interface to bind, overriding the configuration file.
    #[arg(long, env = "WSGATE_HOST")]
    pub host: Option<String>,
    /// Port to bind, overriding the configuration file.
    #[arg(short, long, env = "WSGATE_PORT")]
    pub port: Option<u16>,
    /// Base path of the echo service.
    #[arg(long, default_value = "/echo")]
    pub path: String,
    /// Sub-protocol the echo service accepts. Repeatable.
    #[arg(long = "sub-protocol", value_name = "NAME")]
    pub sub_protocols: Vec<String>,
    /// Idle timeout of the echo service in seconds; 0 inherits the listener's.
    #[arg(long, default_value_t = 0)]
    pub idle_timeout: u64,
    /// Address of the Prometheus scrape endpoint.
    #[arg(long, env = "WSGATE_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}
