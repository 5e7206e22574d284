//! Listener configuration.
//!
//! [`ListenerConfigBuilder`] collects the declarative settings of a
//! WebSocket listener, either through fluent setters or from TOML, and
//! [`ListenerConfigBuilder::build`] validates them into an immutable
//! [`ListenerConfig`]. Validation is pure: it performs no I/O and reads no
//! environment.
//!
//! ```
//! use wsgate::config::ListenerConfigBuilder;
//!
//! let config = ListenerConfigBuilder::new()
//!     .port(9090)
//!     .idle_timeout_secs(30)
//!     .build()
//!     .expect("valid listener");
//! assert_eq!(config.id(), "0.0.0.0:9090");
//! assert_eq!(config.scheme(), "ws");
//! ```

mod error;
mod limits;
mod tls;

use std::time::Duration;

pub use error::ConfigError;
pub use limits::{KeepAlive, Pipelining, RawRequestLimits, RequestLimits};
use serde::Deserialize;
pub use tls::{
    CacheSettings,
    ClientVerification,
    DEFAULT_CACHE_SIZE,
    DEFAULT_CACHE_VALIDITY,
    RawCache,
    RawProtocol,
    RawStore,
    RawTlsConfig,
    STORE_TYPE,
    Secret,
    ServerIdentity,
    TlsProtocol,
    TlsSettings,
    TrustMaterial,
};

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Pipelining limit used when none is configured.
pub const DEFAULT_PIPELINING_LIMIT: i64 = 10;

/// Unvalidated listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[must_use]
pub struct ListenerConfigBuilder {
    host: String,
    port: u16,
    idle_timeout_secs: i64,
    secure_socket: Option<RawTlsConfig>,
    request_limits: RawRequestLimits,
    keep_alive: String,
    pipelining: bool,
    pipelining_limit: i64,
    #[serde(skip)]
    default_host: Option<String>,
}

impl Default for ListenerConfigBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            idle_timeout_secs: 0,
            secure_socket: None,
            request_limits: RawRequestLimits::default(),
            keep_alive: "AUTO".to_owned(),
            pipelining: true,
            pipelining_limit: DEFAULT_PIPELINING_LIMIT,
            default_host: None,
        }
    }
}

impl ListenerConfigBuilder {
    /// Start from the defaults: no port, no TLS, no limits.
    pub fn new() -> Self { Self::default() }

    /// Parse settings from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or
    /// contains unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(text)?) }

    /// Interface to listen on; blank selects the default host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Host substituted for a blank [`Self::host`].
    pub fn default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = Some(host.into());
        self
    }

    /// TCP port; `0` is rejected.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Listener-wide idle timeout in seconds; `0` disables it.
    pub fn idle_timeout_secs(mut self, secs: i64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Enable TLS with the given raw settings.
    pub fn secure_socket(mut self, tls: RawTlsConfig) -> Self {
        self.secure_socket = Some(tls);
        self
    }

    /// Request size limits; `-1` leaves a limit unset.
    pub fn request_limits(mut self, limits: RawRequestLimits) -> Self {
        self.request_limits = limits;
        self
    }

    /// Keep-alive policy name.
    pub fn keep_alive(mut self, policy: impl Into<String>) -> Self {
        self.keep_alive = policy.into();
        self
    }

    /// Enable or disable pipelining and set its limit.
    pub fn pipelining(mut self, enabled: bool, limit: i64) -> Self {
        self.pipelining = enabled;
        self.pipelining_limit = limit;
        self
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, checking the port, idle
    /// timeout, request limits, keep-alive, pipelining and TLS settings in
    /// that order.
    pub fn build(self) -> Result<ListenerConfig, ConfigError> {
        let host = if self.host.trim().is_empty() {
            self.default_host
                .unwrap_or_else(|| DEFAULT_HOST.to_owned())
        } else {
            self.host.trim().to_owned()
        };
        if self.port == 0 {
            return Err(ConfigError::PortNotDefined);
        }
        let idle_timeout = match u64::try_from(self.idle_timeout_secs) {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => return Err(ConfigError::NegativeIdleTimeout(self.idle_timeout_secs)),
        };
        let limits = RequestLimits::try_from(self.request_limits)?;
        let keep_alive = self.keep_alive.parse()?;
        let secure = self.secure_socket.is_some();
        let pipelining = Pipelining::new(self.pipelining, self.pipelining_limit, secure)?;
        let tls = self.secure_socket.map(TlsSettings::try_from).transpose()?;
        Ok(ListenerConfig {
            host,
            port: self.port,
            idle_timeout,
            tls,
            limits,
            keep_alive,
            pipelining,
            server_header: format!("wsgate/{}", env!("CARGO_PKG_VERSION")),
        })
    }
}

/// Validated, immutable listener settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    host: String,
    port: u16,
    idle_timeout: Option<Duration>,
    tls: Option<TlsSettings>,
    limits: RequestLimits,
    keep_alive: KeepAlive,
    pipelining: Pipelining,
    server_header: String,
}

impl ListenerConfig {
    /// Interface the listener binds to.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }

    /// Listener identity, `host:port`.
    #[must_use]
    pub fn id(&self) -> String { format!("{}:{}", self.host, self.port) }

    /// `wss` for secure listeners, `ws` otherwise.
    #[must_use]
    pub fn scheme(&self) -> &'static str { if self.is_secure() { "wss" } else { "ws" } }

    /// Whether TLS is configured.
    #[must_use]
    pub fn is_secure(&self) -> bool { self.tls.is_some() }

    /// Idle timeout applied to services that do not set their own.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> { self.idle_timeout }

    /// TLS settings of a secure listener.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsSettings> { self.tls.as_ref() }

    /// Request size limits.
    #[must_use]
    pub fn request_limits(&self) -> RequestLimits { self.limits }

    /// Keep-alive policy.
    #[must_use]
    pub fn keep_alive(&self) -> KeepAlive { self.keep_alive }

    /// Pipelining policy.
    #[must_use]
    pub fn pipelining(&self) -> Pipelining { self.pipelining }

    /// Value of the `Server` response header.
    #[must_use]
    pub fn server_header(&self) -> &str { &self.server_header }
}
