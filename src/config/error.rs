//! Errors raised while validating a listener configuration.

use thiserror::Error;

/// Listener configuration rejected by [`super::ListenerConfigBuilder::build`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration text could not be parsed.
    #[error("invalid listener configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// No port was configured.
    #[error("listener port is not defined")]
    PortNotDefined,
    /// The idle timeout was negative.
    #[error("idle timeout cannot be negative, found {0}")]
    NegativeIdleTimeout(i64),
    /// A request size limit was negative but not `-1`.
    #[error("invalid configuration found for {field}: {value}")]
    InvalidRequestLimit {
        /// Name of the offending limit.
        field: &'static str,
        /// Rejected value.
        value: i64,
    },
    /// Keep-alive policy is not one of `AUTO`, `ALWAYS` or `NEVER`.
    #[error("invalid keep-alive policy {0:?}; expected AUTO, ALWAYS or NEVER")]
    InvalidKeepAlive(String),
    /// Pipelining was enabled with a limit below one.
    #[error("pipelining limit must be at least 1, found {0}")]
    InvalidPipeliningLimit(i64),
    /// A keystore was configured together with a key or certificate file.
    #[error("cannot configure both keystore and key/certificate files at the same time")]
    BothIdentitySources,
    /// A key file was configured without a certificate file.
    #[error("certificate file must be provided along with the key file")]
    MissingCertFile,
    /// Neither a keystore nor a key file was configured.
    #[error(
        "either keystore or certificate key and server certificates must be provided for secure \
         connection"
    )]
    MissingServerIdentity,
    /// The keystore path was blank.
    #[error("keystore file location must be provided for secure connection")]
    MissingKeystorePath,
    /// The keystore password was blank.
    #[error("keystore password must be provided for secure connection")]
    MissingKeystorePassword,
    /// The client verification mode could not be parsed.
    #[error("invalid client verification mode {0:?}; expected require or optional")]
    InvalidClientVerification(String),
    /// Both a truststore and trusted certificates were configured.
    #[error("cannot configure both truststore and trust certificates at the same time")]
    BothTrustSources,
    /// Client verification requested without trust material.
    #[error("truststore or trust certificates must be provided to enable mutual TLS")]
    MissingTrustMaterial,
    /// The truststore path was blank while client verification was requested.
    #[error("truststore file location must be provided to enable mutual TLS")]
    MissingTruststorePath,
    /// The truststore password was blank while client verification was
    /// requested.
    #[error("truststore password must be provided to enable mutual TLS")]
    MissingTruststorePassword,
}
