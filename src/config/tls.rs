//! TLS settings for secure listeners.
//!
//! The raw shapes mirror what an operator writes in a configuration file;
//! [`TlsSettings`] is the validated form. The crate never performs TLS
//! itself: a [`crate::server::StreamAcceptor`] supplied by the embedder
//! consumes these settings.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;

use super::ConfigError;

/// Store format of keystores and truststores.
pub const STORE_TYPE: &str = "PKCS12";
/// Cache size used when a cache is enabled with size `0`.
pub const DEFAULT_CACHE_SIZE: u32 = 50;
/// Cache validity used when a cache is enabled with period `0`.
pub const DEFAULT_CACHE_VALIDITY: Duration = Duration::from_secs(900);

/// Password or other sensitive string that never appears in debug output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a sensitive value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Borrow the wrapped value.
    #[must_use]
    pub fn expose(&self) -> &str { &self.0 }

    fn is_blank(&self) -> bool { self.0.trim().is_empty() }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Secret(***)") }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Keystore or truststore location and password.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawStore {
    /// File path of the store.
    pub path: String,
    /// Password protecting the store.
    pub password: Secret,
}

/// TLS protocol selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawProtocol {
    /// Protocol family, such as `TLS`.
    pub name: String,
    /// Enabled versions, such as `TLSv1.2`.
    pub versions: Vec<String>,
}

/// Certificate validation or OCSP stapling cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawCache {
    /// Whether the feature is turned on.
    pub enable: bool,
    /// Maximum cached entries; `0` selects the default.
    pub cache_size: u32,
    /// Entry lifetime in seconds; `0` selects the default.
    pub cache_validity_period_secs: u64,
}

/// Unvalidated TLS section of a listener configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawTlsConfig {
    /// Keystore holding the server identity.
    pub key_store: Option<RawStore>,
    /// Private key file.
    pub key_file: Option<String>,
    /// Server certificate chain file.
    pub cert_file: Option<String>,
    /// Password of the private key file.
    pub key_password: Option<Secret>,
    /// Truststore used to verify clients.
    pub trust_store: Option<RawStore>,
    /// Trusted client certificates file.
    pub trust_certificates: Option<String>,
    /// Client verification mode: `require`, `optional` or blank.
    pub verify_client: Option<String>,
    /// Protocol family and versions.
    pub protocol: Option<RawProtocol>,
    /// Enabled cipher suites; empty keeps the acceptor's defaults.
    pub ciphers: Vec<String>,
    /// Certificate validation revocation cache.
    pub cert_validation: Option<RawCache>,
    /// OCSP stapling cache.
    pub ocsp_stapling: Option<RawCache>,
    /// Whether TLS sessions may be resumed; defaults to `true`.
    pub share_session: Option<bool>,
    /// TLS handshake timeout in seconds.
    pub handshake_timeout_secs: Option<u64>,
    /// TLS session lifetime in seconds.
    pub session_timeout_secs: Option<u64>,
}

/// Source of the server's certificate and key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerIdentity {
    /// PKCS12 keystore.
    KeyStore {
        /// Store location.
        path: PathBuf,
        /// Store password.
        password: Secret,
    },
    /// PEM key and certificate files.
    KeyPair {
        /// Private key file.
        key_file: PathBuf,
        /// Certificate chain file.
        cert_file: PathBuf,
        /// Password of an encrypted key.
        key_password: Option<Secret>,
    },
}

/// Material used to verify client certificates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrustMaterial {
    /// PKCS12 truststore.
    TrustStore {
        /// Store location.
        path: PathBuf,
        /// Store password.
        password: Secret,
    },
    /// PEM file of trusted certificates.
    Certificates(PathBuf),
}

/// Whether clients must present a certificate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientVerification {
    /// Client certificates are not requested.
    #[default]
    Off,
    /// Client certificates are requested but not required.
    Optional,
    /// Client certificates are required.
    Require,
}

impl ClientVerification {
    /// Whether mutual TLS is in effect.
    #[must_use]
    pub fn is_enabled(self) -> bool { self != Self::Off }
}

impl FromStr for ClientVerification {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "off" => Ok(Self::Off),
            "optional" => Ok(Self::Optional),
            "require" => Ok(Self::Require),
            _ => Err(ConfigError::InvalidClientVerification(s.to_owned())),
        }
    }
}

/// Enabled TLS protocol family and versions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsProtocol {
    /// Protocol family.
    pub name: String,
    /// Enabled versions.
    pub versions: Vec<String>,
}

/// Size and lifetime of a validation cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum cached entries.
    pub size: u32,
    /// Entry lifetime.
    pub validity_period: Duration,
}

impl CacheSettings {
    fn from_raw(raw: Option<RawCache>) -> Option<Self> {
        raw.filter(|cache| cache.enable).map(|cache| Self {
            size: match cache.cache_size {
                0 => DEFAULT_CACHE_SIZE,
                size => size,
            },
            validity_period: match cache.cache_validity_period_secs {
                0 => DEFAULT_CACHE_VALIDITY,
                secs => Duration::from_secs(secs),
            },
        })
    }
}

/// Validated TLS settings of a secure listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsSettings {
    identity: ServerIdentity,
    trust: Option<TrustMaterial>,
    client_verification: ClientVerification,
    protocol: Option<TlsProtocol>,
    ciphers: Vec<String>,
    cert_validation: Option<CacheSettings>,
    ocsp_stapling: Option<CacheSettings>,
    share_session: bool,
    handshake_timeout: Option<Duration>,
    session_timeout: Option<Duration>,
}

impl TlsSettings {
    /// Server certificate source.
    #[must_use]
    pub fn identity(&self) -> &ServerIdentity { &self.identity }

    /// Client trust material, present only when client verification is on.
    #[must_use]
    pub fn trust(&self) -> Option<&TrustMaterial> { self.trust.as_ref() }

    /// Client verification mode.
    #[must_use]
    pub fn client_verification(&self) -> ClientVerification { self.client_verification }

    /// Protocol restrictions, if any.
    #[must_use]
    pub fn protocol(&self) -> Option<&TlsProtocol> { self.protocol.as_ref() }

    /// Enabled cipher suites.
    #[must_use]
    pub fn ciphers(&self) -> &[String] { &self.ciphers }

    /// Certificate validation cache, if enabled.
    #[must_use]
    pub fn cert_validation(&self) -> Option<CacheSettings> { self.cert_validation }

    /// OCSP stapling cache, if enabled.
    #[must_use]
    pub fn ocsp_stapling(&self) -> Option<CacheSettings> { self.ocsp_stapling }

    /// Whether session resumption is allowed.
    #[must_use]
    pub fn share_session(&self) -> bool { self.share_session }

    /// TLS handshake timeout.
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> { self.handshake_timeout }

    /// TLS session lifetime.
    #[must_use]
    pub fn session_timeout(&self) -> Option<Duration> { self.session_timeout }

    /// Store format used for keystores and truststores.
    #[must_use]
    pub fn store_type(&self) -> &'static str { STORE_TYPE }
}

impl TryFrom<RawTlsConfig> for TlsSettings {
    type Error = ConfigError;

    fn try_from(raw: RawTlsConfig) -> Result<Self, Self::Error> {
        let identity = server_identity(
            raw.key_store,
            non_blank(raw.key_file),
            non_blank(raw.cert_file),
            raw.key_password.filter(|password| !password.is_blank()),
        )?;
        let client_verification = match raw.verify_client.as_deref() {
            Some(mode) => mode.parse()?,
            None => ClientVerification::Off,
        };
        let trust = trust_material(
            raw.trust_store,
            non_blank(raw.trust_certificates),
            client_verification,
        )?;
        Ok(Self {
            identity,
            trust,
            client_verification,
            protocol: raw.protocol.map(|protocol| TlsProtocol {
                name: protocol.name,
                versions: protocol.versions,
            }),
            ciphers: raw.ciphers,
            cert_validation: CacheSettings::from_raw(raw.cert_validation),
            ocsp_stapling: CacheSettings::from_raw(raw.ocsp_stapling),
            share_session: raw.share_session.unwrap_or(true),
            handshake_timeout: raw.handshake_timeout_secs.map(Duration::from_secs),
            session_timeout: raw.session_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn server_identity(
    key_store: Option<RawStore>,
    key_file: Option<String>,
    cert_file: Option<String>,
    key_password: Option<Secret>,
) -> Result<ServerIdentity, ConfigError> {
    if key_store.is_some() && (key_file.is_some() || cert_file.is_some()) {
        return Err(ConfigError::BothIdentitySources);
    }
    match (key_store, key_file) {
        (Some(store), _) => {
            if store.path.trim().is_empty() {
                return Err(ConfigError::MissingKeystorePath);
            }
            if store.password.is_blank() {
                return Err(ConfigError::MissingKeystorePassword);
            }
            Ok(ServerIdentity::KeyStore {
                path: store.path.into(),
                password: store.password,
            })
        }
        (None, Some(key_file)) => {
            let cert_file = cert_file.ok_or(ConfigError::MissingCertFile)?;
            Ok(ServerIdentity::KeyPair {
                key_file: key_file.into(),
                cert_file: cert_file.into(),
                key_password,
            })
        }
        (None, None) => Err(ConfigError::MissingServerIdentity),
    }
}

fn trust_material(
    trust_store: Option<RawStore>,
    trust_certificates: Option<String>,
    verification: ClientVerification,
) -> Result<Option<TrustMaterial>, ConfigError> {
    match (trust_store, trust_certificates) {
        (Some(_), Some(_)) => Err(ConfigError::BothTrustSources),
        _ if !verification.is_enabled() => Ok(None),
        (Some(store), None) => {
            if store.path.trim().is_empty() {
                return Err(ConfigError::MissingTruststorePath);
            }
            if store.password.is_blank() {
                return Err(ConfigError::MissingTruststorePassword);
            }
            Ok(Some(TrustMaterial::TrustStore {
                path: store.path.into(),
                password: store.password,
            }))
        }
        (None, Some(path)) => Ok(Some(TrustMaterial::Certificates(path.into()))),
        (None, None) => Err(ConfigError::MissingTrustMaterial),
    }
}
