//! HTTP-level limits and connection policies of a listener.

use std::str::FromStr;

use serde::Deserialize;

use super::ConfigError;

/// Size limits configured as raw integers, `-1` meaning unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawRequestLimits {
    /// Longest accepted request target.
    pub max_uri_length: i64,
    /// Largest accepted header block.
    pub max_header_size: i64,
    /// Largest accepted request body.
    pub max_entity_body_size: i64,
}

impl Default for RawRequestLimits {
    fn default() -> Self {
        Self {
            max_uri_length: -1,
            max_header_size: -1,
            max_entity_body_size: -1,
        }
    }
}

/// Validated request size limits. `None` means no limit is enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestLimits {
    max_uri_length: Option<usize>,
    max_header_size: Option<usize>,
    max_entity_body_size: Option<usize>,
}

impl RequestLimits {
    /// Longest accepted request target in bytes.
    #[must_use]
    pub fn max_uri_length(&self) -> Option<usize> { self.max_uri_length }

    /// Largest accepted header block in bytes.
    #[must_use]
    pub fn max_header_size(&self) -> Option<usize> { self.max_header_size }

    /// Largest accepted request body in bytes.
    #[must_use]
    pub fn max_entity_body_size(&self) -> Option<usize> { self.max_entity_body_size }
}

impl TryFrom<RawRequestLimits> for RequestLimits {
    type Error = ConfigError;

    fn try_from(raw: RawRequestLimits) -> Result<Self, Self::Error> {
        Ok(Self {
            max_uri_length: limit("max_uri_length", raw.max_uri_length)?,
            max_header_size: limit("max_header_size", raw.max_header_size)?,
            max_entity_body_size: limit("max_entity_body_size", raw.max_entity_body_size)?,
        })
    }
}

fn limit(field: &'static str, value: i64) -> Result<Option<usize>, ConfigError> {
    match value {
        -1 => Ok(None),
        v if v < 0 => Err(ConfigError::InvalidRequestLimit { field, value }),
        v => usize::try_from(v)
            .map(Some)
            .map_err(|_| ConfigError::InvalidRequestLimit { field, value }),
    }
}

/// Keep-alive policy for the underlying HTTP connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeepAlive {
    /// Follow the client's request.
    #[default]
    Auto,
    /// Always keep the connection alive.
    Always,
    /// Close after each exchange.
    Never,
}

impl FromStr for KeepAlive {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "ALWAYS" => Ok(Self::Always),
            "NEVER" => Ok(Self::Never),
            _ => Err(ConfigError::InvalidKeepAlive(s.to_owned())),
        }
    }
}

/// HTTP pipelining policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pipelining {
    enabled: bool,
    limit: u32,
}

impl Pipelining {
    pub(super) fn new(enabled: bool, limit: i64, secure: bool) -> Result<Self, ConfigError> {
        if !enabled || secure {
            return Ok(Self {
                enabled: false,
                limit: 0,
            });
        }
        let limit = u32::try_from(limit)
            .ok()
            .filter(|limit| *limit >= 1)
            .ok_or(ConfigError::InvalidPipeliningLimit(limit))?;
        Ok(Self {
            enabled: true,
            limit,
        })
    }

    /// Whether pipelined requests are processed.
    #[must_use]
    pub fn is_enabled(&self) -> bool { self.enabled }

    /// Maximum number of requests in flight, `0` when disabled.
    #[must_use]
    pub fn limit(&self) -> u32 { self.limit }
}
