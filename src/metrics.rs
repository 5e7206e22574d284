//! Metric helpers for `wsgate`.
//!
//! This module defines metric names and thin wrappers around the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::hooks::EventKind;

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "wsgate_connections_active";
/// Name of the counter tracking dispatched events, labelled by `kind`.
pub const FRAMES_DISPATCHED: &str = "wsgate_frames_dispatched_total";
/// Name of the counter tracking upgrade attempts, labelled by `outcome`.
pub const HANDSHAKES_TOTAL: &str = "wsgate_handshakes_total";
/// Name of the counter tracking failed handlers.
pub const HANDLER_ERRORS_TOTAL: &str = "wsgate_handler_errors_total";

/// Outcome of an upgrade attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeResult {
    /// The connection was opened.
    Accepted,
    /// The request was refused with an HTTP status.
    Rejected,
    /// The transport failed.
    Failed,
}

impl HandshakeResult {
    /// Label value for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a dispatched event.
pub fn inc_frames(kind: EventKind) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DISPATCHED, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record an upgrade attempt.
pub fn inc_handshakes(result: HandshakeResult) {
    #[cfg(feature = "metrics")]
    counter!(HANDSHAKES_TOTAL, "outcome" => result.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = result;
}

/// Record a failed handler.
pub fn inc_handler_errors() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_ERRORS_TOTAL).increment(1);
}
