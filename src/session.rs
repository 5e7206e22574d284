//! Registry of open WebSocket connections.
//!
//! [`ConnectionManager`] maps transport-assigned [`ConnectionId`]s to the
//! [`OpenConnectionInfo`] created when a handshake completes. Entries live
//! from handshake completion until the first close or error event for the
//! connection is dispatched. The map is sharded, so connections touching
//! different ids never contend on a single lock.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

use crate::{push::OutboundQueue, service::WebSocketService, transport::TransportConnection};

/// Identifier assigned to a connection by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Errors raised by [`ConnectionManager`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The transport reported an id that is already registered.
    #[error("{0} is already registered")]
    DuplicateConnection(ConnectionId),
}

/// State tracked for a connection between handshake and close.
pub struct OpenConnectionInfo {
    id: ConnectionId,
    service: Arc<WebSocketService>,
    transport: Arc<dyn TransportConnection>,
    negotiated_sub_protocol: Option<String>,
    secure: bool,
    ready: AtomicBool,
    open: AtomicBool,
    close_requested: AtomicBool,
    outbound: OutboundQueue,
}

impl OpenConnectionInfo {
    /// Build the state for a freshly upgraded connection.
    ///
    /// The connection starts open and not yet ready for reading.
    #[must_use]
    pub fn new(
        service: Arc<WebSocketService>,
        transport: Arc<dyn TransportConnection>,
        negotiated_sub_protocol: Option<String>,
        secure: bool,
    ) -> Self {
        Self {
            id: transport.id(),
            service,
            transport,
            negotiated_sub_protocol,
            secure,
            ready: AtomicBool::new(false),
            open: AtomicBool::new(true),
            close_requested: AtomicBool::new(false),
            outbound: OutboundQueue::default(),
        }
    }

    /// Identifier assigned by the transport.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Service bound to this connection during the handshake.
    #[must_use]
    pub fn service(&self) -> &Arc<WebSocketService> { &self.service }

    /// Transport handle backing this connection.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn TransportConnection> { &self.transport }

    /// Sub-protocol agreed during the handshake, if any.
    #[must_use]
    pub fn negotiated_sub_protocol(&self) -> Option<&str> {
        self.negotiated_sub_protocol.as_deref()
    }

    /// Whether the connection was accepted over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool { self.secure }

    /// Whether the first inbound frame read has been triggered.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }

    /// Whether the connection is still open.
    ///
    /// Cleared when a close or error event is dispatched, or when the
    /// transport itself reports the socket closed.
    #[must_use]
    pub fn is_open(&self) -> bool { self.open.load(Ordering::Acquire) && self.transport.is_open() }

    /// Whether the local side has asked to close the connection.
    #[must_use]
    pub fn is_close_requested(&self) -> bool { self.close_requested.load(Ordering::Acquire) }

    /// Flip the ready flag.
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// the caller holding `true` is the single party allowed to trigger the
    /// first frame read.
    pub fn mark_ready(&self) -> bool {
        self.ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the open flag once the connection has terminated.
    ///
    /// Writes already queued are still attempted; later ones are refused.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
        self.outbound.shut();
    }

    /// Write queue preserving the call order of outbound frames.
    pub(crate) fn outbound(&self) -> &OutboundQueue { &self.outbound }

    /// Record that a local close was requested.
    ///
    /// Returns `true` if this is the first request.
    pub fn mark_close_requested(&self) -> bool {
        !self.close_requested.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for OpenConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenConnectionInfo")
            .field("id", &self.id)
            .field("service", &self.service.base_path())
            .field("negotiated_sub_protocol", &self.negotiated_sub_protocol)
            .field("secure", &self.secure)
            .field("ready", &self.is_ready())
            .field("open", &self.open.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Concurrent registry of open connections keyed by [`ConnectionId`].
///
/// Each listener owns its own manager; there is no process-wide instance.
#[derive(Default)]
pub struct ConnectionManager(DashMap<ConnectionId, Arc<OpenConnectionInfo>>);

impl ConnectionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Publish a newly opened connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateConnection`] if an entry already
    /// exists for the connection's id. The existing entry is left untouched.
    pub fn add(&self, info: Arc<OpenConnectionInfo>) -> Result<(), SessionError> {
        match self.0.entry(info.id()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateConnection(info.id())),
            Entry::Vacant(slot) => {
                slot.insert(info);
                crate::metrics::inc_connections();
                Ok(())
            }
        }
    }

    /// Look up the state for `id` if the connection is registered.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<OpenConnectionInfo>> {
        self.0.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return the entry for `id`.
    ///
    /// Calling this for an id that was already removed returns `None`.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<OpenConnectionInfo>> {
        let removed = self.0.remove(id).map(|(_, info)| info);
        if removed.is_some() {
            crate::metrics::dec_connections();
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` when no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Snapshot of the registered connection ids.
    ///
    /// Holds per-shard read locks while iterating.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> { self.0.iter().map(|entry| *entry.key()).collect() }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.0.len())
            .finish()
    }
}
