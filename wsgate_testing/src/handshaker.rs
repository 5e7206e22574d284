//! Scripted [`Handshaker`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wsgate::{
    TransportError,
    handshake::negotiate_sub_protocol,
    transport::{HandshakeOutcome, HandshakeParams, Handshaker, UpgradeRequest, UpgradeSelector},
};

use crate::MockConnection;

/// Parameters the engine answered the upgrade with.
pub type RecordedParams = Arc<Mutex<Option<HandshakeParams>>>;

/// Handshaker that replays a fixed upgrade request.
#[derive(Debug)]
pub struct MockHandshaker {
    request: UpgradeRequest,
    connection: Arc<MockConnection>,
    secure: bool,
    failure: Option<String>,
    params: RecordedParams,
}

impl MockHandshaker {
    /// Upgrade request for `path` producing a connection with `id`.
    ///
    /// Returns the handshaker and the connection it will hand out.
    #[must_use]
    pub fn new(id: u64, path: &str) -> (Self, Arc<MockConnection>) {
        let connection = Arc::new(MockConnection::new(id));
        let handshaker = Self {
            request: UpgradeRequest::new(path),
            connection: Arc::clone(&connection),
            secure: false,
            failure: None,
            params: Arc::default(),
        };
        (handshaker, connection)
    }

    /// Sub-protocols listed by the client.
    #[must_use]
    pub fn sub_protocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.request = self.request.with_sub_protocols(protocols);
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    /// Report the connection as running over TLS.
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Fail the upgrade after the selector accepted it.
    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_owned());
        self
    }

    /// Slot receiving the parameters the engine selected.
    #[must_use]
    pub fn params(&self) -> RecordedParams { Arc::clone(&self.params) }
}

#[async_trait]
impl Handshaker for MockHandshaker {
    async fn handshake(
        self: Box<Self>,
        select: UpgradeSelector<'_>,
    ) -> Result<HandshakeOutcome, TransportError> {
        let params = select(&self.request).map_err(|rejection| TransportError::Rejected {
            status: rejection.status,
            reason: rejection.reason,
        })?;
        let negotiated =
            negotiate_sub_protocol(&params.sub_protocols, &self.request.requested_sub_protocols)
                .map(str::to_owned);
        if let Ok(mut slot) = self.params.lock() {
            *slot = Some(params);
        }
        if let Some(message) = self.failure {
            return Err(TransportError::Handshake(message));
        }
        Ok(HandshakeOutcome {
            connection: self.connection,
            negotiated_sub_protocol: negotiated,
            secure: self.secure,
        })
    }
}
