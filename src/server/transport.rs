//! [`Handshaker`] and [`TransportConnection`] backed by `tokio-tungstenite`.
//!
//! Each upgraded socket is split in two. The write half sits behind an
//! async mutex inside [`TungsteniteConnection`]; the read half is owned by
//! a reader task that starts once the engine has registered the connection,
//! releases one inbound frame per [`TransportConnection::read_next_frame`]
//! call and raises idle events while it waits.

use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    select,
    sync::{Mutex, Semaphore},
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream,
    accept_hdr_async_with_config,
    tungstenite::{
        self,
        Message,
        error::CapacityError,
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderName, HeaderValue, StatusCode},
        protocol::{
            CloseFrame as WsCloseFrame,
            WebSocketConfig,
            frame::{
                Frame,
                coding::{CloseCode, Data, OpCode},
            },
        },
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, trace, warn};

use super::BoxedStream;
use crate::{
    error::TransportError,
    handshake::negotiate_sub_protocol,
    session::ConnectionId,
    transport::{
        CloseFrame,
        EventSink,
        HandshakeOutcome,
        HandshakeParams,
        Handshaker,
        Rejection,
        TransportConnection,
        TransportEvent,
        UpgradeRequest,
        UpgradeSelector,
        close_code,
    },
};

const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";
const GOING_AWAY_REASON: &str = "Server shutting down";
/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: usize = 125;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<BoxedStream>;

/// Performs the HTTP upgrade on an accepted stream.
pub struct TungsteniteHandshaker {
    stream: BoxedStream,
    sink: Arc<dyn EventSink>,
    secure: bool,
    max_message_size: Option<usize>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TungsteniteHandshaker {
    /// Create a handshaker that reports inbound events to `sink`.
    #[must_use]
    pub fn new(stream: BoxedStream, sink: Arc<dyn EventSink>) -> Self {
        Self {
            stream,
            sink,
            secure: false,
            max_message_size: None,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Mark the stream as running over TLS.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Cap inbound frames and assembled messages at `limit` bytes while
    /// reading from the socket.
    ///
    /// Pass the largest frame size of the services that may be selected;
    /// each service's own limit is enforced per message afterwards.
    #[must_use]
    pub fn max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Close the connection with status 1001 once `shutdown` is cancelled and
    /// run its reader task on `tracker`.
    #[must_use]
    pub fn shutdown(mut self, shutdown: CancellationToken, tracker: TaskTracker) -> Self {
        self.shutdown = shutdown;
        self.tracker = tracker;
        self
    }
}

impl std::fmt::Debug for TungsteniteHandshaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteHandshaker")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handshaker for TungsteniteHandshaker {
    async fn handshake(
        self: Box<Self>,
        select: UpgradeSelector<'_>,
    ) -> Result<HandshakeOutcome, TransportError> {
        let Self {
            stream,
            sink,
            secure,
            max_message_size,
            shutdown,
            tracker,
        } = *self;
        let accepted: OnceLock<(HandshakeParams, Option<String>)> = OnceLock::new();
        let refused: OnceLock<Rejection> = OnceLock::new();

        let callback = |request: &Request, response: Response| {
            answer_upgrade(&upgrade_request(request), response, select, &accepted, &refused)
        };
        let ws = match accept_hdr_async_with_config(stream, callback, ws_config(max_message_size)).await {
            Ok(ws) => ws,
            Err(e) => {
                return Err(match refused.into_inner() {
                    Some(Rejection { status, reason }) => TransportError::Rejected { status, reason },
                    None => TransportError::Handshake(e.to_string()),
                });
            }
        };
        let Some((params, negotiated_sub_protocol)) = accepted.into_inner() else {
            return Err(TransportError::Handshake(
                "upgrade completed without handshake parameters".to_owned(),
            ));
        };

        let (write, read) = ws.split();
        let connection = Arc::new(TungsteniteConnection::new(
            ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            write,
        ));
        debug!(
            connection_id = %connection.id(),
            sub_protocol = ?negotiated_sub_protocol,
            idle_timeout = ?params.idle_timeout,
            max_frame_size = params.max_frame_size,
            "websocket upgrade completed"
        );
        let reader = Reader {
            connection: Arc::clone(&connection),
            stream: read,
            sink,
            idle_timeout: params.idle_timeout,
            max_frame_size: params.max_frame_size,
            shutdown,
        };
        tracker.spawn(reader.run());

        Ok(HandshakeOutcome {
            connection,
            negotiated_sub_protocol,
            secure,
        })
    }
}

fn ws_config(max_message_size: Option<usize>) -> Option<WebSocketConfig> {
    max_message_size.map(|limit| {
        let limit = limit.max(MAX_CONTROL_PAYLOAD);
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(limit);
        config.max_frame_size = Some(limit);
        config
    })
}

fn upgrade_request(request: &Request) -> UpgradeRequest {
    let path = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_owned(), ToString::to_string);
    let sub_protocols: Vec<String> = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|protocol| !protocol.is_empty())
        .map(str::to_owned)
        .collect();
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect();
    UpgradeRequest {
        path,
        requested_sub_protocols: sub_protocols,
        headers,
    }
}

fn answer_upgrade(
    request: &UpgradeRequest,
    mut response: Response,
    select: UpgradeSelector<'_>,
    accepted: &OnceLock<(HandshakeParams, Option<String>)>,
    refused: &OnceLock<Rejection>,
) -> Result<Response, ErrorResponse> {
    match select(request) {
        Ok(params) => {
            let negotiated =
                negotiate_sub_protocol(&params.sub_protocols, &request.requested_sub_protocols)
                    .map(str::to_owned);
            let headers = response.headers_mut();
            if let Some(protocol) = &negotiated
                && let Ok(value) = HeaderValue::from_str(protocol)
            {
                headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
            }
            for (name, value) in &params.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => warn!(header = %name, "skipping invalid response header"),
                }
            }
            let _ = accepted.set((params, negotiated));
            Ok(response)
        }
        Err(rejection) => {
            let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::BAD_REQUEST);
            let mut error = ErrorResponse::new(Some(rejection.reason.clone()));
            *error.status_mut() = status;
            let _ = refused.set(rejection);
            Err(error)
        }
    }
}

struct Outbound {
    sink: SplitSink<WsStream, Message>,
    fragmenting: bool,
}

/// Write half and flow control of an upgraded tungstenite socket.
pub struct TungsteniteConnection {
    id: ConnectionId,
    outbound: Mutex<Outbound>,
    reads: Semaphore,
    open: AtomicBool,
    registered: CancellationToken,
    closed: CancellationToken,
    sent_close: OnceLock<CloseFrame>,
}

impl TungsteniteConnection {
    fn new(id: ConnectionId, sink: SplitSink<WsStream, Message>) -> Self {
        Self {
            id,
            outbound: Mutex::new(Outbound {
                sink,
                fragmenting: false,
            }),
            reads: Semaphore::new(0),
            open: AtomicBool::new(true),
            registered: CancellationToken::new(),
            closed: CancellationToken::new(),
            sent_close: OnceLock::new(),
        }
    }

    async fn send_data(&self, payload: Vec<u8>, data: Data, is_final: bool) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut outbound = self.outbound.lock().await;
        let message = match (outbound.fragmenting, is_final) {
            (false, true) => match data {
                Data::Text => Message::Text(
                    String::from_utf8(payload).map_err(|e| TransportError::Protocol(e.to_string()))?,
                ),
                _ => Message::Binary(payload),
            },
            (fragmenting, _) => {
                let opcode = if fragmenting { Data::Continue } else { data };
                Message::Frame(Frame::message(payload, OpCode::Data(opcode), is_final))
            }
        };
        outbound.fragmenting = !is_final;
        outbound.sink.send(message).await.map_err(map_ws_error)
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut outbound = self.outbound.lock().await;
        outbound.sink.send(message).await.map_err(map_ws_error)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
        self.reads.close();
    }
}

impl std::fmt::Debug for TungsteniteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransportConnection for TungsteniteConnection {
    fn id(&self) -> ConnectionId { self.id }

    fn is_open(&self) -> bool { self.open.load(Ordering::Acquire) }

    async fn push_text(&self, text: String, is_final: bool) -> Result<(), TransportError> {
        self.send_data(text.into_bytes(), Data::Text, is_final).await
    }

    async fn push_binary(&self, data: Bytes, is_final: bool) -> Result<(), TransportError> {
        self.send_data(data.to_vec(), Data::Binary, is_final).await
    }

    async fn push_ping(&self, data: Bytes) -> Result<(), TransportError> {
        self.send(Message::Ping(data.to_vec())).await
    }

    async fn push_pong(&self, data: Bytes) -> Result<(), TransportError> {
        self.send(Message::Pong(data.to_vec())).await
    }

    async fn close(&self, frame: CloseFrame) -> Result<(), TransportError> {
        let _ = self.sent_close.set(frame.clone());
        self.send(Message::Close(Some(to_ws_close(frame)))).await
    }

    fn registered(&self) { self.registered.cancel(); }

    fn read_next_frame(&self) {
        if self.is_open() {
            self.reads.add_permits(1);
        }
    }

    async fn terminate(&self, frame: CloseFrame) -> Result<(), TransportError> {
        let _ = self.sent_close.set(frame.clone());
        let result = {
            let mut outbound = self.outbound.lock().await;
            let sent = outbound
                .sink
                .send(Message::Close(Some(to_ws_close(frame))))
                .await;
            let _ = outbound.sink.close().await;
            sent.map_err(map_ws_error)
        };
        self.mark_closed();
        self.closed.cancel();
        result
    }
}

fn to_ws_close(frame: CloseFrame) -> WsCloseFrame<'static> {
    WsCloseFrame {
        code: CloseCode::from(frame.code),
        reason: frame.reason.into(),
    }
}

fn map_ws_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Io(e) => TransportError::Io(e),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::FrameTooLarge { size, max: max_size }
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

enum Wake {
    Permitted,
    Shutdown,
    Terminated,
    Idle,
    Inbound(Option<Result<Message, tungstenite::Error>>),
}

/// Owns the read half of one connection.
struct Reader {
    connection: Arc<TungsteniteConnection>,
    stream: SplitStream<WsStream>,
    sink: Arc<dyn EventSink>,
    idle_timeout: Option<Duration>,
    max_frame_size: usize,
    shutdown: CancellationToken,
}

impl Reader {
    async fn run(mut self) {
        // Events for an unregistered id would be dropped.
        select! {
            biased;

            () = self.connection.closed.cancelled() => {
                self.connection.mark_closed();
                trace!(connection_id = %self.connection.id(), "terminated before registration");
                return;
            }
            () = self.connection.registered.cancelled() => {}
        }
        loop {
            let permitted = select! {
                biased;

                () = self.shutdown.cancelled() => Wake::Shutdown,
                () = self.connection.closed.cancelled() => Wake::Terminated,
                permit = self.connection.reads.acquire() => match permit {
                    Ok(permit) => {
                        permit.forget();
                        Wake::Permitted
                    }
                    Err(_) => Wake::Terminated,
                },
            };
            let flow = match permitted {
                Wake::Permitted => self.read_one().await,
                wake => self.stop(wake).await,
            };
            if flow.is_break() {
                break;
            }
        }
        self.connection.mark_closed();
        trace!(connection_id = %self.connection.id(), "reader finished");
    }

    /// Wait for one frame, raising an idle event per idle period.
    async fn read_one(&mut self) -> ControlFlow<()> {
        loop {
            let wake = select! {
                biased;

                () = self.shutdown.cancelled() => Wake::Shutdown,
                () = self.connection.closed.cancelled() => Wake::Terminated,
                next = next_within(&mut self.stream, self.idle_timeout) => {
                    next.map_or(Wake::Idle, Wake::Inbound)
                }
            };
            match wake {
                Wake::Idle => self.deliver(TransportEvent::IdleTimeout {
                    id: self.connection.id(),
                }),
                Wake::Inbound(next) => return self.inbound(next).await,
                wake => return self.stop(wake).await,
            }
        }
    }

    async fn inbound(&mut self, next: Option<Result<Message, tungstenite::Error>>) -> ControlFlow<()> {
        let id = self.connection.id();
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }))) => {
                return self.too_big(size, max_size).await;
            }
            Some(Err(e)) => {
                self.connection.mark_closed();
                self.deliver(TransportEvent::Error {
                    id,
                    error: map_ws_error(e),
                });
                return ControlFlow::Break(());
            }
            None => {
                self.connection.mark_closed();
                let frame = self
                    .connection
                    .sent_close
                    .get()
                    .cloned()
                    .unwrap_or_else(|| CloseFrame::new(close_code::ABNORMAL, ""));
                self.deliver(TransportEvent::Close { id, frame });
                return ControlFlow::Break(());
            }
        };

        let size = message.len();
        if size > self.max_frame_size && !matches!(message, Message::Close(_)) {
            return self.too_big(size, self.max_frame_size).await;
        }

        let event = match message {
            Message::Text(data) => TransportEvent::Text {
                id,
                data,
                is_final: true,
            },
            Message::Binary(data) => TransportEvent::Binary {
                id,
                data: Bytes::from(data),
                is_final: true,
            },
            Message::Ping(data) => {
                // Flush the automatic pong.
                let _ = self.connection.outbound.lock().await.sink.flush().await;
                TransportEvent::Ping {
                    id,
                    data: Bytes::from(data),
                }
            }
            Message::Pong(data) => TransportEvent::Pong {
                id,
                data: Bytes::from(data),
            },
            Message::Close(frame) => {
                self.connection.mark_closed();
                // Flush the close reply.
                let _ = self.connection.outbound.lock().await.sink.flush().await;
                let frame = frame.map_or_else(
                    || CloseFrame::new(close_code::NO_STATUS, ""),
                    |f| CloseFrame::new(u16::from(f.code), f.reason.into_owned()),
                );
                self.deliver(TransportEvent::Close { id, frame });
                return ControlFlow::Break(());
            }
            Message::Frame(_) => {
                self.connection.read_next_frame();
                return ControlFlow::Continue(());
            }
        };
        self.deliver(event);
        ControlFlow::Continue(())
    }

    /// Report an oversized message and close with 1009.
    async fn too_big(&mut self, size: usize, max: usize) -> ControlFlow<()> {
        let id = self.connection.id();
        self.deliver(TransportEvent::Error {
            id,
            error: TransportError::FrameTooLarge { size, max },
        });
        let _ = self
            .connection
            .terminate(CloseFrame::new(close_code::TOO_BIG, "Message too big"))
            .await;
        ControlFlow::Break(())
    }

    async fn stop(&mut self, wake: Wake) -> ControlFlow<()> {
        let id = self.connection.id();
        let frame = match wake {
            Wake::Shutdown => {
                let frame = CloseFrame::new(close_code::GOING_AWAY, GOING_AWAY_REASON);
                if let Err(e) = self.connection.terminate(frame.clone()).await {
                    trace!(connection_id = %id, error = %e, "close on shutdown failed");
                }
                frame
            }
            _ => self
                .connection
                .sent_close
                .get()
                .cloned()
                .unwrap_or_else(|| CloseFrame::new(close_code::ABNORMAL, "")),
        };
        self.deliver(TransportEvent::Close { id, frame });
        ControlFlow::Break(())
    }

    fn deliver(&self, event: TransportEvent) { self.sink.deliver(event); }
}

/// Next inbound item, or `None` when `idle` elapses first.
async fn next_within(
    stream: &mut SplitStream<WsStream>,
    idle: Option<Duration>,
) -> Option<Option<Result<Message, tungstenite::Error>>> {
    match idle {
        Some(period) => timeout(period, stream.next()).await.ok(),
        None => Some(stream.next().await),
    }
}
