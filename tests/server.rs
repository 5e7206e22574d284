//! End-to-end tests running a listener and a real WebSocket client.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use wsgate::{
    ConnectionError,
    OutboundFrame,
    TransportError,
    WebSocketEndpoint,
    WebSocketService,
    config::ListenerConfigBuilder,
    server::{ServerError, WebSocketServer},
};
use wsgate_testing::eventually;

mod common;
use common::{CallLog, TestResult, unused_listener};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    endpoint: Arc<WebSocketEndpoint>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    async fn start(service: WebSocketService) -> TestResult<Self> {
        let listener = unused_listener();
        let addr = listener.local_addr()?;
        let config = ListenerConfigBuilder::new()
            .host("127.0.0.1")
            .port(addr.port())
            .build()?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let server = WebSocketServer::new(config)
            .workers(2)
            .service(service)?
            .ready_signal(ready_tx)
            .bind_listener(listener)?;
        let endpoint = Arc::clone(server.endpoint());
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        ready_rx.await?;
        Ok(Self {
            addr,
            endpoint,
            stop,
            handle,
        })
    }

    async fn connect(&self, path: &str) -> TestResult<Client> {
        let (client, _) = connect_async(format!("ws://{}{path}", self.addr)).await?;
        Ok(client)
    }

    async fn stop(self) -> TestResult {
        let _ = self.stop.send(());
        timeout(Duration::from_secs(2), self.handle).await???;
        Ok(())
    }
}

async fn next_message(client: &mut Client) -> TestResult<Message> {
    Ok(timeout(Duration::from_secs(3), client.next())
        .await?
        .ok_or("stream ended")??)
}

#[tokio::test]
async fn negotiated_protocol_is_written_to_response() -> TestResult {
    let server = Running::start(
        WebSocketService::builder("chat")
            .sub_protocols(["v1", "v2"])
            .on_open(|conn| async move {
                let protocol = conn.negotiated_sub_protocol().unwrap_or("none").to_owned();
                conn.push_text(protocol).await?;
                Ok(())
            })
            .build(),
    )
    .await?;

    let mut request = format!("ws://{}/chat", server.addr).into_client_request()?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("v2, v3"));
    let (mut client, response) = connect_async(request).await?;
    assert_eq!(
        response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok()),
        Some("v2")
    );
    assert_eq!(next_message(&mut client).await?, Message::Text("v2".into()));
    server.stop().await
}

#[tokio::test]
async fn fragments_are_reassembled_by_the_client() -> TestResult {
    let server = Running::start(
        WebSocketService::builder("frag")
            .on_open(|conn| async move {
                conn.push(OutboundFrame::Text("hel".into()), false).await?;
                conn.push(OutboundFrame::Text("lo".into()), true).await?;
                conn.push_binary(vec![1u8, 2, 3]).await?;
                Ok(())
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/frag").await?;
    assert_eq!(next_message(&mut client).await?, Message::Text("hello".into()));
    assert_eq!(next_message(&mut client).await?, Message::Binary(vec![1, 2, 3]));
    server.stop().await
}

#[tokio::test]
async fn oversized_message_closes_with_1009() -> TestResult {
    let log = CallLog::default();
    let calls = log.clone();
    let server = Running::start(
        WebSocketService::builder("small")
            .max_frame_size(16)
            .on_error(move |_, error| {
                let calls = calls.clone();
                async move {
                    if let ConnectionError::Transport(TransportError::FrameTooLarge { size, max }) =
                        error
                    {
                        calls.push(format!("{size}/{max}"));
                    }
                    Ok(())
                }
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/small").await?;
    client.send(Message::Text("x".repeat(32))).await?;
    let Message::Close(Some(frame)) = next_message(&mut client).await? else {
        return Err("expected close frame".into());
    };
    assert_eq!(frame.code, CloseCode::Size);
    assert!(eventually(|| log.entries() == ["32/16"]).await);
    assert!(eventually(|| server.endpoint.connections().is_empty()).await);
    server.stop().await
}

#[tokio::test]
async fn frame_limit_above_transport_default_is_honoured() -> TestResult {
    const LIMIT: i64 = 32 * 1024 * 1024;
    const SIZE: usize = 20 * 1024 * 1024;
    let log = CallLog::default();
    let calls = log.clone();
    let server = Running::start(
        WebSocketService::builder("bulk")
            .max_frame_size(LIMIT)
            .on_binary(move |_, data, _| {
                let calls = calls.clone();
                async move {
                    calls.push(format!("binary:{}", data.len()));
                    Ok(())
                }
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/bulk").await?;
    client.send(Message::Binary(vec![7; SIZE])).await?;
    let delivered = timeout(Duration::from_secs(10), async {
        while log.count(&format!("binary:{SIZE}")) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "message was not delivered: {:?}", log.entries());
    assert_eq!(server.endpoint.connections().len(), 1);
    server.stop().await
}

#[tokio::test]
async fn client_close_reaches_on_close() -> TestResult {
    let log = CallLog::default();
    let calls = log.clone();
    let server = Running::start(
        WebSocketService::builder("bye")
            .on_close(move |_, frame| {
                let calls = calls.clone();
                async move {
                    calls.push(format!("{}:{}", frame.code, frame.reason));
                    Ok(())
                }
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/bye").await?;
    assert!(eventually(|| server.endpoint.connections().len() == 1).await);
    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "done".into(),
        }))
        .await?;
    assert!(eventually(|| log.entries() == ["1000:done"]).await);
    assert!(server.endpoint.connections().is_empty());
    server.stop().await
}

#[tokio::test]
async fn idle_connection_is_closed_by_handler() -> TestResult {
    let server = Running::start(
        WebSocketService::builder("idle")
            .idle_timeout_secs(1)
            .on_idle_timeout(|conn| async move {
                conn.close(1000, "Idle timeout").await?;
                Ok(())
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/idle").await?;
    let Message::Close(Some(frame)) = next_message(&mut client).await? else {
        return Err("expected close frame".into());
    };
    assert_eq!(frame.code, CloseCode::Normal);
    assert_eq!(frame.reason, "Idle timeout");
    server.stop().await
}

#[tokio::test]
async fn ping_handler_sees_payload() -> TestResult {
    let log = CallLog::default();
    let calls = log.clone();
    let server = Running::start(
        WebSocketService::builder("ping")
            .on_ping(move |_, data| {
                let calls = calls.clone();
                async move {
                    calls.push(String::from_utf8_lossy(&data).into_owned());
                    Ok(())
                }
            })
            .build(),
    )
    .await?;

    let mut client = server.connect("/ping").await?;
    client.send(Message::Ping(b"tick".to_vec())).await?;
    assert_eq!(next_message(&mut client).await?, Message::Pong(b"tick".to_vec()));
    assert!(eventually(|| log.entries() == ["tick"]).await);
    server.stop().await
}
