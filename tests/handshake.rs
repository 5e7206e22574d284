//! Tests for upgrade orchestration through a [`WebSocketEndpoint`].

use std::{sync::Arc, time::Duration};

use rstest::rstest;
use tokio::sync::Notify;
use wsgate::{
    HandlerError,
    WebSocketEndpoint,
    WebSocketService,
    handshake::{HandshakeError, HandshakeSettings},
    session::SessionError,
    transport::{TransportConnection, close_code},
};
use wsgate_testing::{MockHandshaker, eventually, upgrade_expect};

mod common;
use common::{CallLog, TestResult, endpoint};

#[rstest]
#[tokio::test]
async fn negotiates_first_client_protocol_the_service_offers(
    endpoint: WebSocketEndpoint,
) -> TestResult {
    endpoint.attach(
        WebSocketService::builder("chat")
            .sub_protocols(["v1", "v2"])
            .build(),
    )?;
    let (handshaker, transport) = MockHandshaker::new(1, "/chat");
    let conn = upgrade_expect!(endpoint, handshaker.sub_protocols(["v2", "v3"]));

    assert_eq!(conn.negotiated_sub_protocol(), Some("v2"));
    assert_eq!(conn.id(), transport.id());
    assert!(transport.is_registered());
    let info = endpoint.connections().get(&conn.id()).ok_or("connection registered")?;
    assert_eq!(info.negotiated_sub_protocol(), Some("v2"));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn no_overlap_leaves_protocol_unset(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").sub_protocols(["v1"]).build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat");
    let conn = upgrade_expect!(endpoint, handshaker.sub_protocols(["v9"]));
    assert_eq!(conn.negotiated_sub_protocol(), None);
    Ok(())
}

#[rstest]
#[case(0)]
#[case(-5)]
#[tokio::test]
async fn non_positive_frame_size_uses_default(
    endpoint: WebSocketEndpoint,
    #[case] size: i64,
) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").max_frame_size(size).build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat");
    let params = handshaker.params();
    upgrade_expect!(endpoint, handshaker);

    let params = params.lock().map_err(|_| "poisoned")?.clone().ok_or("params recorded")?;
    assert_eq!(params.max_frame_size, 65_536);
    Ok(())
}

#[rstest]
#[case(0, Some(30))]
#[case(5, Some(5))]
#[tokio::test]
async fn idle_timeout_falls_back_to_listener(
    #[case] service_secs: u64,
    #[case] expected_secs: Option<u64>,
) -> TestResult {
    let endpoint = WebSocketEndpoint::new(HandshakeSettings {
        default_idle_timeout: Some(Duration::from_secs(30)),
        ..HandshakeSettings::default()
    });
    endpoint.attach(
        WebSocketService::builder("chat")
            .idle_timeout_secs(service_secs)
            .build(),
    )?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat");
    let params = handshaker.params();
    upgrade_expect!(endpoint, handshaker);

    let params = params.lock().map_err(|_| "poisoned")?.clone().ok_or("params recorded")?;
    assert_eq!(params.idle_timeout, expected_secs.map(Duration::from_secs));
    assert!(params.headers.iter().any(|(name, _)| name == "Server"));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unknown_path_is_rejected_with_404(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, transport) = MockHandshaker::new(1, "/nowhere");
    let err = endpoint
        .upgrade(Box::new(handshaker))
        .await
        .expect_err("no service for path");

    assert!(matches!(err, HandshakeError::NoService { ref path } if path == "/nowhere"));
    assert!(endpoint.connections().is_empty());
    assert_eq!(transport.reads(), 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn query_string_is_ignored_when_resolving(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat/?room=7");
    let conn = upgrade_expect!(endpoint, handshaker);
    assert_eq!(conn.service().base_path(), "/chat");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn long_request_target_is_rejected_with_414() -> TestResult {
    let endpoint = WebSocketEndpoint::new(HandshakeSettings {
        max_uri_length: Some(8),
        ..HandshakeSettings::default()
    });
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat?query=long");
    let err = endpoint
        .upgrade(Box::new(handshaker))
        .await
        .expect_err("uri too long");
    assert!(matches!(err, HandshakeError::Rejected { status: 414, .. }));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn transport_failure_leaves_no_connection(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat");
    let err = endpoint
        .upgrade(Box::new(handshaker.failing("socket reset")))
        .await
        .expect_err("transport failed");
    assert!(matches!(err, HandshakeError::Transport(_)));
    assert!(endpoint.connections().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn duplicate_connection_id_is_terminated(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (first, _) = MockHandshaker::new(9, "/chat");
    upgrade_expect!(endpoint, first);
    let (second, transport) = MockHandshaker::new(9, "/chat");
    let err = endpoint
        .upgrade(Box::new(second))
        .await
        .expect_err("duplicate id");

    assert!(matches!(
        err,
        HandshakeError::Session(SessionError::DuplicateConnection(_))
    ));
    assert_eq!(
        transport.terminated_with().map(|frame| frame.code),
        Some(close_code::UNEXPECTED_CONDITION)
    );
    assert!(!transport.is_registered());
    assert_eq!(endpoint.connections().len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unbound_on_open_requests_first_read_immediately(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, transport) = MockHandshaker::new(1, "/chat");
    let conn = upgrade_expect!(endpoint, handshaker);
    assert_eq!(transport.reads(), 1);
    conn.ready();
    assert_eq!(transport.reads(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn first_read_waits_for_on_open(endpoint: WebSocketEndpoint) -> TestResult {
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);
    endpoint.attach(
        WebSocketService::builder("chat")
            .on_open(move |_| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(())
                }
            })
            .build(),
    )?;
    let (handshaker, transport) = MockHandshaker::new(1, "/chat");
    upgrade_expect!(endpoint, handshaker);

    tokio::task::yield_now().await;
    assert_eq!(transport.reads(), 0);
    release.notify_one();
    assert!(eventually(|| transport.reads() == 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.reads(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn ready_inside_on_open_is_not_repeated(endpoint: WebSocketEndpoint) -> TestResult {
    let log = CallLog::default();
    let calls = log.clone();
    endpoint.attach(
        WebSocketService::builder("chat")
            .on_open(move |conn| {
                let calls = calls.clone();
                async move {
                    conn.ready();
                    calls.push("open");
                    Ok(())
                }
            })
            .build(),
    )?;
    let (handshaker, transport) = MockHandshaker::new(1, "/chat");
    upgrade_expect!(endpoint, handshaker);

    assert!(eventually(|| log.count("open") == 1).await);
    endpoint.tracker().close();
    endpoint.tracker().wait().await;
    assert_eq!(transport.reads(), 1);
    Ok(())
}

#[rstest]
#[case::error(false)]
#[case::panic(true)]
#[tokio::test]
async fn failed_on_open_reads_once_then_terminates(
    endpoint: WebSocketEndpoint,
    #[case] panics: bool,
) -> TestResult {
    endpoint.attach(
        WebSocketService::builder("chat")
            .on_open(move |_| async move {
                if panics {
                    panic!("boom");
                }
                Err(HandlerError::from("refused"))
            })
            .build(),
    )?;
    let (handshaker, transport) = MockHandshaker::new(1, "/chat");
    upgrade_expect!(endpoint, handshaker);

    assert!(eventually(|| transport.terminated_with().is_some()).await);
    let frame = transport.terminated_with().ok_or("terminated")?;
    assert_eq!(frame.code, close_code::UNEXPECTED_CONDITION);
    assert_eq!(frame.reason, "Unexpected condition");
    assert_eq!(transport.reads(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn secure_flag_is_exposed(endpoint: WebSocketEndpoint) -> TestResult {
    endpoint.attach(WebSocketService::builder("chat").build())?;
    let (handshaker, _) = MockHandshaker::new(1, "/chat");
    let conn = upgrade_expect!(endpoint, handshaker.secure());
    assert!(conn.is_secure());
    assert!(conn.is_open());
    Ok(())
}
