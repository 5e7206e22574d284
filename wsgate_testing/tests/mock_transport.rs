//! Tests for the mock transport doubles.

use std::time::Duration;

use bytes::Bytes;
use rstest::rstest;
use wsgate::{
    CloseFrame,
    TransportError,
    transport::{HandshakeParams, Handshaker, Rejection, TransportConnection, UpgradeRequest},
};
use wsgate_testing::{MockConnection, MockHandshaker, Outbound, TestResult, eventually};

fn params(sub_protocols: &[&str]) -> HandshakeParams {
    HandshakeParams {
        sub_protocols: sub_protocols.iter().map(|p| (*p).to_owned()).collect(),
        idle_timeout: Some(Duration::from_secs(5)),
        headers: Vec::new(),
        max_frame_size: 1024,
    }
}

#[rstest]
#[tokio::test]
async fn records_outbound_frames_in_order() -> TestResult {
    let conn = MockConnection::new(7);
    conn.push_text("a".into(), false).await?;
    conn.push_binary(Bytes::from_static(b"b"), true).await?;
    conn.push_ping(Bytes::new()).await?;
    conn.close(CloseFrame::new(1000, "bye")).await?;
    assert_eq!(
        conn.outbound(),
        [
            Outbound::Text("a".into(), false),
            Outbound::Binary(Bytes::from_static(b"b"), true),
            Outbound::Ping(Bytes::new()),
            Outbound::Close(CloseFrame::new(1000, "bye")),
        ]
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn failing_connection_rejects_pushes() {
    let conn = MockConnection::new(1);
    conn.fail_pushes();
    let err = conn
        .push_text("x".into(), true)
        .await
        .expect_err("push should fail");
    assert!(matches!(err, TransportError::Closed));
    assert!(conn.outbound().is_empty());
}

#[rstest]
#[tokio::test]
async fn terminate_closes_connection() -> TestResult {
    let conn = MockConnection::new(2);
    conn.terminate(CloseFrame::new(1011, "Unexpected condition")).await?;
    assert!(!conn.is_open());
    assert_eq!(conn.terminated_with().map(|f| f.code), Some(1011));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn handshaker_negotiates_and_records_params() -> TestResult {
    let (handshaker, conn) = MockHandshaker::new(3, "/chat");
    let handshaker = handshaker.sub_protocols(["v2", "v3"]).secure();
    let recorded = handshaker.params();
    let select = |request: &UpgradeRequest| -> Result<HandshakeParams, Rejection> {
        assert_eq!(request.path, "/chat");
        Ok(params(&["v1", "v2"]))
    };
    let outcome = Box::new(handshaker).handshake(&select).await?;
    assert_eq!(outcome.negotiated_sub_protocol.as_deref(), Some("v2"));
    assert!(outcome.secure);
    assert_eq!(outcome.connection.id(), conn.id());
    let stored = recorded.lock().map_err(|_| "poisoned")?.clone();
    assert_eq!(stored.map(|p| p.max_frame_size), Some(1024));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn handshaker_reports_rejection() {
    let (handshaker, _) = MockHandshaker::new(4, "/missing");
    let select = |_: &UpgradeRequest| -> Result<HandshakeParams, Rejection> {
        Err(Rejection::new(404, "not found"))
    };
    let err = Box::new(handshaker)
        .handshake(&select)
        .await
        .expect_err("rejected");
    assert!(matches!(err, TransportError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn eventually_times_out_on_false_condition() {
    assert!(!eventually(|| false).await);
    assert!(eventually(|| true).await);
}
