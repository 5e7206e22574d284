#![cfg(feature = "metrics")]
//! Tests for `wsgate` metrics.
//!
//! Counters and gauges are captured with
//! `metrics_util::debugging::DebuggingRecorder`. Async tests run on a
//! current-thread runtime so the thread-local recorder sees spawned tasks.

use metrics_util::debugging::{DebugValue, Snapshotter};
use rstest::rstest;
use serial_test::serial;
use wsgate::{
    CloseFrame,
    EventKind,
    WebSocketEndpoint,
    WebSocketService,
    metrics::{
        CONNECTIONS_ACTIVE,
        FRAMES_DISPATCHED,
        HANDLER_ERRORS_TOTAL,
        HANDSHAKES_TOTAL,
        HandshakeResult,
    },
    transport::TransportEvent,
};
use wsgate_testing::{
    MockHandshaker,
    counter_value,
    debugging_recorder,
    eventually,
    snapshot,
    upgrade_expect,
};

#[rstest]
#[case(EventKind::Text, "text")]
#[case(EventKind::IdleTimeout, "idle_timeout")]
#[serial]
fn frame_metric_is_labelled_by_kind(#[case] kind: EventKind, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || wsgate::metrics::inc_frames(kind));
    let snap = snapshot(&snapshotter);
    assert_eq!(counter_value(&snap, FRAMES_DISPATCHED, Some(("kind", label))), 1);
}

#[rstest]
#[case(HandshakeResult::Accepted, "accepted")]
#[case(HandshakeResult::Rejected, "rejected")]
#[case(HandshakeResult::Failed, "failed")]
#[serial]
fn handshake_metric_is_labelled_by_outcome(#[case] result: HandshakeResult, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder();
    metrics::with_local_recorder(&recorder, || wsgate::metrics::inc_handshakes(result));
    let snap = snapshot(&snapshotter);
    assert_eq!(counter_value(&snap, HANDSHAKES_TOTAL, Some(("outcome", label))), 1);
}

#[tokio::test(flavor = "current_thread")]
#[serial]
async fn connection_lifecycle_updates_metrics() -> wsgate_testing::TestResult {
    let (snapshotter, recorder) = debugging_recorder();
    let _guard = metrics::set_default_local_recorder(&recorder);

    let endpoint = WebSocketEndpoint::default();
    endpoint.attach(
        WebSocketService::builder("chat")
            .on_text(|_, _, _| async { Err("rejected payload".into()) })
            .build(),
    )?;
    let (missing, _) = MockHandshaker::new(1, "/missing");
    assert!(endpoint.upgrade(Box::new(missing)).await.is_err());
    let (handshaker, transport) = MockHandshaker::new(2, "/chat");
    let conn = upgrade_expect!(endpoint, handshaker);

    let gauge = |snapshotter: &Snapshotter| {
        snapshot(snapshotter)
            .into_iter()
            .find(|(name, _, _)| name == CONNECTIONS_ACTIVE)
            .map(|(_, _, value)| match value {
                DebugValue::Gauge(v) => v.into_inner(),
                _ => f64::NAN,
            })
    };
    assert_eq!(gauge(&snapshotter), Some(1.0));

    endpoint.dispatch(TransportEvent::Text {
        id: conn.id(),
        data: "x".into(),
        is_final: true,
    });
    assert!(eventually(|| transport.reads() == 2).await);
    endpoint.dispatch(TransportEvent::Close {
        id: conn.id(),
        frame: CloseFrame::new(1000, ""),
    });

    let snap = snapshot(&snapshotter);
    assert_eq!(counter_value(&snap, HANDSHAKES_TOTAL, Some(("outcome", "accepted"))), 1);
    assert_eq!(counter_value(&snap, HANDSHAKES_TOTAL, Some(("outcome", "rejected"))), 1);
    assert_eq!(counter_value(&snap, FRAMES_DISPATCHED, None), 2);
    assert_eq!(counter_value(&snap, HANDLER_ERRORS_TOTAL, None), 1);
    assert_eq!(gauge(&snapshotter), Some(0.0));
    Ok(())
}
