//! Integration tests for the event channel
//!
//! Each test runs a real TCP event server on localhost, connects a
//! `GatewayClient` to it and scripts the gateway side of the stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use vgw_client::stream::{ChannelInfo, ClassifyError, DecodeError, DiagnosticListener};
use vgw_client::testing::{
    unused_port, wait_for, FrameBuilder, RecordingListener, RecordingStateListener,
    TestEventServer,
};
use vgw_client::{
    AlarmType, Category, CategoryFilter, ChannelState, ClientConfig, ClientError, EventListener,
    EventValue, FaultCodeKey, GatewayClient, InboundEvent, RoutingKey,
};

const WAIT: Duration = Duration::from_secs(2);

/// Counts diagnostic callbacks
#[derive(Default)]
struct CountingDiagnostics {
    decode_errors: AtomicUsize,
    classify_errors: AtomicUsize,
    unrecognized: AtomicUsize,
}

impl DiagnosticListener for CountingDiagnostics {
    fn on_decode_error(&self, _: &ChannelInfo, _: &DecodeError) {
        self.decode_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_classify_error(&self, _: &ChannelInfo, _: &ClassifyError, _: &Value) {
        self.classify_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unrecognized(&self, _: &ChannelInfo, _: &Value) {
        self.unrecognized.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    server: TestEventServer,
    client: GatewayClient,
    states: Arc<RecordingStateListener>,
    diagnostics: Arc<CountingDiagnostics>,
}

async fn harness() -> Harness {
    let server = TestEventServer::bind().await.unwrap();
    let states = RecordingStateListener::new();
    let diagnostics = Arc::new(CountingDiagnostics::default());

    let client = GatewayClient::builder()
        .config(server.config())
        .state_listener(states.clone())
        .diagnostics(diagnostics.clone())
        .build()
        .unwrap();

    Harness {
        server,
        client,
        states,
        diagnostics,
    }
}

fn values(listener: &RecordingListener) -> Vec<f64> {
    listener
        .events()
        .iter()
        .filter_map(|e| e.value.as_f64())
        .collect()
}

#[tokio::test]
async fn test_events_delivered_in_decode_order() {
    let h = harness().await;
    let listener = RecordingListener::new();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/baz"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();

    let frames = FrameBuilder::new();
    for (sequence, value) in [(10, 1.0), (12, 2.0), (11, 3.0)] {
        peer.send_line(&frames.data_with_sequence("vehicle/engine/baz", value, sequence))
            .await
            .unwrap();
    }

    assert!(wait_for(|| listener.len() == 3, WAIT).await);
    let sequences: Vec<u64> = listener.events().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![10, 12, 11]);
    assert_eq!(values(&listener), vec![1.0, 2.0, 3.0]);

    let stats = h.client.sequence_stats().unwrap();
    assert_eq!(stats.gaps, 1);
    assert_eq!(stats.regressions, 1);
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_the_stream() {
    let h = harness().await;
    let listener = RecordingListener::new();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/baz"),
        CategoryFilter::Subscriptions,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();

    peer.send_line(r#"{"this is invalid data": [1, 2, 3]}"#)
        .await
        .unwrap();
    peer.send_line("not json at all").await.unwrap();
    peer.send_line(&FrameBuilder::new().data("vehicle/engine/baz", 4.3))
        .await
        .unwrap();

    assert!(wait_for(|| listener.len() == 1, WAIT).await);
    let event = &listener.events()[0];
    assert_eq!(event.short_name, "baz_sub");
    assert_eq!(event.value, EventValue::Number(4.3));
    assert_eq!(event.category, Category::SubscriptionData);

    assert_eq!(h.diagnostics.unrecognized.load(Ordering::SeqCst), 1);
    assert_eq!(h.diagnostics.decode_errors.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let h = harness().await;
    let listener = RecordingListener::new();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/baz"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();

    let line = format!("{}\n", FrameBuilder::new().data("vehicle/engine/baz", 7.25));
    let (head, tail) = line.as_bytes().split_at(line.len() / 2);
    peer.send_raw(head).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(listener.is_empty());
    peer.send_raw(tail).await.unwrap();

    assert!(wait_for(|| listener.len() == 1, WAIT).await);
    assert_eq!(values(&listener), vec![7.25]);
}

#[tokio::test]
async fn test_fault_code_alarm_delivery() {
    let h = harness().await;
    let listener = RecordingListener::new();
    let key = FaultCodeKey::active("can0", "ecu0");
    h.client.subscribe_with(
        key.clone(),
        Category::AlarmFaultCode,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();

    let mut frames = FrameBuilder::new();
    // Same key, other category: filtered out
    peer.send_line(&frames.fault_code(&key, "0000"))
        .await
        .unwrap();
    peer.send_line(&frames.fault_code_alarm(&key, AlarmType::Change, "00ff00000000ffff"))
        .await
        .unwrap();

    assert!(wait_for(|| listener.len() == 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let events = listener.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.category, Category::AlarmFaultCode);
    assert_eq!(event.alarm_type, Some(AlarmType::Change));
    assert_eq!(event.value.as_hex(), Some("00ff00000000ffff"));
    match &event.routing_key {
        RoutingKey::FaultCode(k) => {
            assert_eq!(k.bus, "can0");
            assert_eq!(k.ecu, "ecu0");
            assert!(k.is_active());
        }
        other => panic!("unexpected routing key {:?}", other),
    }
}

#[tokio::test]
async fn test_listener_failure_is_isolated() {
    let h = harness().await;
    let key = RoutingKey::endpoint("vehicle/engine/baz");
    let survivor = RecordingListener::new();

    h.client.subscribe(
        key.clone(),
        CategoryFilter::Any,
        |_: &InboundEvent| -> anyhow::Result<()> { anyhow::bail!("listener rejected event") },
    );
    h.client.subscribe(
        key.clone(),
        CategoryFilter::Any,
        |_: &InboundEvent| -> anyhow::Result<()> { panic!("listener blew up") },
    );
    h.client.subscribe_with(key, CategoryFilter::Any, survivor.clone(), Default::default());

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();
    let mut frames = FrameBuilder::new();
    peer.send_line(&frames.data("vehicle/engine/baz", 1.0))
        .await
        .unwrap();
    peer.send_line(&frames.data("vehicle/engine/baz", 2.0))
        .await
        .unwrap();

    assert!(wait_for(|| survivor.len() == 2, WAIT).await);
    assert_eq!(values(&survivor), vec![1.0, 2.0]);
    assert_eq!(h.client.state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_remote_close_reports_once() {
    let h = harness().await;
    h.client.connect().await.unwrap();
    let peer = h.server.accept().await.unwrap();

    peer.close().await.unwrap();

    let port = h.server.port();
    assert!(wait_for(|| h.states.calls().len() == 2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.states.calls(),
        vec!["connected".to_string(), format!("remote_close:{}", port)]
    );
    assert_eq!(h.client.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_keeps_registrations() {
    let h = harness().await;
    let listener = RecordingListener::new();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/baz"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let first_channel = h.client.channel_info().unwrap().id;
    h.server.accept().await.unwrap().close().await.unwrap();
    assert!(wait_for(|| h.client.state() == ChannelState::Disconnected, WAIT).await);

    h.client.connect().await.unwrap();
    assert_ne!(h.client.channel_info().unwrap().id, first_channel);
    let mut peer = h.server.accept().await.unwrap();
    peer.send_line(&FrameBuilder::new().data("vehicle/engine/baz", 4.3))
        .await
        .unwrap();

    assert!(wait_for(|| listener.len() == 1, WAIT).await);
}

#[tokio::test]
async fn test_disconnect_fires_done_once_and_stops_delivery() {
    let h = harness().await;
    let listener = RecordingListener::new();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/baz"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();

    assert!(h.client.disconnect(true).await);
    assert!(!h.client.disconnect(true).await);
    assert_eq!(h.client.state(), ChannelState::Done);
    assert!(h.client.registry().is_empty());

    // Whatever the server still sends goes nowhere
    let _ = peer
        .send_line(&FrameBuilder::new().data("vehicle/engine/baz", 1.0))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(listener.is_empty());
    assert_eq!(
        h.states.calls(),
        vec!["connected".to_string(), "done".to_string()]
    );
}

#[tokio::test]
async fn test_connection_refused() {
    let port = unused_port().await.unwrap();
    let states = RecordingStateListener::new();
    let client = GatewayClient::builder()
        .config(ClientConfig {
            event_port: port,
            ..Default::default()
        })
        .state_listener(states.clone())
        .build()
        .unwrap();

    let result = client.connect().await;

    assert!(matches!(result, Err(ClientError::Channel(_))));
    assert_eq!(states.calls(), vec![format!("failed:{}", port)]);
    assert_eq!(client.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let h = harness().await;
    h.client.connect().await.unwrap();
    let _peer = h.server.accept().await.unwrap();

    assert!(matches!(
        h.client.connect().await,
        Err(ClientError::AlreadyConnected)
    ));
    assert_eq!(h.states.calls(), vec!["connected".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_open_one_channel() {
    for _ in 0..20 {
        let h = harness().await;
        let client = Arc::new(h.client);

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ClientError::AlreadyConnected)))
                .count(),
            1
        );

        let _peer = h.server.accept().await.unwrap();
        assert!(client.disconnect(true).await);
        assert_eq!(
            h.states.calls(),
            vec!["connected".to_string(), "done".to_string()]
        );
    }
}

#[tokio::test]
async fn test_unsubscribe_by_listener_instance() {
    let h = harness().await;
    let recorder = RecordingListener::new();
    let listener: Arc<dyn EventListener> = recorder.clone();
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/a"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );
    h.client.subscribe_with(
        RoutingKey::endpoint("vehicle/engine/b"),
        CategoryFilter::Any,
        listener.clone(),
        Default::default(),
    );

    assert_eq!(h.client.unsubscribe_listener(&listener), 2);

    h.client.connect().await.unwrap();
    let mut peer = h.server.accept().await.unwrap();
    peer.send_line(&FrameBuilder::new().data("vehicle/engine/a", 1.0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(recorder.is_empty());
}
