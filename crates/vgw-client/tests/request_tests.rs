//! Integration tests for request/response calls
//!
//! These tests spin up an axum server standing in for the gateway API and
//! drive it through `GatewayClient`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use vgw_client::testing::{unused_port, wait_for, TestHttpServer};
use vgw_client::{
    AlarmConfig, AlarmType, CallOutcome, ClientConfig, ClientError, FaultCodeKey, GatewayClient,
    Method, RequestError, SubscriptionConfig,
};

fn gateway_api() -> Router {
    Router::new()
        .route(
            "/vehicle/engine/speed",
            get(|| async { Json(json!({ "value": 4.3 })) }),
        )
        .route("/vehicle/engine/html", get(|| async { "<html>oops</html>" }))
        .route(
            "/vehicle/engine/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such endpoint") }),
        )
        .route(
            "/vehicle/engine/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(json!({}))
            }),
        )
        .route(
            "/subscriptions/{*endpoint}",
            put(|Path(endpoint): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({ "endpoint": endpoint, "config": body }))
            })
            .delete(|| async { StatusCode::NO_CONTENT }),
        )
        .route(
            "/alarms/{*endpoint}",
            put(|Path(endpoint): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({ "endpoint": endpoint, "config": body }))
            })
            .delete(|Path(rest): Path<String>| async move { Json(json!({ "removed": rest })) }),
        )
        .route(
            "/vehicle/dtc/{bus_status}/{ecu}",
            get(|Path((bus_status, ecu)): Path<(String, String)>| async move {
                Json(json!({ "bus_status": bus_status, "ecu": ecu, "codes": ["00ff00000000ffff"] }))
            }),
        )
}

async fn client_for(server: &TestHttpServer) -> GatewayClient {
    GatewayClient::new(ClientConfig {
        http_base_url: server.base_url(),
        request_timeout_ms: 5_000,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_json_response_is_success() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let outcome = client.call(Method::Get, "vehicle/engine/speed", None).await;

    match outcome {
        CallOutcome::Success(value) => assert_eq!(value, json!({ "value": 4.3 })),
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(client.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_non_json_response_is_parse_error() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let outcome = client.call(Method::Get, "vehicle/engine/html", None).await;

    match outcome {
        CallOutcome::JsonParseError { raw, .. } => assert_eq!(raw, "<html>oops</html>"),
        other => panic!("expected parse error, got {:?}", other),
    }
    assert!(matches!(
        client.read_value("vehicle/engine/html").await,
        Err(ClientError::ParseError(_))
    ));
}

#[tokio::test]
async fn test_error_status_is_failure() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let outcome = client.call(Method::Get, "vehicle/engine/missing", None).await;

    match outcome {
        CallOutcome::Failure(RequestError::Status { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such endpoint");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_network_failure() {
    let port = unused_port().await.unwrap();
    let client = GatewayClient::new(ClientConfig {
        http_base_url: format!("http://127.0.0.1:{}/", port),
        ..Default::default()
    })
    .unwrap();

    let outcome = client.call(Method::Get, "vehicle/engine/speed", None).await;

    assert!(matches!(
        outcome,
        CallOutcome::Failure(RequestError::Network(_))
    ));
}

#[tokio::test]
async fn test_concurrent_calls_resolve_exactly_once() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let resolved = Arc::new(Mutex::new(Vec::new()));
    let mut ids = HashSet::new();
    for _ in 0..50 {
        let resolved = resolved.clone();
        let id = client.send(Method::Get, "vehicle/engine/speed", None, move |outcome| {
            resolved.lock().push(outcome.is_success());
        });
        assert!(ids.insert(id), "call ids must be unique");
    }

    assert!(wait_for(|| resolved.lock().len() == 50, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resolved = resolved.lock();
    assert_eq!(resolved.len(), 50);
    assert!(resolved.iter().all(|ok| *ok));
    assert_eq!(client.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_awaited_calls_complete_independently() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let paths = ["vehicle/engine/speed", "vehicle/engine/missing", "vehicle/engine/html"];
    let outcomes = futures::future::join_all(
        paths
            .iter()
            .map(|path| client.call(Method::Get, *path, None)),
    )
    .await;

    assert!(matches!(&outcomes[0], CallOutcome::Success(v) if v == &json!({ "value": 4.3 })));
    assert!(matches!(
        &outcomes[1],
        CallOutcome::Failure(RequestError::Status { status: 404, .. })
    ));
    assert!(matches!(&outcomes[2], CallOutcome::JsonParseError { .. }));
    assert_eq!(client.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_send_from_non_runtime_thread() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = Arc::new(client_for(&server).await);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let caller = client.clone();
    std::thread::spawn(move || {
        caller.send(Method::Get, "vehicle/engine/speed", None, move |outcome| {
            let _ = tx.send(outcome);
        });
    })
    .join()
    .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, CallOutcome::Success(v) if v == json!({ "value": 4.3 })));
}

#[tokio::test]
async fn test_disconnect_aborts_pending_calls() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..5 {
        let outcomes = outcomes.clone();
        client.send(Method::Get, "vehicle/engine/slow", None, move |outcome| {
            outcomes.lock().push(outcome);
        });
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.correlator().pending_count(), 5);

    client.disconnect(true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, CallOutcome::Failure(RequestError::ConnectionAborted))));
    assert_eq!(client.correlator().pending_count(), 0);
}

#[tokio::test]
async fn test_subscription_and_alarm_helpers() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let configured = client
        .configure_subscription(
            "/vehicle/engine/speed",
            &SubscriptionConfig {
                interval_ms: Some(250),
                on_change: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        configured,
        json!({
            "endpoint": "vehicle/engine/speed",
            "config": { "interval_ms": 250, "on_change": true }
        })
    );

    assert_eq!(
        client.remove_subscription("vehicle/engine/speed").await.unwrap(),
        Value::Null
    );

    let alarm = client
        .configure_alarm(
            "vehicle/engine/speed",
            &AlarmConfig::range(AlarmType::OutOfRange, 10.0, 20.0),
        )
        .await
        .unwrap();
    assert_eq!(
        alarm["config"],
        json!({ "type": "out_of_range", "threshold": 10.0, "upper": 20.0 })
    );

    let removed = client
        .remove_alarm("vehicle/engine/speed", AlarmType::OutOfRange)
        .await
        .unwrap();
    assert_eq!(removed, json!({ "removed": "vehicle/engine/speed/out" }));
}

#[tokio::test]
async fn test_read_fault_codes() {
    let server = TestHttpServer::start(gateway_api()).await.unwrap();
    let client = client_for(&server).await;

    let codes = client
        .read_fault_codes(&FaultCodeKey::active("can0", "ecu0"))
        .await
        .unwrap();

    assert_eq!(codes["bus_status"], "can0_active");
    assert_eq!(codes["ecu"], "ecu0");
    assert_eq!(codes["codes"][0], "00ff00000000ffff");
}
