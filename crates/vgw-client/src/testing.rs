//! Test utilities for vgw-client
//!
//! Scripts the gateway side of both interfaces: a TCP event server whose
//! peer writes frames on demand, and an axum HTTP server for the
//! request/response API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ClientConfig;
use crate::registry::EventListener;
use crate::stream::{ChannelError, ChannelInfo, StateListener};
use crate::types::{AlarmType, InboundEvent, SUBSCRIPTION_SUFFIX};
use crate::uri::FaultCodeKey;
use crate::{ClientError, Result};

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIMESTAMP: &str = "2016-04-01T12:00:00Z";

// =============================================================================
// Event stream
// =============================================================================

/// Listening side of the event stream on an ephemeral localhost port
pub struct TestEventServer {
    addr: SocketAddr,
    listener: TcpListener,
}

impl TestEventServer {
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { addr, listener })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration pointing at this server
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            host: self.addr.ip().to_string(),
            event_port: self.addr.port(),
            ..Default::default()
        }
    }

    /// Wait for the client to connect
    pub async fn accept(&self) -> Result<TestPeer> {
        let (stream, _) = tokio::time::timeout(ACCEPT_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| {
                ClientError::IoError(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no client connected",
                ))
            })??;
        Ok(TestPeer { stream })
    }
}

/// Server end of one accepted event-stream connection
pub struct TestPeer {
    stream: TcpStream,
}

impl TestPeer {
    /// Write one frame followed by a newline
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write bytes as-is, e.g. half a frame
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Close the connection cleanly
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// A port nothing listens on
pub async fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

/// Builds event frames in the gateway's wire shape.
///
/// Subscription and alarm frames draw from separate sequence counters,
/// both starting at 1.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    next_subscription: u64,
    next_alarm: u64,
    timestamp: String,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            next_subscription: 1,
            next_alarm: 1,
            timestamp: DEFAULT_TIMESTAMP.to_string(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Subscription data event for an endpoint
    pub fn data(&mut self, uri: &str, value: f64) -> String {
        let sequence = self.take_subscription();
        self.frame("data", uri, name_of(uri), SUBSCRIPTION_SUFFIX, sequence, json!(format!("{:.3}", value)))
    }

    /// Alarm data event for an endpoint
    pub fn data_alarm(&mut self, uri: &str, alarm: AlarmType, value: f64) -> String {
        let sequence = self.take_alarm();
        self.frame("alarm", uri, name_of(uri), alarm.suffix(), sequence, json!(format!("{:.3}", value)))
    }

    /// Subscription fault-code event
    pub fn fault_code(&mut self, key: &FaultCodeKey, hex: &str) -> String {
        let sequence = self.take_subscription();
        self.frame("data", &key.to_uri(), &key.ecu, SUBSCRIPTION_SUFFIX, sequence, json!(hex))
    }

    /// Alarm fault-code event
    pub fn fault_code_alarm(&mut self, key: &FaultCodeKey, alarm: AlarmType, hex: &str) -> String {
        let sequence = self.take_alarm();
        self.frame("alarm", &key.to_uri(), &key.ecu, alarm.suffix(), sequence, json!(hex))
    }

    /// Subscription data event with an explicit sequence number; the
    /// counter is left alone
    pub fn data_with_sequence(&self, uri: &str, value: f64, sequence: u64) -> String {
        self.frame("data", uri, name_of(uri), SUBSCRIPTION_SUFFIX, sequence, json!(format!("{:.3}", value)))
    }

    fn take_subscription(&mut self) -> u64 {
        let sequence = self.next_subscription;
        self.next_subscription += 1;
        sequence
    }

    fn take_alarm(&mut self) -> u64 {
        let sequence = self.next_alarm;
        self.next_alarm += 1;
        sequence
    }

    fn frame(
        &self,
        wrapper: &str,
        uri: &str,
        name: &str,
        suffix: &str,
        sequence: u64,
        value: Value,
    ) -> String {
        let mut body = serde_json::Map::new();
        body.insert("timestamp".into(), json!(self.timestamp));
        body.insert("uri".into(), json!(uri));
        body.insert("short_name".into(), json!(format!("{}_{}", name, suffix)));
        body.insert("sequence".into(), json!(sequence));
        body.insert(
            name.to_string(),
            json!({ "value": value, "timestamp": self.timestamp }),
        );
        let mut frame = serde_json::Map::new();
        frame.insert(wrapper.to_string(), Value::Object(body));
        Value::Object(frame).to_string()
    }
}

fn name_of(uri: &str) -> &str {
    uri.trim_matches('/').rsplit('/').next().unwrap_or(uri)
}

/// State listener that records each callback as a short string:
/// `connected`, `error`, `remote_close:<port>`, `failed:<port>`, `done`
#[derive(Debug, Default)]
pub struct RecordingStateListener {
    calls: Mutex<Vec<String>>,
}

impl RecordingStateListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl StateListener for RecordingStateListener {
    fn on_connected(&self, _channel: &ChannelInfo) {
        self.record("connected".into());
    }

    fn on_error(&self, _channel: &ChannelInfo, _error: &ChannelError) {
        self.record("error".into());
    }

    fn on_remote_close(&self, _channel: &ChannelInfo, port: u16) {
        self.record(format!("remote_close:{}", port));
    }

    fn on_failed_connection(&self, _channel: &ChannelInfo, port: u16) {
        self.record(format!("failed:{}", port));
    }

    fn on_done(&self, _channel: &ChannelInfo) {
        self.record("done".into());
    }
}

/// Event listener that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<InboundEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<InboundEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// A test HTTP server that automatically shuts down when dropped
pub struct TestHttpServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestHttpServer {
    /// Serve an axum Router on an ephemeral port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use vgw_client::testing::TestHttpServer;
    ///
    /// let router = Router::new().route("/vehicle/engine/speed", get(|| async { "{\"value\":4.3}" }));
    /// let server = TestHttpServer::start(router).await?;
    /// let config = ClientConfig { http_base_url: server.base_url(), ..Default::default() };
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Base URL of the test server, with a trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    condition()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{classify, Classified};
    use crate::types::{Category, EventValue, RoutingKey};

    fn classify_line(line: &str) -> InboundEvent {
        let frame: serde_json::Map<String, Value> = serde_json::from_str(line).unwrap();
        match classify(&frame).unwrap() {
            Classified::Event(event) => event,
            Classified::Unrecognized => panic!("unrecognized: {}", line),
        }
    }

    #[test]
    fn test_frame_builder_counters_are_independent() {
        let mut frames = FrameBuilder::new();

        let first = classify_line(&frames.data("vehicle/engine/baz", 4.3));
        let alarm = classify_line(&frames.data_alarm("vehicle/engine/baz", AlarmType::Above, 9.0));
        let second = classify_line(&frames.data("vehicle/engine/baz", 4.4));

        assert_eq!((first.sequence, second.sequence, alarm.sequence), (1, 2, 1));
        assert_eq!(first.short_name, "baz_sub");
        assert_eq!(first.value, EventValue::Number(4.3));
        assert_eq!(alarm.category, Category::AlarmData);
        assert_eq!(alarm.short_name, "baz_gt");
    }

    #[test]
    fn test_frame_builder_fault_code() {
        let key = FaultCodeKey::active("can0", "ecu0");
        let event = classify_line(&FrameBuilder::new().fault_code_alarm(&key, AlarmType::Change, "00ff00000000ffff"));

        assert_eq!(event.category, Category::AlarmFaultCode);
        assert_eq!(event.routing_key, RoutingKey::FaultCode(key));
        assert_eq!(event.value, EventValue::Hex("00ff00000000ffff".into()));
    }
}
