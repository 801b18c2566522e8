//! Gateway client: event channel, subscription registry and request correlator

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::registry::{
    Delivery, DispatchContext, EventListener, InlineContext, SubscriptionId, SubscriptionRegistry,
};
use crate::request::{
    AlarmConfig, CallId, CallOutcome, HttpTransport, Method, RequestCorrelator, ReqwestTransport,
    SubscriptionConfig,
};
use crate::stream::{
    ChannelInfo, ChannelState, DiagnosticListener, EventChannel, EventTransport,
    LoggingDiagnostics, LoggingStateListener, SequenceStats, StateListener, TcpTransport,
};
use crate::types::{AlarmType, CategoryFilter, RoutingKey};
use crate::uri::FaultCodeKey;

/// Client for one vehicle gateway
///
/// Owns at most one live event channel at a time. After a remote close or
/// failed connection, [`connect`](Self::connect) starts a fresh channel;
/// registrations carry over. [`disconnect`](Self::disconnect) clears them
/// and aborts in-flight calls.
///
/// ```rust,no_run
/// use vgw_client::{CategoryFilter, ClientConfig, GatewayClient, InboundEvent, RoutingKey};
///
/// # async fn run() -> vgw_client::Result<()> {
/// let client = GatewayClient::new(ClientConfig::default())?;
/// client.subscribe(
///     RoutingKey::endpoint("vehicle/engine/speed"),
///     CategoryFilter::Any,
///     |event: &InboundEvent| -> anyhow::Result<()> {
///         println!("{} = {}", event.short_name, event.value);
///         Ok(())
///     },
/// );
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayClient {
    config: ClientConfig,
    event_transport: Arc<dyn EventTransport>,
    state_listener: Arc<dyn StateListener>,
    diagnostics: Arc<dyn DiagnosticListener>,
    registry: Arc<SubscriptionRegistry>,
    correlator: Arc<RequestCorrelator>,
    channel: Mutex<Option<Arc<EventChannel>>>,
}

impl GatewayClient {
    /// Create a client with the default TCP and HTTP transports.
    ///
    /// Binds to the tokio runtime it is called from; use
    /// [`GatewayClientBuilder::runtime`] to build elsewhere.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> GatewayClientBuilder {
        GatewayClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    // =========================================================================
    // Event channel
    // =========================================================================

    /// Open a new event channel.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a channel is
    /// connecting or connected. A refused connection is reported both here
    /// and through `on_failed_connection`.
    #[instrument(skip(self), fields(host = %self.config.host, port = self.config.event_port))]
    pub async fn connect(&self) -> Result<()> {
        // Claim `Connecting` under the lock so a concurrent connect sees a live channel
        let (channel, pending) = {
            let mut current = self.channel.lock();
            if current.as_ref().is_some_and(|ch| ch.state().is_live()) {
                return Err(ClientError::AlreadyConnected);
            }

            let channel = EventChannel::with_max_frame_len(
                Arc::clone(&self.event_transport),
                self.registry.clone(),
                Arc::clone(&self.state_listener),
                Arc::clone(&self.diagnostics),
                self.config.max_frame_len,
            );
            let pending = channel.begin_connect()?;
            *current = Some(Arc::clone(&channel));
            (channel, pending)
        };

        pending.wait().await?;
        info!(channel = %channel.info().id, "Event channel connected");
        Ok(())
    }

    /// Tear down the event channel, drop all registrations and abort
    /// pending calls.
    ///
    /// Returns `false` if there was no channel or it was already torn down.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, graceful: bool) -> bool {
        let channel = self.channel.lock().clone();
        let torn_down = match channel {
            Some(channel) => channel.disconnect(graceful).await,
            None => false,
        };

        self.registry.clear();
        let aborted = self.correlator.abort_all();
        debug!(torn_down, aborted, "Client disconnected");
        torn_down
    }

    /// State of the current channel; `Disconnected` if none was ever opened
    pub fn state(&self) -> ChannelState {
        self.channel
            .lock()
            .as_ref()
            .map_or(ChannelState::Disconnected, |ch| ch.state())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn channel_info(&self) -> Option<ChannelInfo> {
        self.channel.lock().as_ref().map(|ch| ch.info().clone())
    }

    pub fn sequence_stats(&self) -> Option<SequenceStats> {
        self.channel.lock().as_ref().map(|ch| ch.sequence_stats())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a listener, invoked on the read-loop task
    pub fn subscribe(
        &self,
        key: impl Into<RoutingKey>,
        filter: impl Into<CategoryFilter>,
        listener: impl EventListener + 'static,
    ) -> SubscriptionId {
        self.subscribe_with(key, filter, Arc::new(listener), Delivery::Immediate)
    }

    /// Register a shared listener with an explicit delivery mode
    pub fn subscribe_with(
        &self,
        key: impl Into<RoutingKey>,
        filter: impl Into<CategoryFilter>,
        listener: Arc<dyn EventListener>,
        delivery: Delivery,
    ) -> SubscriptionId {
        self.registry
            .subscribe(key.into(), filter.into(), listener, delivery)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    pub fn unsubscribe_key(&self, key: &RoutingKey) -> usize {
        self.registry.unsubscribe_key(key)
    }

    pub fn unsubscribe_listener(&self, listener: &Arc<dyn EventListener>) -> usize {
        self.registry.unsubscribe_listener(listener)
    }

    // =========================================================================
    // Request/response
    // =========================================================================

    /// Start a call; `on_complete` runs once with its outcome
    pub fn send<F>(
        &self,
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
        on_complete: F,
    ) -> CallId
    where
        F: FnOnce(CallOutcome) + Send + 'static,
    {
        self.correlator.send(method, path, body, on_complete)
    }

    /// Start a call and wait for its outcome
    pub async fn call(&self, method: Method, path: impl Into<String>, body: Option<Value>) -> CallOutcome {
        self.correlator.call(method, path, body).await
    }

    /// Current value of a data endpoint
    #[instrument(skip(self))]
    pub async fn read_value(&self, endpoint: &str) -> Result<Value> {
        self.call(Method::Get, endpoint_path(endpoint), None)
            .await
            .into_result()
    }

    /// Ask the gateway to stream an endpoint
    #[instrument(skip(self, config))]
    pub async fn configure_subscription(
        &self,
        endpoint: &str,
        config: &SubscriptionConfig,
    ) -> Result<Value> {
        let path = format!("subscriptions/{}", endpoint_path(endpoint));
        self.call(Method::Put, path, Some(to_body(config)?))
            .await
            .into_result()
    }

    #[instrument(skip(self))]
    pub async fn remove_subscription(&self, endpoint: &str) -> Result<Value> {
        let path = format!("subscriptions/{}", endpoint_path(endpoint));
        self.call(Method::Delete, path, None).await.into_result()
    }

    /// Set or change an alarm condition on an endpoint
    #[instrument(skip(self, config))]
    pub async fn configure_alarm(&self, endpoint: &str, config: &AlarmConfig) -> Result<Value> {
        let path = format!("alarms/{}", endpoint_path(endpoint));
        self.call(Method::Put, path, Some(to_body(config)?))
            .await
            .into_result()
    }

    #[instrument(skip(self))]
    pub async fn remove_alarm(&self, endpoint: &str, alarm_type: AlarmType) -> Result<Value> {
        let path = format!("alarms/{}/{}", endpoint_path(endpoint), alarm_type.suffix());
        self.call(Method::Delete, path, None).await.into_result()
    }

    /// Fault codes currently reported by one ECU
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn read_fault_codes(&self, key: &FaultCodeKey) -> Result<Value> {
        self.call(Method::Get, key.to_uri(), None).await.into_result()
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.get_mut().take() {
            channel.signal_shutdown();
        }
        self.correlator.abort_all();
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}

fn endpoint_path(endpoint: &str) -> &str {
    endpoint.trim_matches('/')
}

fn to_body(body: &impl Serialize) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| ClientError::ParseError(e.to_string()))
}

/// Builder for [`GatewayClient`]; any collaborator left unset gets its
/// default (TCP event transport, reqwest HTTP transport, tracing listeners,
/// inline dispatch).
#[derive(Default)]
pub struct GatewayClientBuilder {
    config: Option<ClientConfig>,
    event_transport: Option<Arc<dyn EventTransport>>,
    http_transport: Option<Arc<dyn HttpTransport>>,
    state_listener: Option<Arc<dyn StateListener>>,
    diagnostics: Option<Arc<dyn DiagnosticListener>>,
    dispatch_context: Option<Arc<dyn DispatchContext>>,
    runtime: Option<Handle>,
}

impl GatewayClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.event_transport = Some(transport);
        self
    }

    pub fn http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http_transport = Some(transport);
        self
    }

    pub fn state_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.state_listener = Some(listener);
        self
    }

    pub fn diagnostics(mut self, listener: Arc<dyn DiagnosticListener>) -> Self {
        self.diagnostics = Some(listener);
        self
    }

    /// Execution context for [`Delivery::UiContext`] registrations
    pub fn dispatch_context(mut self, context: Arc<dyn DispatchContext>) -> Self {
        self.dispatch_context = Some(context);
        self
    }

    /// Runtime that runs request tasks; defaults to the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<GatewayClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        let event_transport: Arc<dyn EventTransport> = match self.event_transport {
            Some(transport) => transport,
            None => Arc::new(
                TcpTransport::new(config.host.clone(), config.event_port)
                    .with_connect_timeout(config.connect_timeout()),
            ),
        };

        let http_transport: Arc<dyn HttpTransport> = match self.http_transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                &config.http_base_url,
                config.request_timeout(),
                config.connect_timeout(),
            )?),
        };

        let context = self
            .dispatch_context
            .unwrap_or_else(|| Arc::new(InlineContext));

        Ok(GatewayClient {
            correlator: RequestCorrelator::with_timeout(
                http_transport,
                runtime,
                config.request_timeout(),
            ),
            registry: Arc::new(SubscriptionRegistry::new(context)),
            event_transport,
            state_listener: self
                .state_listener
                .unwrap_or_else(|| Arc::new(LoggingStateListener)),
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Arc::new(LoggingDiagnostics)),
            channel: Mutex::new(None),
            config,
        })
    }
}
