//! Event channel state machine
//!
//! ```text
//!   Disconnected ──connect()──► Connecting ──ok──► Connected
//!        ▲                          │                  │
//!        └──── failed connection ◄──┘                  │
//!        └──── remote close / read error ◄─────────────┘
//!
//!   any state ──disconnect()──► Done
//! ```
//!
//! One tokio task per connection runs the connect attempt and then the
//! read loop. Every transition that ends an episode is claimed under the
//! channel lock, so exactly one terminal callback fires per episode.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::classifier::{classify, Classified};
use super::decoder::{Frame, FrameDecoder};
use super::listener::{DiagnosticListener, StateListener};
use super::sequence::{SequenceStats, SequenceTracker};
use super::transport::{EventConnection, EventTransport, TransportError};
use super::types::{ChannelError, ChannelInfo, ChannelState};
use crate::config::DEFAULT_MAX_FRAME_LEN;
use crate::types::InboundEvent;

/// Consumer of classified events (the subscription registry)
pub trait EventSink: Send + Sync {
    fn deliver(&self, channel: &ChannelInfo, event: Arc<InboundEvent>);
}

/// Outcome of a connection attempt started by [`EventChannel::begin_connect`]
#[must_use = "the connection outcome is only known after `wait`"]
pub struct PendingConnect {
    ready: oneshot::Receiver<Result<(), ChannelError>>,
}

impl PendingConnect {
    pub async fn wait(self) -> Result<(), ChannelError> {
        self.ready.await.unwrap_or(Err(ChannelError::Cancelled))
    }
}

/// How a connection episode ended, as seen by the read loop
enum Ending {
    FailedConnection,
    RemoteClose,
    Error(ChannelError),
}

struct ChannelInner {
    state: ChannelState,
    /// Set by `disconnect`; suppresses read-loop outcomes from then on
    closing: bool,
    /// Shutdown signal for the running task, carrying the `graceful` flag
    shutdown: Option<watch::Sender<Option<bool>>>,
    task: Option<JoinHandle<()>>,
}

/// One persistent connection to a gateway's event stream
pub struct EventChannel {
    info: ChannelInfo,
    transport: Arc<dyn EventTransport>,
    sink: Arc<dyn EventSink>,
    state_listener: Arc<dyn StateListener>,
    diagnostics: Arc<dyn DiagnosticListener>,
    max_frame_len: usize,
    sequences: Mutex<SequenceTracker>,
    inner: Mutex<ChannelInner>,
}

impl EventChannel {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        sink: Arc<dyn EventSink>,
        state_listener: Arc<dyn StateListener>,
        diagnostics: Arc<dyn DiagnosticListener>,
    ) -> Arc<Self> {
        Self::with_max_frame_len(
            transport,
            sink,
            state_listener,
            diagnostics,
            DEFAULT_MAX_FRAME_LEN,
        )
    }

    pub fn with_max_frame_len(
        transport: Arc<dyn EventTransport>,
        sink: Arc<dyn EventSink>,
        state_listener: Arc<dyn StateListener>,
        diagnostics: Arc<dyn DiagnosticListener>,
        max_frame_len: usize,
    ) -> Arc<Self> {
        let info = ChannelInfo {
            id: Uuid::new_v4(),
            host: transport.host().to_string(),
            port: transport.port(),
        };

        Arc::new(Self {
            info,
            transport,
            sink,
            state_listener,
            diagnostics,
            max_frame_len,
            sequences: Mutex::new(SequenceTracker::new()),
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                closing: false,
                shutdown: None,
                task: None,
            }),
        })
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    pub fn sequence_stats(&self) -> SequenceStats {
        self.sequences.lock().stats()
    }

    /// Connect to the gateway and start the read loop.
    ///
    /// Resolves once the connection attempt has an outcome; the matching
    /// state callback (`on_connected` or `on_failed_connection`) has fired
    /// by then.
    #[instrument(skip(self), fields(channel = %self.info.id, port = self.info.port))]
    pub async fn connect(self: &Arc<Self>) -> Result<(), ChannelError> {
        self.begin_connect()?.wait().await
    }

    /// Move to `Connecting` and spawn the connection task without waiting.
    ///
    /// The state change happens before this returns, so a caller holding
    /// its own lock across the call serializes concurrent connects. Must be
    /// called from within a tokio runtime.
    pub fn begin_connect(self: &Arc<Self>) -> Result<PendingConnect, ChannelError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if inner.state != ChannelState::Disconnected || inner.closing {
            return Err(ChannelError::InvalidState(inner.state));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        inner.state = ChannelState::Connecting;
        inner.shutdown = Some(shutdown_tx);

        let this = Arc::clone(self);
        inner.task = Some(tokio::spawn(async move {
            this.run(shutdown_rx, ready_tx).await;
        }));

        Ok(PendingConnect { ready: ready_rx })
    }

    /// Tear the connection down and wait for the read loop to exit.
    ///
    /// Fires `on_done` if an episode was live. Returns `false` when the
    /// channel was already done.
    #[instrument(skip(self), fields(channel = %self.info.id))]
    pub async fn disconnect(&self, graceful: bool) -> bool {
        let (task, live) = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Done || inner.closing {
                return false;
            }
            inner.closing = true;
            if let Some(shutdown) = inner.shutdown.take() {
                let _ = shutdown.send(Some(graceful));
            }
            (inner.task.take(), inner.state.is_live())
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(?e, "Event channel task ended abnormally");
            }
        }

        self.inner.lock().state = ChannelState::Done;
        if live {
            self.state_listener.on_done(&self.info);
        }
        debug!(live, "Event channel torn down");
        true
    }

    /// Ask the read loop to stop without waiting for it or firing `on_done`.
    ///
    /// Used when the owner is dropped and cannot await a full teardown.
    pub fn signal_shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.closing = true;
        if let Some(shutdown) = inner.shutdown.take() {
            let _ = shutdown.send(Some(false));
        }
    }

    async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<Option<bool>>,
        ready: oneshot::Sender<Result<(), ChannelError>>,
    ) {
        let connected = tokio::select! {
            result = self.transport.connect() => result,
            _ = shutdown.changed() => {
                let _ = ready.send(Err(ChannelError::Cancelled));
                return;
            }
        };

        let mut connection = match connected {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Failed to connect event stream");
                self.conclude(Ending::FailedConnection);
                let _ = ready.send(Err(ChannelError::Transport(e)));
                return;
            }
        };

        if !self.mark_connected() {
            let _ = connection.close(false).await;
            let _ = ready.send(Err(ChannelError::Cancelled));
            return;
        }
        self.state_listener.on_connected(&self.info);
        let _ = ready.send(Ok(()));

        match self.read_loop(connection.as_mut(), &mut shutdown).await {
            Some(ending) => {
                if let Err(e) = connection.close(false).await {
                    debug!(error = %e, "Close after stream end failed");
                }
                self.conclude(ending);
            }
            None => {
                let graceful = shutdown.borrow().unwrap_or(false);
                if let Err(e) = connection.close(graceful).await {
                    debug!(error = %e, "Close on disconnect failed");
                }
            }
        }
    }

    /// Returns `None` when interrupted by `disconnect`
    async fn read_loop(
        &self,
        connection: &mut dyn EventConnection,
        shutdown: &mut watch::Receiver<Option<bool>>,
    ) -> Option<Ending> {
        let mut decoder = FrameDecoder::with_max_frame_len(self.max_frame_len);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                chunk = connection.read_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        for frame in decoder.feed(&bytes) {
                            self.handle_frame(frame);
                        }
                    }
                    Ok(None) => {
                        if let Some(frame) = decoder.finish() {
                            self.handle_frame(frame);
                        }
                        return Some(Ending::RemoteClose);
                    }
                    Err(TransportError::ConnectionClosed) => return Some(Ending::RemoteClose),
                    Err(e) => return Some(Ending::Error(ChannelError::Transport(e))),
                },
            }
        }
    }

    fn handle_frame(&self, frame: Frame) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                self.diagnostics.on_decode_error(&self.info, &e);
                return;
            }
        };

        match classify(&frame) {
            Ok(Classified::Event(event)) => {
                self.sequences.lock().observe(event.category, event.sequence);
                self.sink.deliver(&self.info, Arc::new(event));
            }
            Ok(Classified::Unrecognized) => {
                self.diagnostics
                    .on_unrecognized(&self.info, &Value::Object(frame));
            }
            Err(e) => {
                self.diagnostics
                    .on_classify_error(&self.info, &e, &Value::Object(frame));
            }
        }
    }

    fn mark_connected(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closing {
            return false;
        }
        inner.state = ChannelState::Connected;
        true
    }

    /// Claim the end of the episode and report it, unless `disconnect`
    /// got there first.
    fn conclude(&self, ending: Ending) {
        {
            let mut inner = self.inner.lock();
            if inner.closing || !inner.state.is_live() {
                return;
            }
            inner.state = ChannelState::Disconnected;
            inner.shutdown = None;
        }

        let port = self.info.port;
        match ending {
            Ending::FailedConnection => self.state_listener.on_failed_connection(&self.info, port),
            Ending::RemoteClose => self.state_listener.on_remote_close(&self.info, port),
            Ending::Error(e) => self.state_listener.on_error(&self.info, &e),
        }
    }
}
