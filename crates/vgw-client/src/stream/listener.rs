//! Channel lifecycle and diagnostic listeners

use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::{ChannelError, ChannelInfo, ClassifyError, DecodeError};

/// Receives event channel lifecycle transitions.
///
/// Per disconnection episode exactly one of `on_error`, `on_remote_close`,
/// `on_failed_connection` or `on_done` is called. Nothing is called after
/// `on_done`. All methods default to logging.
pub trait StateListener: Send + Sync {
    fn on_connected(&self, channel: &ChannelInfo) {
        info!(channel = %channel.id, host = %channel.host, port = channel.port, "Event channel connected");
    }

    fn on_error(&self, channel: &ChannelInfo, error: &ChannelError) {
        warn!(channel = %channel.id, %error, "Event channel failed");
    }

    fn on_remote_close(&self, channel: &ChannelInfo, port: u16) {
        info!(channel = %channel.id, port, "Event channel closed by gateway");
    }

    fn on_failed_connection(&self, channel: &ChannelInfo, port: u16) {
        warn!(channel = %channel.id, host = %channel.host, port, "Event channel connection failed");
    }

    fn on_done(&self, channel: &ChannelInfo) {
        info!(channel = %channel.id, "Event channel done");
    }
}

/// State listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStateListener;

impl StateListener for LoggingStateListener {}

/// Receives frames that did not turn into events.
///
/// These never terminate the stream. Defaults log the problem.
pub trait DiagnosticListener: Send + Sync {
    fn on_decode_error(&self, channel: &ChannelInfo, error: &DecodeError) {
        warn!(channel = %channel.id, %error, "Dropping undecodable frame");
    }

    fn on_classify_error(&self, channel: &ChannelInfo, error: &ClassifyError, frame: &Value) {
        warn!(channel = %channel.id, %error, %frame, "Dropping invalid event");
    }

    /// Catch-all for well-formed objects that are neither `data` nor `alarm`
    fn on_unrecognized(&self, channel: &ChannelInfo, frame: &Value) {
        debug!(channel = %channel.id, %frame, "Unrecognized frame");
    }
}

/// Diagnostic listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDiagnostics;

impl DiagnosticListener for LoggingDiagnostics {}
