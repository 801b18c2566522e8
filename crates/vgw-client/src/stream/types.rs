//! Types for the event channel

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use super::transport::TransportError;
use crate::uri::UriError;

/// Lifecycle state of an event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Torn down by a local `disconnect`; terminal for the instance
    Done,
}

impl ChannelState {
    pub fn is_live(self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Connected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Identity of one event channel instance, handed to every listener callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: Uuid,
    pub host: String,
    pub port: u16,
}

/// Errors reported by the event channel
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation not allowed in state {0}")]
    InvalidState(ChannelState),

    #[error("Channel was disconnected before the connection completed")]
    Cancelled,
}

/// A single frame that could not be decoded. The stream continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8 { raw: Vec<u8> },

    #[error("Invalid JSON frame: {source} (data: {data})", data = preview(.raw))]
    InvalidJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frame is not a JSON object (data: {data})", data = preview(.raw))]
    NotAnObject { raw: String },

    #[error("Frame exceeds {limit} bytes")]
    TooLong { limit: usize },
}

impl DecodeError {
    /// The offending frame text, lossily decoded
    pub fn raw_text(&self) -> String {
        match self {
            DecodeError::InvalidUtf8 { raw } => String::from_utf8_lossy(raw).into_owned(),
            DecodeError::InvalidJson { raw, .. } | DecodeError::NotAnObject { raw } => raw.clone(),
            DecodeError::TooLong { .. } => String::new(),
        }
    }
}

/// Well-formed JSON that does not describe a valid event
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Event body under '{0}' is not an object")]
    MalformedBody(&'static str),

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Expected exactly one payload key, found {0}")]
    PayloadKeys(usize),

    #[error("Invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("short_name '{0}' has no category suffix")]
    ShortName(String),

    #[error("short_name '{short_name}' does not match a {family} event")]
    CategoryMismatch {
        short_name: String,
        family: &'static str,
    },

    #[error("Unknown alarm suffix in short_name '{0}'")]
    UnknownAlarmType(String),

    #[error("Fault-code URI: {0}")]
    Uri(#[from] UriError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub(crate) fn preview(data: &str) -> String {
    if data.len() > 100 {
        let mut end = 100;
        while !data.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &data[..end])
    } else {
        data.to_string()
    }
}
