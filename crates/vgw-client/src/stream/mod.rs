//! Event stream support
//!
//! Maintains the persistent connection to the gateway's event stream and
//! turns its newline-delimited JSON into typed events.
//!
//! ```text
//! EventTransport ─► FrameDecoder ─► classify ─► EventSink (registry)
//!                        │              │
//!                        └──────────────┴─► DiagnosticListener
//! ```

pub mod channel;
pub mod classifier;
pub mod decoder;
pub mod listener;
pub mod sequence;
pub mod transport;
mod types;

pub use channel::{EventChannel, EventSink, PendingConnect};
pub use classifier::{classify, Classified};
pub use decoder::{Frame, FrameDecoder};
pub use listener::{DiagnosticListener, LoggingDiagnostics, LoggingStateListener, StateListener};
pub use sequence::{SequenceCheck, SequenceStats, SequenceTracker};
pub use transport::{EventConnection, EventTransport, TcpTransport, TransportError};
pub use types::{ChannelError, ChannelInfo, ChannelState, ClassifyError, DecodeError};
