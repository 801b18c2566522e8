//! Vehicle Gateway Client Library
//!
//! Keeps a persistent connection to a vehicle gateway's event stream,
//! routes the pushed subscription and alarm events to registered
//! listeners, and issues request/response calls against the gateway's
//! HTTP API.
//!
//! # Example
//!
//! ```rust,no_run
//! use vgw_client::{
//!     AlarmConfig, AlarmType, CategoryFilter, ClientConfig, GatewayClient, InboundEvent,
//!     RoutingKey, SubscriptionConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GatewayClient::new(ClientConfig::load_from("vgw.toml")?)?;
//!
//!     client.subscribe(
//!         RoutingKey::endpoint("vehicle/engine/speed"),
//!         CategoryFilter::Any,
//!         |event: &InboundEvent| -> anyhow::Result<()> {
//!             println!("{} #{}: {}", event.short_name, event.sequence, event.value);
//!             Ok(())
//!         },
//!     );
//!     client.connect().await?;
//!
//!     // Tell the gateway what to push
//!     client
//!         .configure_subscription("vehicle/engine/speed", &SubscriptionConfig::default())
//!         .await?;
//!     client
//!         .configure_alarm("vehicle/engine/speed", &AlarmConfig::threshold(AlarmType::Above, 120.0))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect(true).await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a TCP event server that scripts the
//! gateway side of the stream, a frame builder, and an HTTP test server:
//!
//! ```rust,ignore
//! use vgw_client::testing::{FrameBuilder, TestEventServer};
//!
//! let server = TestEventServer::bind().await?;
//! let client = GatewayClient::new(server.config())?;
//! client.connect().await?;
//!
//! let mut peer = server.accept().await?;
//! peer.send_line(&FrameBuilder::new().data("vehicle/engine/speed", 4.3)).await?;
//! ```

mod client;
mod config;
mod error;
pub mod registry;
pub mod request;
pub mod stream;
pub mod testing;
mod types;
pub mod uri;

pub use client::{GatewayClient, GatewayClientBuilder};
pub use config::{ClientConfig, ConfigError, DEFAULT_MAX_FRAME_LEN};
pub use error::{ClientError, Result};
pub use types::*;

// Re-export the types most callers need
pub use registry::{
    ContextQueue, Delivery, DispatchContext, EventListener, InlineContext, QueuedContext,
    SubscriptionId, SubscriptionRegistry,
};
pub use request::{AlarmConfig, CallId, CallOutcome, Method, RequestError, SubscriptionConfig};
pub use stream::{
    ChannelError, ChannelInfo, ChannelState, DiagnosticListener, StateListener, TransportError,
};
pub use uri::{DtcStatus, FaultCodeKey, UriError};
