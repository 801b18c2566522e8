//! Request/response calls against the gateway HTTP API
//!
//! Calls are fire-and-forget with a completion callback ([`RequestCorrelator::send`])
//! or awaited ([`RequestCorrelator::call`]). Either way the outcome is one of
//! [`CallOutcome`]'s three shapes, delivered once.

pub mod correlator;
pub mod transport;
mod types;

pub use correlator::RequestCorrelator;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    AlarmConfig, CallId, CallOutcome, HttpRequest, HttpResponse, Method, RequestError,
    SubscriptionConfig,
};
