//! Subscription registry
//!
//! Local delivery-routing table: routing key → listeners, in registration
//! order. Registering here does no network I/O; configuring the gateway to
//! emit events is a separate request (see [`GatewayClient::configure_subscription`]).
//!
//! [`GatewayClient::configure_subscription`]: crate::GatewayClient::configure_subscription

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::stream::{ChannelInfo, EventSink};
use crate::types::{CategoryFilter, InboundEvent, RoutingKey};

/// Receives events for the keys it is registered on.
///
/// Returning an error (or panicking) is logged and does not affect other
/// listeners of the same event.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &InboundEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Where a listener is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Directly on the channel's read-loop task
    #[default]
    Immediate,
    /// Handed to the [`DispatchContext`] (e.g. a UI thread). A task still
    /// queued when its registration is removed is skipped.
    UiContext,
}

/// Runs marshaled deliveries on the preferred execution context
pub trait DispatchContext: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs tasks immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl DispatchContext for InlineContext {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Queues tasks for a single consumer loop, the way a UI event loop drains
/// its work queue.
#[derive(Clone)]
pub struct QueuedContext {
    tx: mpsc::UnboundedSender<Box<dyn FnOnce() + Send>>,
}

/// Consumer side of a [`QueuedContext`]
pub struct ContextQueue {
    rx: mpsc::UnboundedReceiver<Box<dyn FnOnce() + Send>>,
}

impl QueuedContext {
    pub fn new() -> (Self, ContextQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ContextQueue { rx })
    }
}

impl DispatchContext for QueuedContext {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        if self.tx.send(task).is_err() {
            warn!("Dispatch context queue closed; dropping delivery");
        }
    }
}

impl ContextQueue {
    /// Run every queued task; returns how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Run tasks until every [`QueuedContext`] handle is dropped
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
    }
}

/// Handle returned by `subscribe`, used to remove one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registration {
    id: SubscriptionId,
    key: RoutingKey,
    filter: CategoryFilter,
    listener: Arc<dyn EventListener>,
    delivery: Delivery,
    /// Cleared on removal; marshaled deliveries check it before running
    active: AtomicBool,
}

impl Registration {
    fn matches(&self, event: &InboundEvent) -> bool {
        self.key == event.routing_key && self.filter.matches(event.category)
    }

    fn invoke(&self, event: &InboundEvent) {
        match catch_unwind(AssertUnwindSafe(|| self.listener.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(subscription = %self.id, key = %self.key, error = %e, "Listener failed");
            }
            Err(panic) => {
                warn!(
                    subscription = %self.id,
                    key = %self.key,
                    "Listener panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// Routing key → listeners table
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<Arc<Registration>>>,
    context: Arc<dyn DispatchContext>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(InlineContext))
    }
}

impl SubscriptionRegistry {
    pub fn new(context: Arc<dyn DispatchContext>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            context,
        }
    }

    pub fn subscribe(
        &self,
        key: RoutingKey,
        filter: CategoryFilter,
        listener: Arc<dyn EventListener>,
        delivery: Delivery,
    ) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        trace!(subscription = %id, %key, ?filter, ?delivery, "Registering listener");
        self.entries.write().push(Arc::new(Registration {
            id,
            key,
            filter,
            listener,
            delivery,
            active: AtomicBool::new(true),
        }));
        id
    }

    /// Remove one registration
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.remove_where(|r| r.id == id) > 0
    }

    /// Remove every registration for a key; returns how many were removed
    pub fn unsubscribe_key(&self, key: &RoutingKey) -> usize {
        self.remove_where(|r| &r.key == key)
    }

    /// Remove every registration of this listener instance
    pub fn unsubscribe_listener(&self, listener: &Arc<dyn EventListener>) -> usize {
        self.remove_where(|r| std::ptr::addr_eq(Arc::as_ptr(&r.listener), Arc::as_ptr(listener)))
    }

    pub fn clear(&self) {
        self.remove_where(|_| true);
    }

    fn remove_where(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|r| {
            if predicate(&**r) {
                r.active.store(false, Ordering::Release);
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Deliver an event to every matching registration, in registration
    /// order. Returns the number of registrations it was handed to.
    pub fn dispatch(&self, event: Arc<InboundEvent>) -> usize {
        // Snapshot so (un)subscribing from a listener cannot race this pass
        let matching: Vec<Arc<Registration>> = self
            .entries
            .read()
            .iter()
            .filter(|r| r.matches(&event))
            .cloned()
            .collect();

        for registration in &matching {
            match registration.delivery {
                Delivery::Immediate => registration.invoke(&event),
                Delivery::UiContext => {
                    let registration = Arc::clone(registration);
                    let event = Arc::clone(&event);
                    self.context.execute(Box::new(move || {
                        if registration.active.load(Ordering::Acquire) {
                            registration.invoke(&event);
                        }
                    }));
                }
            }
        }

        if matching.is_empty() {
            trace!(key = %event.routing_key, "No listener for event");
        }
        matching.len()
    }
}

impl EventSink for SubscriptionRegistry {
    fn deliver(&self, _channel: &ChannelInfo, event: Arc<InboundEvent>) {
        self.dispatch(event);
    }
}
