//! Pending-call table
//!
//! Each call gets a [`CallId`] and an entry in the table. Whichever path
//! reaches the entry first (the response task, or `abort_all` at teardown)
//! claims it through an atomic flag and runs the callback; every other
//! path finds it already claimed and does nothing.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::transport::HttpTransport;
use super::types::{CallId, CallOutcome, HttpRequest, HttpResponse, Method, RequestError};

type Callback = Box<dyn FnOnce(CallOutcome) + Send>;

/// One outstanding request
struct PendingCall {
    method: Method,
    path: String,
    completed: AtomicBool,
    callback: Mutex<Option<Callback>>,
    task: Mutex<Option<AbortHandle>>,
}

impl PendingCall {
    /// Returns the callback if this caller won the claim
    fn claim(&self) -> Option<Callback> {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.callback.lock().take()
    }
}

/// Issues calls over an [`HttpTransport`] and resolves each exactly once
///
/// Calls run on the runtime given at construction, so `send` works from
/// any thread, including ones the runtime does not own.
pub struct RequestCorrelator {
    transport: Arc<dyn HttpTransport>,
    runtime: Handle,
    timeout: Option<Duration>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<CallId, Arc<PendingCall>>>,
}

impl RequestCorrelator {
    pub fn new(transport: Arc<dyn HttpTransport>, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            transport,
            runtime,
            timeout: None,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Bound every call by `timeout`, on top of whatever the transport enforces
    pub fn with_timeout(
        transport: Arc<dyn HttpTransport>,
        runtime: Handle,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            runtime,
            timeout: Some(timeout),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Start a call and return immediately.
    ///
    /// `on_complete` runs exactly once, on a runtime worker.
    pub fn send<F>(
        self: &Arc<Self>,
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
        on_complete: F,
    ) -> CallId
    where
        F: FnOnce(CallOutcome) + Send + 'static,
    {
        let id = CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let path = path.into();

        let call = Arc::new(PendingCall {
            method,
            path: path.clone(),
            completed: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(on_complete))),
            task: Mutex::new(None),
        });
        self.pending.lock().insert(id, Arc::clone(&call));
        debug!(call = %id, %method, %path, "Call started");

        let request = HttpRequest {
            method,
            path,
            body: if method.has_body() { body } else { None },
        };

        let this = Arc::clone(self);
        let handle = self.runtime.spawn(async move {
            let outcome = this.execute(request).await;
            this.resolve(id, outcome);
        });
        *call.task.lock() = Some(handle.abort_handle());

        id
    }

    /// Start a call and wait for its outcome
    pub async fn call(
        self: &Arc<Self>,
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> CallOutcome {
        let (tx, rx) = oneshot::channel();
        self.send(method, path, body, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await
            .unwrap_or(CallOutcome::Failure(RequestError::ConnectionAborted))
    }

    /// Resolve every pending call with `ConnectionAborted` and stop their tasks.
    ///
    /// Returns how many calls were aborted.
    pub fn abort_all(&self) -> usize {
        let calls: Vec<(CallId, Arc<PendingCall>)> = self.pending.lock().drain().collect();

        let mut aborted = 0;
        for (id, call) in calls {
            if let Some(task) = call.task.lock().take() {
                task.abort();
            }
            if let Some(callback) = call.claim() {
                debug!(call = %id, method = %call.method, path = %call.path, "Call aborted");
                run_callback(id, callback, CallOutcome::Failure(RequestError::ConnectionAborted));
                aborted += 1;
            }
        }
        aborted
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    async fn execute(&self, request: HttpRequest) -> CallOutcome {
        let response = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.transport.execute(request)).await {
                Ok(result) => result,
                Err(_) => Err(RequestError::Timeout),
            },
            None => self.transport.execute(request).await,
        };

        match response {
            Ok(response) => interpret(response),
            Err(e) => CallOutcome::Failure(e),
        }
    }

    fn resolve(&self, id: CallId, outcome: CallOutcome) {
        let Some(call) = self.pending.lock().remove(&id) else {
            return;
        };
        if let Some(callback) = call.claim() {
            debug!(call = %id, success = outcome.is_success(), "Call resolved");
            run_callback(id, callback, outcome);
        }
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Map a raw response onto an outcome
pub(crate) fn interpret(response: HttpResponse) -> CallOutcome {
    if !response.is_success() {
        return CallOutcome::Failure(RequestError::Status {
            status: response.status,
            body: response.body,
        });
    }

    if response.body.trim().is_empty() {
        return CallOutcome::Success(Value::Null);
    }

    match serde_json::from_str(&response.body) {
        Ok(value) => CallOutcome::Success(value),
        Err(error) => CallOutcome::JsonParseError {
            raw: response.body,
            error,
        },
    }
}

fn run_callback(id: CallId, callback: Callback, outcome: CallOutcome) {
    if panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
        warn!(call = %id, "Call completion callback panicked");
    }
}
