//! Request context carried across spawned transport calls.
//!
//! The context lives in a `tokio::task_local!` slot, which a freshly spawned
//! task does not inherit. [`spawn_in_context`] captures the caller's context
//! and installs it in the spawned task before the task's future is polled,
//! so callbacks that run there see the same context as the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

/// Headers propagated from the caller to every remote request it causes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The propagated headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The context of the current task, if one is installed.
    #[inline]
    pub fn current() -> Option<Arc<Self>> {
        CURRENT.try_with(Arc::clone).ok()
    }

    /// Run `future` with this context installed.
    pub async fn scope<F: Future>(self: Arc<Self>, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// Run `f` with this context installed.
    pub fn sync_scope<R>(self: Arc<Self>, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }
}

/// Spawn `future` on the runtime with the caller's context restored inside it.
pub fn spawn_in_context<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match RequestContext::current() {
        Some(context) => tokio::spawn(CURRENT.scope(context, future)),
        None => tokio::spawn(future),
    }
}
