//! Runtime plumbing for callers outside an async context.
//!
//! Background tasks (bus listener, SWR refreshes) spawn onto the ambient
//! tokio runtime when one exists; otherwise a small process-wide runtime
//! is initialized lazily and shared. Blocking dispatch runs on the same
//! shared runtime.

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

static GLOBAL_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn global_runtime() -> &'static Runtime {
    GLOBAL_RUNTIME.get_or_init(|| {
        debug!("Initializing shared cache runtime");
        Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tiercache-worker")
            .enable_all()
            .build()
            .expect("CRITICAL: failed to initialize the shared cache runtime")
    })
}

/// Spawns onto the ambient runtime, or the shared one when called from
/// synchronous code.
pub(crate) fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(h) => h.spawn(future),
        Err(_) => global_runtime().spawn(future),
    }
}

/// Runs a future to completion from synchronous code.
///
/// Returns `None` when called from inside an async context, since blocking a
/// runtime worker on another future would deadlock, so the caller gets a
/// configuration error instead.
pub(crate) fn block_on<F: Future>(future: F) -> Option<F::Output> {
    if Handle::try_current().is_ok() {
        return None;
    }
    Some(global_runtime().block_on(future))
}
