use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::CallbackExecutor;
use super::ScheduledTimeout;
use super::TimeoutScheduler;

/// Timeout scheduler backed by a tokio runtime.
///
/// Holds a runtime [`Handle`] so timeouts can be scheduled from threads
/// that are not runtime workers (transport callbacks).
#[derive(Debug, Clone)]
pub struct TokioTimeoutScheduler {
    handle: Handle,
}

impl TokioTimeoutScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime of the calling task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl TimeoutScheduler for TokioTimeoutScheduler {
    fn schedule(
        &self,
        delay: Duration,
        action: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn ScheduledTimeout> {
        let handle = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        Box::new(TokioScheduledTimeout(handle))
    }
}

struct TokioScheduledTimeout(JoinHandle<()>);

impl ScheduledTimeout for TokioScheduledTimeout {
    fn cancel(&self) {
        self.0.abort();
    }
}

/// Delivers callbacks on the tokio blocking pool.
#[derive(Debug, Clone)]
pub struct TokioCallbackExecutor {
    handle: Handle,
}

impl TokioCallbackExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl CallbackExecutor for TokioCallbackExecutor {
    fn execute(
        &self,
        job: Box<dyn FnOnce() + Send>,
    ) {
        self.handle.spawn_blocking(job);
    }
}
