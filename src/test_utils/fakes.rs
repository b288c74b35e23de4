use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::remote::CallbackExecutor;
use crate::remote::RequestCallback;
use crate::remote::ScheduledTimeout;
use crate::remote::TimeoutScheduler;
use crate::RequestError;

type Action = Box<dyn FnOnce() + Send>;

struct ManualEntry {
    delay: Duration,
    action: Option<Action>,
    cancelled: Arc<AtomicBool>,
}

/// Timeout scheduler whose actions only run when the test fires them.
#[derive(Default)]
pub struct ManualTimeoutScheduler {
    entries: Mutex<Vec<ManualEntry>>,
}

impl ManualTimeoutScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scheduled(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn cancelled(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.cancelled.load(Ordering::SeqCst))
            .count()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.entries.lock().iter().map(|e| e.delay).collect()
    }

    /// Runs every action that was neither cancelled nor fired before.
    /// Returns how many ran.
    pub fn fire_all(&self) -> usize {
        let actions: Vec<Action> = self
            .entries
            .lock()
            .iter_mut()
            .filter(|e| !e.cancelled.load(Ordering::SeqCst))
            .filter_map(|e| e.action.take())
            .collect();
        let fired = actions.len();
        for action in actions {
            action();
        }
        fired
    }
}

impl TimeoutScheduler for ManualTimeoutScheduler {
    fn schedule(
        &self,
        delay: Duration,
        action: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn ScheduledTimeout> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries.lock().push(ManualEntry {
            delay,
            action: Some(action),
            cancelled: cancelled.clone(),
        });
        Box::new(ManualHandle(cancelled))
    }
}

struct ManualHandle(Arc<AtomicBool>);

impl ScheduledTimeout for ManualHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Runs jobs inline and counts them.
#[derive(Default)]
pub struct CountingExecutor {
    executed: AtomicUsize,
}

impl CountingExecutor {
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

impl CallbackExecutor for CountingExecutor {
    fn execute(
        &self,
        job: Box<dyn FnOnce() + Send>,
    ) {
        self.executed.fetch_add(1, Ordering::SeqCst);
        job();
    }
}

/// Request callback that records every outcome it receives.
pub struct RecordingRequestCallback<R> {
    timeout: Duration,
    executor: Option<Arc<dyn CallbackExecutor>>,
    pub responses: Mutex<Vec<R>>,
    pub errors: Mutex<Vec<RequestError>>,
}

impl<R> RecordingRequestCallback<R> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            executor: None,
            responses: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_executor(
        mut self,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Self {
        self.executor = Some(executor);
        self
    }
}

impl<R: Send + 'static> RequestCallback<R> for RecordingRequestCallback<R> {
    fn executor(&self) -> Option<Arc<dyn CallbackExecutor>> {
        self.executor.clone()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn on_response(
        &self,
        response: R,
    ) {
        self.responses.lock().push(response);
    }

    fn on_exception(
        &self,
        error: RequestError,
    ) {
        self.errors.lock().push(error);
    }
}
