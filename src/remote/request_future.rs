use std::fmt;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::RequestCallback;
use super::ScheduledTimeout;
use super::TimeoutInnerTrigger;
use super::TimeoutScheduler;
use crate::utils::time::get_now_as_u128;
use crate::RequestError;

const PENDING: u8 = 0;
const DONE: u8 = 1;

/// Used by `get_timeout` when no explicit deadline is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
enum Outcome<R> {
    Response(R),
    Failed(RequestError),
    TimedOut(RequestError),
}

struct FutureInner<R> {
    connection_id: String,
    request_id: String,
    timestamp: u128,
    default_timeout: Duration,

    state: AtomicU8,
    outcome: Mutex<Option<Outcome<R>>>,
    completed: Condvar,

    callback: Option<Arc<dyn RequestCallback<R>>>,
    timeout_trigger: Option<Arc<dyn TimeoutInnerTrigger>>,
    scheduled_timeout: Mutex<Option<Box<dyn ScheduledTimeout>>>,
}

/// Outstanding request identified by `(connection_id, request_id)`.
///
/// Completion is a single `PENDING -> DONE` compare-and-swap: the first of
/// response, failure or timeout wins and every later setter is a no-op.
/// Clones share the same state.
pub struct RequestFuture<R> {
    inner: Arc<FutureInner<R>>,
}

impl<R> Clone for RequestFuture<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> fmt::Debug for RequestFuture<R> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RequestFuture")
            .field("connection_id", &self.inner.connection_id)
            .field("request_id", &self.inner.request_id)
            .field("done", &(self.inner.state.load(Ordering::Acquire) == DONE))
            .finish_non_exhaustive()
    }
}

pub struct RequestFutureBuilder<R> {
    connection_id: String,
    request_id: String,
    default_timeout: Duration,
    callback: Option<(Arc<dyn RequestCallback<R>>, Arc<dyn TimeoutScheduler>)>,
    timeout_trigger: Option<Arc<dyn TimeoutInnerTrigger>>,
}

impl<R> RequestFutureBuilder<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn default_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn timeout_trigger(
        mut self,
        trigger: Arc<dyn TimeoutInnerTrigger>,
    ) -> Self {
        self.timeout_trigger = Some(trigger);
        self
    }

    /// Switches the future to callback mode: `scheduler` arms the
    /// callback's timeout as soon as the future is built.
    pub fn callback(
        mut self,
        callback: Arc<dyn RequestCallback<R>>,
        scheduler: Arc<dyn TimeoutScheduler>,
    ) -> Self {
        self.callback = Some((callback, scheduler));
        self
    }

    pub fn build(self) -> RequestFuture<R> {
        let (callback, scheduler) = match self.callback {
            Some((callback, scheduler)) => (Some(callback), Some(scheduler)),
            None => (None, None),
        };

        let future = RequestFuture {
            inner: Arc::new(FutureInner {
                connection_id: self.connection_id,
                request_id: self.request_id,
                timestamp: get_now_as_u128(),
                default_timeout: self.default_timeout,
                state: AtomicU8::new(PENDING),
                outcome: Mutex::new(None),
                completed: Condvar::new(),
                callback,
                timeout_trigger: self.timeout_trigger,
                scheduled_timeout: Mutex::new(None),
            }),
        };

        if let (Some(callback), Some(scheduler)) = (&future.inner.callback, scheduler) {
            let timeout = callback.timeout();
            let target = future.clone();
            let handle = scheduler.schedule(
                timeout,
                Box::new(move || {
                    target.fire_timeout(timeout);
                }),
            );
            if future.is_done() {
                handle.cancel();
            } else {
                *future.inner.scheduled_timeout.lock() = Some(handle);
            }
        }

        future
    }
}

impl<R> RequestFuture<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn builder(
        connection_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> RequestFutureBuilder<R> {
        RequestFutureBuilder {
            connection_id: connection_id.into(),
            request_id: request_id.into(),
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            callback: None,
            timeout_trigger: None,
        }
    }

    /// Plain blocking-mode future.
    pub fn new(
        connection_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self::builder(connection_id, request_id).build()
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u128 {
        self.inner.timestamp
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == DONE
    }

    pub fn callback(&self) -> Option<&Arc<dyn RequestCallback<R>>> {
        self.inner.callback.as_ref()
    }

    /// Records the reply. Returns `false` if the future was already done.
    pub fn set_response(
        &self,
        response: R,
    ) -> bool {
        self.complete(Outcome::Response(response))
    }

    /// Records a failure. Returns `false` if the future was already done.
    pub fn set_fail_result(
        &self,
        error: RequestError,
    ) -> bool {
        self.complete(Outcome::Failed(error))
    }

    /// Blocks until the future completes.
    ///
    /// Returns `Ok(Some(response))` on reply and `Ok(None)` when a failure
    /// was recorded; failures are only surfaced as errors to callbacks.
    pub fn get(&self) -> Result<Option<R>, RequestError> {
        let mut slot = self.inner.outcome.lock();
        while slot.is_none() {
            self.inner.completed.wait(&mut slot);
        }
        Self::read((*slot).as_ref())
    }

    /// Blocks until the future completes or `timeout_ms` elapses. A
    /// non-positive value waits for the default timeout.
    ///
    /// On timeout the future is completed with [`RequestError::Timeout`],
    /// the timeout trigger runs and the error is returned.
    pub fn get_timeout(
        &self,
        timeout_ms: i64,
    ) -> Result<Option<R>, RequestError> {
        let timeout = if timeout_ms <= 0 {
            self.inner.default_timeout
        } else {
            Duration::from_millis(timeout_ms as u64)
        };
        let deadline = Instant::now() + timeout;

        let mut slot = self.inner.outcome.lock();
        while slot.is_none() {
            if !self.inner.completed.wait_until(&mut slot, deadline).timed_out() {
                continue;
            }
            if slot.is_some() {
                break;
            }

            // complete() needs the outcome lock
            drop(slot);
            if self.fire_timeout(timeout) {
                return Err(self.timeout_error(timeout));
            }
            slot = self.inner.outcome.lock();
            // Lost the race; the winner publishes its outcome shortly
            while slot.is_none() {
                self.inner.completed.wait(&mut slot);
            }
        }
        Self::read((*slot).as_ref())
    }

    fn read(outcome: Option<&Outcome<R>>) -> Result<Option<R>, RequestError> {
        match outcome {
            Some(Outcome::Response(response)) => Ok(Some(response.clone())),
            Some(Outcome::Failed(_)) | None => Ok(None),
            Some(Outcome::TimedOut(error)) => Err(error.clone()),
        }
    }

    fn timeout_error(
        &self,
        timeout: Duration,
    ) -> RequestError {
        RequestError::Timeout {
            connection_id: self.inner.connection_id.clone(),
            request_id: self.inner.request_id.clone(),
            timeout,
        }
    }

    fn fire_timeout(
        &self,
        timeout: Duration,
    ) -> bool {
        self.complete(Outcome::TimedOut(self.timeout_error(timeout)))
    }

    fn complete(
        &self,
        outcome: Outcome<R>,
    ) -> bool {
        if self
            .inner
            .state
            .compare_exchange(PENDING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(
                connection_id = %self.inner.connection_id,
                request_id = %self.inner.request_id,
                "request future already completed"
            );
            return false;
        }

        *self.inner.outcome.lock() = Some(outcome.clone());
        self.inner.completed.notify_all();

        let timed_out = matches!(outcome, Outcome::TimedOut(_));
        if timed_out {
            debug!(
                connection_id = %self.inner.connection_id,
                request_id = %self.inner.request_id,
                "request timed out"
            );
            if let Some(trigger) = &self.inner.timeout_trigger {
                trigger.trigger_on_timeout();
            }
        } else if let Some(handle) = self.inner.scheduled_timeout.lock().take() {
            handle.cancel();
        }

        self.notify_callback(outcome);
        true
    }

    fn notify_callback(
        &self,
        outcome: Outcome<R>,
    ) {
        let Some(callback) = self.inner.callback.clone() else {
            return;
        };
        let executor = callback.executor();
        let job = move || match outcome {
            Outcome::Response(response) => callback.on_response(response),
            Outcome::Failed(error) | Outcome::TimedOut(error) => callback.on_exception(error),
        };
        match executor {
            Some(executor) => executor.execute(Box::new(job)),
            None => job(),
        }
    }
}
