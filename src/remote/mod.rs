//! Request/response correlation.
//!
//! A [`RequestFuture`] is created when a request is sent and completed when
//! the reply, a failure, or its timeout arrives, whichever comes first.
//! Callers either block on it or register a [`RequestCallback`]. Timers
//! and callback threads are injected through [`TimeoutScheduler`] and
//! [`CallbackExecutor`] so tests can drive timeouts without wall-clock
//! waits.

mod future_table;
mod request_future;
mod timeout;

pub use future_table::*;
pub use request_future::*;
pub use timeout::*;


use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::RequestError;

/// Receives the outcome of a callback-mode [`RequestFuture`].
pub trait RequestCallback<R>: Send + Sync + 'static {
    /// Executor the outcome is delivered on; `None` runs the callback on
    /// the completing thread.
    fn executor(&self) -> Option<Arc<dyn CallbackExecutor>> {
        None
    }

    /// Deadline counted from the moment the future is built.
    fn timeout(&self) -> Duration;

    fn on_response(
        &self,
        response: R,
    );

    fn on_exception(
        &self,
        error: RequestError,
    );
}

/// Hook run when a future is completed by its timeout, typically to drop
/// it from a waiting table.
#[cfg_attr(test, automock)]
pub trait TimeoutInnerTrigger: Send + Sync + 'static {
    fn trigger_on_timeout(&self);
}

/// Runs callback jobs off the completing thread.
pub trait CallbackExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        job: Box<dyn FnOnce() + Send>,
    );
}

/// Schedules a one-shot timeout action.
pub trait TimeoutScheduler: Send + Sync + 'static {
    fn schedule(
        &self,
        delay: Duration,
        action: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn ScheduledTimeout>;
}

/// Handle to a scheduled timeout action.
pub trait ScheduledTimeout: Send + Sync {
    /// Prevents the action from running if it has not started yet.
    fn cancel(&self);
}
