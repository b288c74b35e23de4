//! Keyed delay tasks.
//!
//! Domain events are not pushed immediately. They are submitted as delay
//! tasks under a logical key (a service, or a client's wildcard watch slot)
//! and coalesced by [`DelayTaskEngine`] until the task's debounce window
//! elapses. The engine then hands the merged task to a [`TaskProcessor`],
//! never running two executions for the same key at once.

mod batch_counter;
mod engine;

pub use batch_counter::*;
pub use engine::*;

#[cfg(test)]
mod batch_counter_test;

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Identity of a debounce bucket.
pub trait TaskKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<K> TaskKey for K where K: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// A pending intent that can absorb later intents for the same key.
pub trait DelayTask: Debug + Send + Sync + 'static {
    /// Folds a newer task for the same key into this one.
    fn merge(
        &mut self,
        newer: Self,
    ) where
        Self: Sized;

    /// Instant the debounce window is measured from.
    fn last_process_time(&self) -> Instant;

    /// Debounce window.
    fn task_interval(&self) -> Duration;

    fn should_process(
        &self,
        now: Instant,
    ) -> bool {
        now.saturating_duration_since(self.last_process_time()) >= self.task_interval()
    }
}

#[derive(Debug)]
pub enum ProcessOutcome<T> {
    /// The task was consumed; any retry was scheduled by the processor itself
    Done,
    /// Hands the task back to the engine, which merges it with anything
    /// submitted in the meantime and runs it again on a later scan
    Retry(T),
}

/// Executes the task claimed for one key.
#[async_trait]
pub trait TaskProcessor<K, T>: Send + Sync + 'static
where
    K: TaskKey,
    T: DelayTask,
{
    async fn process(
        &self,
        key: K,
        task: T,
    ) -> ProcessOutcome<T>;
}
