use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::DelayTask;
use super::ProcessOutcome;
use super::TaskKey;
use super::TaskProcessor;

/// Per-key state guarded by the map shard lock.
///
/// Merging, claiming and the post-execution re-check all go through the
/// same entry, so a task merged while the key is processing can never be
/// lost between "execution finished" and "slot removed".
#[derive(Debug)]
struct TaskSlot<T> {
    pending: Option<T>,
    processing: bool,
}

#[derive(Debug)]
struct EngineInner<K: TaskKey, T: DelayTask> {
    name: &'static str,
    tasks: DashMap<K, TaskSlot<T>>,
    process_interval: Duration,
}

/// Keyed debounce scheduler.
///
/// Cloning is cheap; every clone submits into the same task table, which
/// lets processors hold a handle for re-submission (retries).
#[derive(Debug)]
pub struct DelayTaskEngine<K: TaskKey, T: DelayTask> {
    inner: Arc<EngineInner<K, T>>,
}

impl<K: TaskKey, T: DelayTask> Clone for DelayTaskEngine<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: TaskKey, T: DelayTask> DelayTaskEngine<K, T> {
    pub fn new(
        name: &'static str,
        process_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                name,
                tasks: DashMap::new(),
                process_interval,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Submits `task` under `key`, merging it into the pending task if one
    /// exists.
    ///
    /// The merged task keeps the earlier debounce start, so a steady stream
    /// of events cannot postpone execution indefinitely.
    pub fn add_task(
        &self,
        key: K,
        task: T,
    ) {
        match self.inner.tasks.entry(key) {
            Entry::Occupied(mut entry) => {
                trace!(engine = self.inner.name, key = ?entry.key(), "merging delay task");
                let slot = entry.get_mut();
                match slot.pending.as_mut() {
                    Some(existing) => existing.merge(task),
                    None => slot.pending = Some(task),
                }
            }
            Entry::Vacant(entry) => {
                trace!(engine = self.inner.name, key = ?entry.key(), "new delay task");
                entry.insert(TaskSlot {
                    pending: Some(task),
                    processing: false,
                });
            }
        }
    }

    /// Drops the pending task for `key`, if any. An execution already in
    /// flight is not affected.
    pub fn remove_task(
        &self,
        key: &K,
    ) -> Option<T> {
        let mut removed = None;
        self.inner.tasks.remove_if_mut(key, |_, slot| {
            removed = slot.pending.take();
            !slot.processing
        });
        removed
    }

    /// Whether a task is pending for `key`.
    pub fn contains(
        &self,
        key: &K,
    ) -> bool {
        self.inner
            .tasks
            .get(key)
            .map(|slot| slot.pending.is_some())
            .unwrap_or(false)
    }

    /// Whether an execution for `key` is in flight.
    pub fn is_processing(
        &self,
        key: &K,
    ) -> bool {
        self.inner.tasks.get(key).map(|slot| slot.processing).unwrap_or(false)
    }

    /// Number of keys with a pending task.
    pub fn len(&self) -> usize {
        self.inner.tasks.iter().filter(|slot| slot.pending.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task_keys(&self) -> Vec<K> {
        self.inner
            .tasks
            .iter()
            .filter(|slot| slot.pending.is_some())
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Claims every due task whose key is idle and marks those keys as
    /// processing.
    fn claim_due_tasks(&self) -> Vec<(K, T)> {
        let now = Instant::now();
        let mut claimed = Vec::new();

        for mut entry in self.inner.tasks.iter_mut() {
            let (key, slot) = entry.pair_mut();
            if slot.processing {
                continue;
            }
            let due = slot
                .pending
                .as_ref()
                .map(|task| task.should_process(now))
                .unwrap_or(false);
            if !due {
                continue;
            }
            if let Some(task) = slot.pending.take() {
                slot.processing = true;
                claimed.push((key.clone(), task));
            }
        }

        claimed
    }

    /// Clears the processing mark; the slot is dropped only when nothing
    /// was merged in while the execution ran.
    fn finish(
        &self,
        key: &K,
    ) {
        self.inner.tasks.remove_if_mut(key, |_, slot| {
            slot.processing = false;
            slot.pending.is_none()
        });
    }

    async fn execute(
        &self,
        processor: &dyn TaskProcessor<K, T>,
        key: K,
        task: T,
    ) {
        let _guard = ProcessingGuard {
            engine: self,
            key: key.clone(),
        };

        debug!(engine = self.inner.name, ?key, "processing delay task");
        if let ProcessOutcome::Retry(task) = processor.process(key.clone(), task).await {
            debug!(engine = self.inner.name, ?key, "processor handed task back");
            self.add_task(key, task);
        }
    }

    /// Runs one scan synchronously: claims every due task and awaits all
    /// executions.
    pub async fn process_now(
        &self,
        processor: &dyn TaskProcessor<K, T>,
    ) -> usize {
        let claimed = self.claim_due_tasks();
        let count = claimed.len();
        join_all(
            claimed
                .into_iter()
                .map(|(key, task)| self.execute(processor, key, task)),
        )
        .await;
        count
    }

    /// Spawns the scan loop. Each due task runs on its own tokio task so a
    /// slow key never delays others.
    ///
    /// The loop exits when `shutdown` fires; tasks still pending at that
    /// point are dropped.
    pub fn start(
        &self,
        processor: Arc<dyn TaskProcessor<K, T>>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.inner.process_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                engine = engine.inner.name,
                interval = ?engine.inner.process_interval,
                "delay task engine started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        let dropped = engine.len();
                        if dropped > 0 {
                            warn!(engine = engine.inner.name, dropped, "shutting down with pending tasks");
                        }
                        engine.inner.tasks.clear();
                        info!(engine = engine.inner.name, "delay task engine stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        for (key, task) in engine.claim_due_tasks() {
                            let engine = engine.clone();
                            let processor = processor.clone();
                            tokio::spawn(async move {
                                engine.execute(processor.as_ref(), key, task).await;
                            });
                        }
                    }
                }
            }
        })
    }
}

/// Releases the key's processing mark even if the processor panics.
struct ProcessingGuard<'a, K: TaskKey, T: DelayTask> {
    engine: &'a DelayTaskEngine<K, T>,
    key: K,
}

impl<K: TaskKey, T: DelayTask> Drop for ProcessingGuard<'_, K, T> {
    fn drop(&mut self) {
        self.engine.finish(&self.key);
    }
}
