use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::task::BatchTaskCounter;
use crate::task::DelayTask;
use crate::ChangeType;
use crate::ServiceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyType {
    /// First sync of a newly registered watch
    InitNotify,
    /// Incremental change of an established watch
    DiffSyncNotify,
    /// Every init batch was acknowledged
    FinishInitNotify,
}

impl NotifyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyType::InitNotify => "FUZZY_WATCH_INIT_NOTIFY",
            NotifyType::DiffSyncNotify => "FUZZY_WATCH_DIFF_SYNC_NOTIFY",
            NotifyType::FinishInitNotify => "FINISH_FUZZY_WATCH_INIT_NOTIFY",
        }
    }
}

/// One matched service and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub service: ServiceKey,
    pub change_type: ChangeType,
}

/// Debounce slot of a sync task. Batches of the same sync get distinct
/// slots so they are never coalesced into one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzyWatchTaskKey {
    pub client_id: String,
    pub pattern: String,
    pub notify_type: NotifyType,
    /// 1-based batch index, 0 for unbatched tasks
    pub batch: usize,
}

/// Message delivered to the watching client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyWatchSyncRequest {
    pub pattern: String,
    pub notify_type: NotifyType,
    pub contexts: Vec<SyncContext>,
    pub current_batch: usize,
    pub total_batch: usize,
}

#[derive(Debug, Clone)]
pub struct FuzzyWatchSyncNotifyTask {
    client_id: String,
    pattern: String,
    notify_type: NotifyType,
    contexts: BTreeMap<ServiceKey, ChangeType>,
    current_batch: usize,
    total_batch: usize,
    counter: Option<Arc<BatchTaskCounter>>,
    retry_count: u32,
    last_process_time: Instant,
    task_interval: Duration,
}

impl FuzzyWatchSyncNotifyTask {
    /// A sync batch. `counter` is shared by every batch of one init sync.
    #[allow(clippy::too_many_arguments)]
    pub fn batch(
        client_id: impl Into<String>,
        pattern: impl Into<String>,
        notify_type: NotifyType,
        contexts: impl IntoIterator<Item = SyncContext>,
        current_batch: usize,
        total_batch: usize,
        counter: Option<Arc<BatchTaskCounter>>,
        delay: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            pattern: pattern.into(),
            notify_type,
            contexts: contexts
                .into_iter()
                .map(|c| (c.service, c.change_type))
                .collect(),
            current_batch,
            total_batch,
            counter,
            retry_count: 0,
            last_process_time: Instant::now(),
            task_interval: delay,
        }
    }

    /// A single incremental change, outside any batched sync.
    pub fn diff(
        client_id: impl Into<String>,
        pattern: impl Into<String>,
        service: ServiceKey,
        change_type: ChangeType,
        delay: Duration,
    ) -> Self {
        let context = SyncContext { service, change_type };
        Self::batch(client_id, pattern, NotifyType::DiffSyncNotify, [context], 1, 1, None, delay)
    }

    /// Marker telling the client its init sync is complete.
    pub fn finish_init(
        client_id: impl Into<String>,
        pattern: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self::batch(client_id, pattern, NotifyType::FinishInitNotify, [], 0, 0, None, delay)
    }

    pub fn key(&self) -> FuzzyWatchTaskKey {
        FuzzyWatchTaskKey {
            client_id: self.client_id.clone(),
            pattern: self.pattern.clone(),
            notify_type: self.notify_type,
            batch: if self.total_batch > 1 { self.current_batch } else { 0 },
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn notify_type(&self) -> NotifyType {
        self.notify_type
    }

    pub fn current_batch(&self) -> usize {
        self.current_batch
    }

    pub fn total_batch(&self) -> usize {
        self.total_batch
    }

    pub fn counter(&self) -> Option<&Arc<BatchTaskCounter>> {
        self.counter.as_ref()
    }

    /// Times this task was re-sent after a failed delivery.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn contexts(&self) -> Vec<SyncContext> {
        self.contexts
            .iter()
            .map(|(service, change_type)| SyncContext {
                service: service.clone(),
                change_type: *change_type,
            })
            .collect()
    }

    /// The same task as a retry, due again after `delay`.
    pub fn rescheduled(
        &self,
        delay: Duration,
    ) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            last_process_time: Instant::now(),
            task_interval: delay,
            ..self.clone()
        }
    }

    pub fn to_request(&self) -> FuzzyWatchSyncRequest {
        FuzzyWatchSyncRequest {
            pattern: self.pattern.clone(),
            notify_type: self.notify_type,
            contexts: self.contexts(),
            current_batch: self.current_batch,
            total_batch: self.total_batch,
        }
    }
}

impl DelayTask for FuzzyWatchSyncNotifyTask {
    /// Later change types win per service. Batch bookkeeping follows the
    /// newer task only when it belongs to a tracked batch.
    fn merge(
        &mut self,
        newer: Self,
    ) {
        let newer_due = newer.last_process_time + newer.task_interval;
        if newer_due < self.last_process_time + self.task_interval {
            self.last_process_time = newer.last_process_time;
            self.task_interval = newer.task_interval;
        }
        self.retry_count = self.retry_count.max(newer.retry_count);
        if newer.counter.is_some() {
            self.current_batch = newer.current_batch;
            self.total_batch = newer.total_batch;
            self.counter = newer.counter;
        }
        self.contexts.extend(newer.contexts);
    }

    fn last_process_time(&self) -> Instant {
        self.last_process_time
    }

    fn task_interval(&self) -> Duration {
        self.task_interval
    }
}
