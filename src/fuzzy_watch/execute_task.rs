use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::FuzzyWatchSyncNotifyTask;
use super::FuzzyWatchTaskKey;
use super::NotifyType;
use crate::metrics::PushKind;
use crate::metrics::PushMetrics;
use crate::push::PushCallback;
use crate::push::PushRequest;
use crate::push::PushTransport;
use crate::task::DelayTaskEngine;
use crate::task::ProcessOutcome;
use crate::task::TaskProcessor;
use crate::FuzzyWatchConfig;
use crate::PushError;

pub type FuzzyWatchSyncEngine = DelayTaskEngine<FuzzyWatchTaskKey, FuzzyWatchSyncNotifyTask>;

/// Collaborators shared by sync executions and their callbacks.
pub struct FuzzyWatchContext {
    pub config: FuzzyWatchConfig,
    pub engine: FuzzyWatchSyncEngine,
    pub transport: Arc<dyn PushTransport>,
    pub metrics: PushMetrics,
}

/// Delivers one sync task to its client.
pub struct FuzzyWatchSyncNotifyExecuteTask {
    task: FuzzyWatchSyncNotifyTask,
    ctx: Arc<FuzzyWatchContext>,
}

impl FuzzyWatchSyncNotifyExecuteTask {
    pub fn new(
        task: FuzzyWatchSyncNotifyTask,
        ctx: Arc<FuzzyWatchContext>,
    ) -> Self {
        Self { task, ctx }
    }

    pub fn run(self) {
        debug!(
            client_id = self.task.client_id(),
            pattern = self.task.pattern(),
            notify_type = self.task.notify_type().as_str(),
            batch = self.task.current_batch(),
            total = self.task.total_batch(),
            "pushing fuzzy watch sync"
        );
        let client_id = self.task.client_id().to_string();
        let request = PushRequest::FuzzyWatchSync(self.task.to_request());
        let callback = Arc::new(FuzzyWatchSyncNotifyCallback {
            task: self.task,
            ctx: self.ctx.clone(),
        });
        self.ctx.transport.do_push_with_callback(&client_id, request, callback);
    }
}

/// Tracks init batches and re-enqueues failed syncs.
pub struct FuzzyWatchSyncNotifyCallback {
    task: FuzzyWatchSyncNotifyTask,
    ctx: Arc<FuzzyWatchContext>,
}

impl PushCallback for FuzzyWatchSyncNotifyCallback {
    fn timeout(&self) -> Duration {
        self.ctx.config.notify_timeout()
    }

    fn on_success(&self) {
        self.ctx.metrics.record_success(PushKind::FuzzyWatch);
        if self.task.notify_type() != NotifyType::InitNotify {
            return;
        }
        let Some(counter) = self.task.counter() else {
            return;
        };

        counter.batch_success(self.task.current_batch());
        if counter.batch_completed() && counter.try_claim_completion() {
            info!(
                client_id = self.task.client_id(),
                pattern = self.task.pattern(),
                batches = counter.total(),
                "fuzzy watch init synced"
            );
            let finish = FuzzyWatchSyncNotifyTask::finish_init(
                self.task.client_id(),
                self.task.pattern(),
                self.ctx.config.notify_delay(),
            );
            self.ctx.engine.add_task(finish.key(), finish);
        }
    }

    fn on_fail(
        &self,
        error: PushError,
    ) {
        self.ctx.metrics.record_failure(PushKind::FuzzyWatch);
        if !error.is_retryable() {
            info!(
                client_id = self.task.client_id(),
                pattern = self.task.pattern(),
                %error,
                "fuzzy watch sync dropped"
            );
            return;
        }
        if self.ctx.config.retries_exhausted(self.task.retry_count()) {
            warn!(
                client_id = self.task.client_id(),
                pattern = self.task.pattern(),
                notify_type = self.task.notify_type().as_str(),
                retry_count = self.task.retry_count(),
                %error,
                "fuzzy watch sync retried too many times, dropped"
            );
            return;
        }
        warn!(
            client_id = self.task.client_id(),
            pattern = self.task.pattern(),
            notify_type = self.task.notify_type().as_str(),
            %error,
            "fuzzy watch sync failed, retrying"
        );
        let retry = self.task.rescheduled(self.ctx.config.notify_retry_delay());
        self.ctx.engine.add_task(retry.key(), retry);
    }
}

pub struct FuzzyWatchSyncNotifyProcessor {
    ctx: Arc<FuzzyWatchContext>,
}

impl FuzzyWatchSyncNotifyProcessor {
    pub fn new(ctx: Arc<FuzzyWatchContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor<FuzzyWatchTaskKey, FuzzyWatchSyncNotifyTask> for FuzzyWatchSyncNotifyProcessor {
    async fn process(
        &self,
        _key: FuzzyWatchTaskKey,
        task: FuzzyWatchSyncNotifyTask,
    ) -> ProcessOutcome<FuzzyWatchSyncNotifyTask> {
        FuzzyWatchSyncNotifyExecuteTask::new(task, self.ctx.clone()).run();
        ProcessOutcome::Done
    }
}
