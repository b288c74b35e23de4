use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::PushCallback;
use super::PushDelayTask;
use super::PushRequest;
use super::PushTransport;
use super::ServiceStorage;
use super::SubscriberIndex;
use crate::metrics::PushKind;
use crate::metrics::PushMetrics;
use crate::task::DelayTaskEngine;
use crate::task::ProcessOutcome;
use crate::task::TaskProcessor;
use crate::PushConfig;
use crate::PushError;
use crate::ServiceKey;

pub type PushDelayTaskEngine = DelayTaskEngine<ServiceKey, PushDelayTask>;

/// Collaborators shared by every push execution and its callbacks.
pub struct PushContext {
    pub config: PushConfig,
    pub engine: PushDelayTaskEngine,
    pub subscribers: Arc<dyn SubscriberIndex>,
    pub storage: Arc<dyn ServiceStorage>,
    pub transport: Arc<dyn PushTransport>,
    pub metrics: PushMetrics,
}

/// One execution of a merged [`PushDelayTask`].
pub struct PushExecuteTask {
    service: ServiceKey,
    task: PushDelayTask,
    ctx: Arc<PushContext>,
}

impl PushExecuteTask {
    pub fn new(
        service: ServiceKey,
        task: PushDelayTask,
        ctx: Arc<PushContext>,
    ) -> Self {
        Self { service, task, ctx }
    }

    /// Resolves targets and hands one delivery per subscriber to the
    /// transport.
    ///
    /// Lookup failures hand the whole task back with the retry delay;
    /// delivery failures are retried per client by [`ServicePushCallback`].
    pub fn run(self) -> ProcessOutcome<PushDelayTask> {
        if !self.ctx.config.push_enabled {
            debug!(service = %self.service, "push disabled, dropping task");
            return ProcessOutcome::Done;
        }

        let subscribers = match self.ctx.subscribers.subscribers_for_service(&self.service) {
            Ok(subscribers) => subscribers,
            Err(e) => return self.retry_later(e),
        };
        let targets: Vec<_> = subscribers
            .into_iter()
            .filter(|s| self.task.target().includes(&s.client_id))
            .collect();
        if targets.is_empty() {
            trace!(service = %self.service, "no subscriber targeted");
            return ProcessOutcome::Done;
        }

        let payload = match self.ctx.storage.push_payload(&self.service) {
            Ok(payload) => payload,
            Err(e) => return self.retry_later(e),
        };

        debug!(
            service = %self.service,
            revision = payload.revision,
            targets = targets.len(),
            "pushing service change"
        );
        for subscriber in targets {
            let client_id = subscriber.client_id.clone();
            let callback = Arc::new(ServicePushCallback {
                service: self.service.clone(),
                client_id: client_id.clone(),
                retry_count: self.task.retry_count(),
                ctx: self.ctx.clone(),
            });
            self.ctx.transport.do_push_with_callback(
                &client_id,
                PushRequest::ServiceChanged {
                    subscriber,
                    payload: payload.clone(),
                },
                callback,
            );
        }
        ProcessOutcome::Done
    }

    fn retry_later(
        self,
        error: crate::Error,
    ) -> ProcessOutcome<PushDelayTask> {
        warn!(service = %self.service, %error, "failed to resolve push, retrying");
        let retry = PushDelayTask::new(
            self.service,
            self.task.target().clone(),
            self.ctx.config.push_task_retry_delay(),
        )
        .with_retry_count(self.task.retry_count());
        ProcessOutcome::Retry(retry)
    }
}

/// Records the outcome of one delivery and schedules a retry for that
/// client when the failure allows it.
pub struct ServicePushCallback {
    service: ServiceKey,
    client_id: String,
    /// Re-pushes already made for the task this delivery came from
    retry_count: u32,
    ctx: Arc<PushContext>,
}

impl PushCallback for ServicePushCallback {
    fn timeout(&self) -> Duration {
        self.ctx.config.push_task_timeout()
    }

    fn on_success(&self) {
        self.ctx.metrics.record_success(PushKind::Service);
        trace!(service = %self.service, client_id = %self.client_id, "push acknowledged");
    }

    fn on_fail(
        &self,
        error: PushError,
    ) {
        self.ctx.metrics.record_failure(PushKind::Service);
        if !error.is_retryable() {
            info!(service = %self.service, client_id = %self.client_id, %error, "push dropped");
            return;
        }
        if self.ctx.config.retries_exhausted(self.retry_count) {
            warn!(
                service = %self.service,
                client_id = %self.client_id,
                retry_count = self.retry_count,
                %error,
                "max re-push times reached, push dropped"
            );
            return;
        }
        warn!(service = %self.service, client_id = %self.client_id, %error, "push failed, retrying");
        self.ctx.engine.add_task(
            self.service.clone(),
            PushDelayTask::for_client(
                self.service.clone(),
                self.client_id.clone(),
                self.ctx.config.push_task_retry_delay(),
            )
            .with_retry_count(self.retry_count.saturating_add(1)),
        );
    }
}

/// Adapts [`PushExecuteTask`] to the delay-task engine.
pub struct PushDelayTaskProcessor {
    ctx: Arc<PushContext>,
}

impl PushDelayTaskProcessor {
    pub fn new(ctx: Arc<PushContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor<ServiceKey, PushDelayTask> for PushDelayTaskProcessor {
    async fn process(
        &self,
        key: ServiceKey,
        task: PushDelayTask,
    ) -> ProcessOutcome<PushDelayTask> {
        PushExecuteTask::new(key, task, self.ctx.clone()).run()
    }
}

/// Entry point of the service push path: debounces change events and runs
/// pushes on the delay-task engine.
#[derive(Clone)]
pub struct PushDelayTaskExecuteEngine {
    ctx: Arc<PushContext>,
    processor: Arc<PushDelayTaskProcessor>,
}

impl PushDelayTaskExecuteEngine {
    pub fn new(
        config: PushConfig,
        subscribers: Arc<dyn SubscriberIndex>,
        storage: Arc<dyn ServiceStorage>,
        transport: Arc<dyn PushTransport>,
        metrics: PushMetrics,
    ) -> Self {
        let engine = DelayTaskEngine::new("service-push", config.task_process_interval());
        let ctx = Arc::new(PushContext {
            config,
            engine,
            subscribers,
            storage,
            transport,
            metrics,
        });
        Self {
            processor: Arc::new(PushDelayTaskProcessor::new(ctx.clone())),
            ctx,
        }
    }

    pub fn engine(&self) -> &PushDelayTaskEngine {
        &self.ctx.engine
    }

    pub fn add_task(
        &self,
        service: ServiceKey,
        task: PushDelayTask,
    ) {
        self.ctx.engine.add_task(service, task);
    }

    /// Schedules a push of `service` to all of its subscribers.
    pub fn notify_service_changed(
        &self,
        service: ServiceKey,
    ) {
        let task = PushDelayTask::push_to_all(service.clone(), self.ctx.config.push_task_delay());
        self.add_task(service, task);
    }

    /// Schedules a push of `service` to one client, typically right after
    /// it subscribed.
    pub fn notify_subscriber(
        &self,
        service: ServiceKey,
        client_id: impl Into<String>,
    ) {
        let task = PushDelayTask::for_client(service.clone(), client_id, self.ctx.config.push_task_delay());
        self.add_task(service, task);
    }

    /// Runs every due push once and waits for the executions.
    pub async fn process_now(&self) -> usize {
        self.ctx.engine.process_now(self.processor.as_ref()).await
    }

    pub fn start(
        &self,
        shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        self.ctx.engine.start(self.processor.clone(), shutdown)
    }
}
