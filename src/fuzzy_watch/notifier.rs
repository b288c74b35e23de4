use std::collections::BTreeSet;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use super::FuzzyGroupKeyPattern;
use super::FuzzyWatchContext;
use super::FuzzyWatchSyncEngine;
use super::FuzzyWatchSyncNotifyProcessor;
use super::FuzzyWatchSyncNotifyTask;
use super::NotifyType;
use super::SyncContext;
use crate::metrics::PushMetrics;
use crate::push::PushTransport;
use crate::task::BatchTaskCounter;
use crate::task::DelayTaskEngine;
use crate::ChangeType;
use crate::FuzzyWatchConfig;
use crate::Result;
use crate::ServiceKey;

/// Read side of the wildcard watch registry.
#[cfg_attr(test, automock)]
pub trait FuzzyWatchIndex: Send + Sync + 'static {
    /// Services currently matched by `pattern`.
    fn matched_service_keys(
        &self,
        pattern: &FuzzyGroupKeyPattern,
    ) -> Result<BTreeSet<ServiceKey>>;

    /// Every registered pattern with the clients watching it.
    fn watchers_by_pattern(&self) -> Vec<(FuzzyGroupKeyPattern, Vec<String>)>;
}

/// Entry point of the fuzzy watch path: turns registrations and service
/// changes into sync tasks on the delay-task engine.
#[derive(Clone)]
pub struct FuzzyWatchSyncNotifier {
    ctx: Arc<FuzzyWatchContext>,
    index: Arc<dyn FuzzyWatchIndex>,
    processor: Arc<FuzzyWatchSyncNotifyProcessor>,
}

impl FuzzyWatchSyncNotifier {
    pub fn new(
        config: FuzzyWatchConfig,
        index: Arc<dyn FuzzyWatchIndex>,
        transport: Arc<dyn PushTransport>,
        metrics: PushMetrics,
    ) -> Self {
        let engine = DelayTaskEngine::new("fuzzy-watch-sync", config.task_process_interval());
        let ctx = Arc::new(FuzzyWatchContext {
            config,
            engine,
            transport,
            metrics,
        });
        Self {
            processor: Arc::new(FuzzyWatchSyncNotifyProcessor::new(ctx.clone())),
            index,
            ctx,
        }
    }

    pub fn engine(&self) -> &FuzzyWatchSyncEngine {
        &self.ctx.engine
    }

    /// Syncs a client's watch on `pattern` given the keys it already holds.
    ///
    /// Matched keys the client lacks are sent as `Add`, held keys no longer
    /// matched as `Delete`, split into batches of `batch_size`. An
    /// initializing watch with nothing to sync gets the finish marker
    /// directly. Returns the number of tasks enqueued.
    pub fn on_fuzzy_watch(
        &self,
        client_id: &str,
        pattern: &str,
        client_existing_keys: &BTreeSet<ServiceKey>,
        initializing: bool,
    ) -> Result<usize> {
        let parsed = FuzzyGroupKeyPattern::parse(pattern)?;
        let matched = self.index.matched_service_keys(&parsed)?;
        let config = &self.ctx.config;

        let diff: Vec<SyncContext> = matched
            .difference(client_existing_keys)
            .map(|service| SyncContext {
                service: service.clone(),
                change_type: ChangeType::Add,
            })
            .chain(client_existing_keys.difference(&matched).map(|service| SyncContext {
                service: service.clone(),
                change_type: ChangeType::Delete,
            }))
            .collect();

        if diff.is_empty() {
            if initializing {
                let finish = FuzzyWatchSyncNotifyTask::finish_init(client_id, pattern, config.notify_delay());
                self.ctx.engine.add_task(finish.key(), finish);
                return Ok(1);
            }
            trace!(client_id, pattern, "fuzzy watch already in sync");
            return Ok(0);
        }

        let notify_type = if initializing {
            NotifyType::InitNotify
        } else {
            NotifyType::DiffSyncNotify
        };
        let batches: Vec<&[SyncContext]> = diff.chunks(config.batch_size.max(1)).collect();
        let total = batches.len();
        let counter = initializing.then(|| Arc::new(BatchTaskCounter::new(total)));

        for (idx, contexts) in batches.into_iter().enumerate() {
            let task = FuzzyWatchSyncNotifyTask::batch(
                client_id,
                pattern,
                notify_type,
                contexts.to_vec(),
                idx + 1,
                total,
                counter.clone(),
                config.notify_delay(),
            );
            self.ctx.engine.add_task(task.key(), task);
        }
        debug!(
            client_id,
            pattern,
            notify_type = notify_type.as_str(),
            changes = diff.len(),
            batches = total,
            "fuzzy watch sync scheduled"
        );
        Ok(total)
    }

    /// Notifies every client watching a pattern that matches `service`.
    /// Returns the number of tasks enqueued.
    pub fn on_service_changed(
        &self,
        service: &ServiceKey,
        change_type: ChangeType,
    ) -> usize {
        let mut enqueued = 0;
        for (pattern, clients) in self.index.watchers_by_pattern() {
            if !pattern.matches(service) {
                continue;
            }
            let pattern = pattern.to_string();
            for client_id in clients {
                let task = FuzzyWatchSyncNotifyTask::diff(
                    client_id,
                    pattern.clone(),
                    service.clone(),
                    change_type,
                    self.ctx.config.notify_delay(),
                );
                self.ctx.engine.add_task(task.key(), task);
                enqueued += 1;
            }
        }
        trace!(%service, change_type = change_type.as_str(), enqueued, "service change fanned out to fuzzy watchers");
        enqueued
    }

    /// Runs every due sync once and waits for the executions.
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
