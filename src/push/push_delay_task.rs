use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::task::DelayTask;
use crate::ServiceKey;

/// Clients a service push is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// Every current subscriber of the service
    All,
    /// Only these client ids
    Clients(BTreeSet<String>),
}

impl PushTarget {
    /// `All` absorbs anything; two client sets are unioned.
    pub fn merge(
        &mut self,
        newer: PushTarget,
    ) {
        match (&mut *self, newer) {
            (PushTarget::All, _) => {}
            (this, PushTarget::All) => *this = PushTarget::All,
            (PushTarget::Clients(clients), PushTarget::Clients(more)) => clients.extend(more),
        }
    }

    pub fn includes(
        &self,
        client_id: &str,
    ) -> bool {
        match self {
            PushTarget::All => true,
            PushTarget::Clients(clients) => clients.contains(client_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushDelayTask {
    service: ServiceKey,
    target: PushTarget,
    retry_count: u32,
    last_process_time: Instant,
    task_interval: Duration,
}

impl PushDelayTask {
    pub fn new(
        service: ServiceKey,
        target: PushTarget,
        delay: Duration,
    ) -> Self {
        Self {
            service,
            target,
            retry_count: 0,
            last_process_time: Instant::now(),
            task_interval: delay,
        }
    }

    /// Push to every subscriber of `service`.
    pub fn push_to_all(
        service: ServiceKey,
        delay: Duration,
    ) -> Self {
        Self::new(service, PushTarget::All, delay)
    }

    pub fn for_client(
        service: ServiceKey,
        client_id: impl Into<String>,
        delay: Duration,
    ) -> Self {
        let client_id: String = client_id.into();
        Self::for_clients(service, [client_id], delay)
    }

    pub fn for_clients<I, S>(
        service: ServiceKey,
        clients: I,
        delay: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clients = clients.into_iter().map(Into::into).collect();
        Self::new(service, PushTarget::Clients(clients), delay)
    }

    /// Marks the task as the `retry_count`-th re-push of a failed delivery.
    pub fn with_retry_count(
        mut self,
        retry_count: u32,
    ) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn service(&self) -> &ServiceKey {
        &self.service
    }

    pub fn target(&self) -> &PushTarget {
        &self.target
    }

    pub fn is_push_to_all(&self) -> bool {
        self.target == PushTarget::All
    }

    fn due_at(&self) -> Instant {
        self.last_process_time + self.task_interval
    }
}

impl DelayTask for PushDelayTask {
    /// Unions the targets and keeps whichever schedule is due first. The
    /// merged task carries the higher retry count.
    fn merge(
        &mut self,
        newer: Self,
    ) {
        self.retry_count = self.retry_count.max(newer.retry_count);
        if newer.due_at() < self.due_at() {
            self.last_process_time = newer.last_process_time;
            self.task_interval = newer.task_interval;
        }
        self.target.merge(newer.target);
    }

    fn last_process_time(&self) -> Instant {
        self.last_process_time
    }

    fn task_interval(&self) -> Duration {
        self.task_interval
    }
}
