//! Service change pushes.
//!
//! A registry change becomes a [`PushDelayTask`] keyed by its
//! [`ServiceKey`]. Once the debounce window elapses the
//! [`PushExecuteTask`] resolves the subscribers the task targets, builds
//! the payload once and hands one delivery per subscriber to the
//! [`PushTransport`]. Deliveries report back through a [`PushCallback`];
//! retryable failures re-enter the engine for that client only.

mod push_delay_task;
mod push_execute_task;
mod rpc_push;

pub use push_delay_task::*;
pub use push_execute_task::*;
pub use rpc_push::*;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::fuzzy_watch::FuzzyWatchSyncRequest;
use crate::PushError;
use crate::Result;
use crate::ServiceKey;
use crate::Subscriber;

/// Snapshot of a service sent to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPayload {
    pub service: ServiceKey,
    /// Monotonic data version; clients drop payloads older than what they hold
    pub revision: u64,
    pub body: Vec<u8>,
}

/// Message delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRequest {
    ServiceChanged {
        subscriber: Subscriber,
        payload: PushPayload,
    },
    FuzzyWatchSync(FuzzyWatchSyncRequest),
}

/// Read side of the subscription registry.
#[cfg_attr(test, automock)]
pub trait SubscriberIndex: Send + Sync + 'static {
    fn subscribers_for_service(
        &self,
        service: &ServiceKey,
    ) -> Result<Vec<Subscriber>>;
}

/// Read side of the service data store.
#[cfg_attr(test, automock)]
pub trait ServiceStorage: Send + Sync + 'static {
    fn push_payload(
        &self,
        service: &ServiceKey,
    ) -> Result<PushPayload>;
}

/// Outcome sink for one delivery. Exactly one of `on_success` or `on_fail`
/// is invoked, possibly from a transport thread.
#[cfg_attr(test, automock)]
pub trait PushCallback: Send + Sync + 'static {
    /// How long the transport waits for the client's acknowledgement.
    fn timeout(&self) -> Duration;

    fn on_success(&self);

    fn on_fail(
        &self,
        error: PushError,
    );
}

/// Delivery channel to connected clients.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Delivers `request` and waits for the acknowledgement.
    async fn do_push(
        &self,
        client_id: &str,
        request: PushRequest,
    ) -> std::result::Result<(), PushError>;

    /// Delivers `request` without waiting; the outcome is reported to
    /// `callback`.
    fn do_push_with_callback(
        &self,
        client_id: &str,
        request: PushRequest,
        callback: Arc<dyn PushCallback>,
    );
}
