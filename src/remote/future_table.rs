use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use super::RequestCallback;
use super::RequestFuture;
use super::TimeoutInnerTrigger;
use super::TimeoutScheduler;
use crate::RequestError;

type FutureKey = (String, String);

struct TableInner<R> {
    futures: DashMap<FutureKey, RequestFuture<R>>,
    scheduler: Arc<dyn TimeoutScheduler>,
    default_timeout: Duration,
}

/// Outstanding requests keyed by `(connection_id, request_id)`.
///
/// A future leaves the table when it is completed through the table or when
/// its timeout fires, whichever happens first.
pub struct RequestFutureTable<R> {
    inner: Arc<TableInner<R>>,
}

impl<R> Clone for RequestFutureTable<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> RequestFutureTable<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(
        scheduler: Arc<dyn TimeoutScheduler>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                futures: DashMap::new(),
                scheduler,
                default_timeout,
            }),
        }
    }

    /// Creates and stores a future for an outgoing request.
    ///
    /// With a `callback` the future runs in callback mode and its timeout is
    /// armed immediately; otherwise the caller is expected to block on it.
    pub fn register(
        &self,
        connection_id: &str,
        request_id: &str,
        callback: Option<Arc<dyn RequestCallback<R>>>,
    ) -> RequestFuture<R> {
        let key = (connection_id.to_string(), request_id.to_string());
        let trigger = RemoveOnTimeout {
            table: Arc::downgrade(&self.inner),
            key: key.clone(),
        };

        let mut builder = RequestFuture::builder(connection_id, request_id)
            .default_timeout(self.inner.default_timeout)
            .timeout_trigger(Arc::new(trigger));
        if let Some(callback) = callback {
            builder = builder.callback(callback, self.inner.scheduler.clone());
        }
        let future = builder.build();

        if let Some(replaced) = self.inner.futures.insert(key.clone(), future.clone()) {
            warn!(
                connection_id,
                request_id, "request id reused while previous request still pending"
            );
            replaced.set_fail_result(RequestError::Failed {
                request_id: request_id.to_string(),
                reason: "superseded by a request with the same id".to_string(),
            });
        }
        // A zero timeout may already have fired before the insert
        if future.is_done() {
            self.inner.futures.remove_if(&key, |_, stored| stored.is_done());
        }
        future
    }

    /// Delivers a reply. Returns `false` for unknown or finished requests.
    pub fn complete(
        &self,
        connection_id: &str,
        request_id: &str,
        response: R,
    ) -> bool {
        match self.take(connection_id, request_id) {
            Some(future) => future.set_response(response),
            None => {
                debug!(connection_id, request_id, "reply for unknown request");
                false
            }
        }
    }

    /// Fails one request. Returns `false` for unknown or finished requests.
    pub fn fail(
        &self,
        connection_id: &str,
        request_id: &str,
        error: RequestError,
    ) -> bool {
        self.take(connection_id, request_id)
            .map(|future| future.set_fail_result(error))
            .unwrap_or(false)
    }

    /// Fails every request pending on a connection that went away and
    /// returns how many were failed.
    pub fn fail_connection(
        &self,
        connection_id: &str,
    ) -> usize {
        let keys: Vec<FutureKey> = self
            .inner
            .futures
            .iter()
            .filter(|entry| entry.key().0 == connection_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut failed = 0;
        for (connection_id, request_id) in keys {
            if self.fail(
                &connection_id,
                &request_id,
                RequestError::ConnectionClosed(connection_id.clone()),
            ) {
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(connection_id, failed, "failed pending requests of closed connection");
        }
        failed
    }

    pub fn get(
        &self,
        connection_id: &str,
        request_id: &str,
    ) -> Option<RequestFuture<R>> {
        self.inner
            .futures
            .get(&(connection_id.to_string(), request_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.futures.is_empty()
    }

    fn take(
        &self,
        connection_id: &str,
        request_id: &str,
    ) -> Option<RequestFuture<R>> {
        self.inner
            .futures
            .remove(&(connection_id.to_string(), request_id.to_string()))
            .map(|(_, future)| future)
    }
}

/// Drops a timed-out future from its table.
struct RemoveOnTimeout<R> {
    table: Weak<TableInner<R>>,
    key: FutureKey,
}

impl<R> TimeoutInnerTrigger for RemoveOnTimeout<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn trigger_on_timeout(&self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        if table.futures.remove_if(&self.key, |_, future| future.is_done()).is_some() {
            debug!(
                connection_id = %self.key.0,
                request_id = %self.key.1,
                "removed timed out request"
            );
        }
    }
}
