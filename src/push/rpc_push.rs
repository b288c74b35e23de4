use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use nanoid::nanoid;
use tracing::debug;
use tracing::warn;

use super::PushCallback;
use super::PushRequest;
use super::PushTransport;
use crate::remote::RequestCallback;
use crate::remote::RequestFutureTable;
use crate::remote::TimeoutScheduler;
use crate::PushError;
use crate::RequestError;

/// Client acknowledgement of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub code: u16,
    pub message: String,
}

impl PushResponse {
    pub const SUCCESS_CODE: u16 = 200;

    pub fn success() -> Self {
        Self {
            code: Self::SUCCESS_CODE,
            message: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS_CODE
    }
}

/// Live bidirectional stream to one client.
#[cfg_attr(test, automock)]
pub trait Connection: Send + Sync + 'static {
    /// Writes `request` to the stream. The reply arrives later through
    /// [`RpcPushService::on_response`].
    fn send(
        &self,
        request_id: &str,
        request: PushRequest,
    ) -> Result<(), PushError>;
}

#[cfg_attr(test, automock)]
pub trait ConnectionManager: Send + Sync + 'static {
    fn get_connection(
        &self,
        client_id: &str,
    ) -> Option<Arc<dyn Connection>>;
}

/// [`PushTransport`] over client connections.
///
/// Every push is correlated with its acknowledgement through a
/// [`RequestFutureTable`]; the connection layer feeds replies and closed
/// connections back through [`RpcPushService::on_response`] and
/// [`RpcPushService::on_connection_closed`].
pub struct RpcPushService {
    connections: Arc<dyn ConnectionManager>,
    futures: RequestFutureTable<PushResponse>,
}

impl RpcPushService {
    pub fn new(
        connections: Arc<dyn ConnectionManager>,
        scheduler: Arc<dyn TimeoutScheduler>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            futures: RequestFutureTable::new(scheduler, default_timeout),
        }
    }

    /// Routes a client reply to the waiting push. Returns `false` when no
    /// push is waiting for it.
    pub fn on_response(
        &self,
        connection_id: &str,
        request_id: &str,
        response: PushResponse,
    ) -> bool {
        self.futures.complete(connection_id, request_id, response)
    }

    /// Fails every push still waiting on `connection_id`.
    pub fn on_connection_closed(
        &self,
        connection_id: &str,
    ) -> usize {
        self.futures.fail_connection(connection_id)
    }

    /// Pushes waiting for an acknowledgement.
    pub fn pending(&self) -> usize {
        self.futures.len()
    }

    fn connection(
        &self,
        client_id: &str,
    ) -> Result<Arc<dyn Connection>, PushError> {
        self.connections
            .get_connection(client_id)
            .ok_or_else(|| PushError::NoRetry(format!("client {client_id} is not connected")))
    }

    /// Writes the request; on a write failure the registered future is
    /// failed so its callback (if any) learns about it.
    fn send(
        &self,
        connection: &dyn Connection,
        client_id: &str,
        request_id: &str,
        request: PushRequest,
    ) -> Result<(), PushError> {
        connection.send(request_id, request).map_err(|e| {
            warn!(client_id, request_id, error = %e, "failed to write push");
            self.futures.fail(
                client_id,
                request_id,
                RequestError::Failed {
                    request_id: request_id.to_string(),
                    reason: e.to_string(),
                },
            );
            e
        })
    }
}

#[async_trait]
impl PushTransport for RpcPushService {
    async fn do_push(
        &self,
        client_id: &str,
        request: PushRequest,
    ) -> Result<(), PushError> {
        let connection = self.connection(client_id)?;
        let request_id = nanoid!();
        let future = self.futures.register(client_id, &request_id, None);
        self.send(connection.as_ref(), client_id, &request_id, request)?;

        let outcome = tokio::task::spawn_blocking(move || future.get_timeout(-1))
            .await
            .map_err(|e| PushError::Transport(format!("push wait aborted: {e}")))?;
        match outcome {
            Ok(Some(response)) => response_to_result(client_id, response),
            Ok(None) => Err(PushError::Transport(format!("push {request_id} failed"))),
            Err(error) => Err(request_error_to_push_error(client_id, error)),
        }
    }

    fn do_push_with_callback(
        &self,
        client_id: &str,
        request: PushRequest,
        callback: Arc<dyn PushCallback>,
    ) {
        let connection = match self.connection(client_id) {
            Ok(connection) => connection,
            Err(e) => {
                debug!(client_id, "push target not connected");
                callback.on_fail(e);
                return;
            }
        };

        let request_id = nanoid!();
        let bridge: Arc<dyn RequestCallback<PushResponse>> = Arc::new(PushCallbackBridge {
            client_id: client_id.to_string(),
            callback,
        });
        self.futures.register(client_id, &request_id, Some(bridge));
        // A write failure has already been delivered to the callback
        let _ = self.send(connection.as_ref(), client_id, &request_id, request);
    }
}

/// Presents a [`PushCallback`] as the request callback of the push's
/// future.
struct PushCallbackBridge {
    client_id: String,
    callback: Arc<dyn PushCallback>,
}

impl RequestCallback<PushResponse> for PushCallbackBridge {
    fn timeout(&self) -> Duration {
        self.callback.timeout()
    }

    fn on_response(
        &self,
        response: PushResponse,
    ) {
        match response_to_result(&self.client_id, response) {
            Ok(()) => self.callback.on_success(),
            Err(e) => self.callback.on_fail(e),
        }
    }

    fn on_exception(
        &self,
        error: RequestError,
    ) {
        self.callback.on_fail(request_error_to_push_error(&self.client_id, error));
    }
}

fn response_to_result(
    client_id: &str,
    response: PushResponse,
) -> Result<(), PushError> {
    if response.is_success() {
        return Ok(());
    }
    Err(PushError::Rejected {
        client_id: client_id.to_string(),
        code: response.code,
        message: response.message,
    })
}

fn request_error_to_push_error(
    client_id: &str,
    error: RequestError,
) -> PushError {
    match error {
        RequestError::Timeout { timeout, .. } => PushError::Timeout {
            client_id: client_id.to_string(),
            timeout,
        },
        RequestError::ConnectionClosed(connection_id) => {
            PushError::NoRetry(format!("connection {connection_id} closed"))
        }
        RequestError::Failed { reason, .. } => PushError::Transport(reason),
    }
}
