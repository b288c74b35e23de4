//! Push Fan-out Error Hierarchy
//!
//! Defines the error types of the notification engine, categorized by the
//! subsystem that raises them. Push failures are never surfaced to the
//! domain event producer; they are absorbed into metrics and retry
//! scheduling. The classification carried by [`PushError`] decides which
//! failures re-enter the delay-task engine.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Push delivery failures
    #[error(transparent)]
    Push(#[from] PushError),

    /// Request/response correlation failures
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Wildcard watch registration failures
    #[error(transparent)]
    FuzzyWatch(#[from] FuzzyWatchError),

    /// Metric registration failures
    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failure reported for one push attempt.
///
/// Only [`PushError::NoRetry`] is terminal; every other variant sends the
/// push back through the delay-task engine until the configured retry
/// limit is reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// Transport asked explicitly for the delivery not to be retried
    #[error("Push must not be retried: {0}")]
    NoRetry(String),

    /// Network or connection level failure
    #[error("Push transport failure: {0}")]
    Transport(String),

    /// Client answered with a non-success code
    #[error("Client {client_id} rejected push with code {code}: {message}")]
    Rejected {
        client_id: String,
        code: u16,
        message: String,
    },

    /// No acknowledgement within the callback timeout
    #[error("Push to {client_id} timed out after {timeout:?}")]
    Timeout { client_id: String, timeout: Duration },
}

impl PushError {
    /// Whether the failed delivery should be submitted again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PushError::NoRetry(_))
    }
}

/// Outcome errors of a [`crate::remote::RequestFuture`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Request {request_id} on connection {connection_id} timed out after {timeout:?}")]
    Timeout {
        connection_id: String,
        request_id: String,
        timeout: Duration,
    },

    #[error("Request {request_id} failed: {reason}")]
    Failed { request_id: String, reason: String },

    #[error("Connection {0} closed")]
    ConnectionClosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuzzyWatchError {
    #[error("Invalid fuzzy watch pattern: {0}")]
    InvalidPattern(String),

    #[error("Fuzzy watch lookup failed for {pattern}: {reason}")]
    Lookup { pattern: String, reason: String },
}
