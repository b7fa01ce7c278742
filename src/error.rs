//! Error types for the migration driver.

use std::time::Duration;

use thiserror::Error;

use crate::migration::state::DriverState;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Failure reported by the legacy store client.
///
/// `Store` failures are transient: the driver leaves its state untouched and
/// relies on the next poll to retry. `Auth` failures are reported to the
/// fault handler but keep the worker alive.
#[derive(Debug, Clone, Error)]
pub enum MigrationClientError {
    /// Transient legacy store failure: connection loss, session expiry, or a
    /// conditional update rejected because the cached znode version is stale
    /// (authoritative evidence of lost leadership).
    #[error("legacy store error: {0}")]
    Store(String),

    /// Authentication or authorization failure against the legacy store.
    #[error("legacy store authentication failure: {0}")]
    Auth(String),
}

/// Failure reported by the metadata-log record consumer.
#[derive(Debug, Clone, Error)]
pub enum RecordConsumerError {
    /// The log rejected or failed to commit a migration batch.
    #[error("record consumer failed: {0}")]
    Failed(String),
}

/// Top-level error type for the migration driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Error from the legacy store client.
    #[error(transparent)]
    Client(#[from] MigrationClientError),

    /// Error from the metadata-log record consumer.
    #[error(transparent)]
    Consumer(#[from] RecordConsumerError),

    /// A blocking wait on the metadata log exceeded its deadline.
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        /// What the driver was waiting for.
        what: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// An illegal lifecycle transition was attempted. Programming error.
    #[error("invalid driver state transition from {from} to {to}")]
    IllegalTransition {
        /// State the driver was in.
        from: DriverState,
        /// State that was requested.
        to: DriverState,
    },

    /// The event queue has shut down and no longer accepts events.
    #[error("event queue is closed")]
    QueueClosed,

    /// Unrecoverable inconsistency.
    #[error("{0}")]
    Fatal(String),
}

impl DriverError {
    /// Whether this error is a transient legacy store failure that the next
    /// poll will retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Client(MigrationClientError::Store(_)))
    }
}
