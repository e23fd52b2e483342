//! Error types for the Courier request orchestration engine.

use thiserror::Error;

/// Outcome errors of a single request attempt.
///
/// These are written into the `error` state slot, dispatched to error and completion
/// handlers and returned from `send`, so they must be cheap to clone and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The response transform failed or rejected.
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Network or protocol failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport completed but reported a non-success status.
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The attempt was cancelled through `abort()`.
    #[error("The user aborted a request")]
    Aborted,

    /// `send` was called on an orchestrator that was never entered.
    #[error("Request orchestrator has no active context")]
    NotEntered,
}

impl RequestError {
    /// Build a transform error from anything printable.
    pub fn transform(message: impl std::fmt::Display) -> Self {
        RequestError::Transform(message.to_string())
    }

    /// Build a transport error from anything printable.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        RequestError::Transport(message.to_string())
    }

    /// Whether this error was produced by a user-initiated abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, RequestError::Aborted)
    }
}

/// Cache persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cache storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Invalid cache entry for key {key}: {message}")]
    InvalidEntry { key: String, message: String },
}

/// Errors raised while setting up a `Courier` instance (configuration, storage, logging).
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Transport setup failed: {0}")]
    TransportSetup(String),
}

impl From<config::ConfigError> for CourierError {
    fn from(err: config::ConfigError) -> Self {
        CourierError::ConfigError(err.to_string())
    }
}

impl From<sled::Error> for CourierError {
    fn from(err: sled::Error) -> Self {
        CourierError::StorageError(StorageError::Backend(err))
    }
}
