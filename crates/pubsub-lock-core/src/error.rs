//! Error types for lock operations.

use thiserror::Error;

/// Errors that can occur during lock operations.
///
/// "Held by someone else" is not an error: `try_lock` variants report it as
/// `Ok(false)`. Only infrastructure failures and cancellation surface here.
#[derive(Error, Debug)]
pub enum LockError {
    /// Operation was cancelled while waiting for a release notification.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// Backend could not be reached (refused connection, IO failure, timeout).
    ///
    /// Callers may retry with backoff.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid resource name.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Invalid lock or provider configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend rejected or failed a command.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    /// Returns `true` for failures where the backend could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
