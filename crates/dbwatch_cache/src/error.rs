//! Error types for the cache and synchronizer.

use dbwatch_api::ObjectKey;
use dbwatch_client::ClientError;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in the cache and synchronizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// No entry with this identity in the store.
    #[error("{0} not found in store")]
    NotFound(ObjectKey),

    /// The informer stopped before it could serve the request.
    #[error("informer stopped")]
    Stopped,

    /// A list or watch call failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// The watch stream delivered an error event.
    #[error("watch error {code}: {message}")]
    WatchEvent {
        /// HTTP-like status code.
        code: u16,
        /// Server message.
        message: String,
    },

    /// The background task failed.
    #[error("informer task failed: {0}")]
    Task(String),
}

impl CacheError {
    /// Returns true if the informer recovers from this error by relisting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::Client(_) | CacheError::WatchEvent { .. })
    }
}
