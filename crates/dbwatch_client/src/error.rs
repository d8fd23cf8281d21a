//! Error types for the client.

use dbwatch_api::{decode_status, CodecError, StatusReason};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network, authentication or server-side failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Payload could not be decoded as the expected kind.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// The named object does not exist.
    #[error("database {name:?} not found")]
    NotFound {
        /// Object name.
        name: String,
    },

    /// An object with the same name already exists.
    #[error("database {name:?} already exists")]
    AlreadyExists {
        /// Object name.
        name: String,
    },

    /// The server rejected the payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The write was based on a stale resource version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested resource version is no longer available.
    #[error("resource version expired: {0}")]
    Expired(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    /// Maps a non-success response onto the error taxonomy.
    ///
    /// `name` is the object the call was about, used for `NotFound` and
    /// `AlreadyExists`; collection-level calls pass `None`.
    pub fn from_response(status: u16, body: &[u8], name: Option<&str>) -> Self {
        let decoded = decode_status(body).ok();
        let reason = decoded.as_ref().map(|s| s.reason).unwrap_or_default();
        let message = decoded
            .map(|s| s.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("server responded with status {}", status));
        let name = name.unwrap_or_default().to_string();

        match status {
            404 => ClientError::NotFound { name },
            409 if reason == StatusReason::AlreadyExists => ClientError::AlreadyExists { name },
            409 => ClientError::Conflict(message),
            400 | 422 => ClientError::Validation(message),
            410 => ClientError::Expired(message),
            _ => ClientError::Transport {
                message,
                status: Some(status),
                retryable: status == 429 || status >= 500,
            },
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Expired(_) => true,
            _ => false,
        }
    }
}
