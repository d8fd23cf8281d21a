//! Error types for the reference server.

use dbwatch_api::{CodecError, ObjectKey, Status};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// No object with this identity.
    #[error("database {0} not found")]
    NotFound(ObjectKey),

    /// An object with this identity exists.
    #[error("database {0} already exists")]
    AlreadyExists(ObjectKey),

    /// Payload rejected.
    #[error("database {name:?} is invalid: {message}")]
    Invalid {
        /// Object name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// Write based on a stale resource version.
    #[error("conflict on {key}: object has resource version {current}, request had {requested}")]
    Conflict {
        /// Object identity.
        key: ObjectKey,
        /// Version stored on the server.
        current: String,
        /// Version in the request.
        requested: String,
    },

    /// Watch requested a version older than the retained history.
    #[error("too old resource version: {requested} (oldest available after {compacted})")]
    Expired {
        /// Requested version.
        requested: u64,
        /// Latest compacted revision.
        compacted: u64,
    },

    /// Request could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Path does not name a known resource.
    #[error("no route for {0}")]
    NoRoute(String),

    /// Method not supported on this path.
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        /// Method.
        method: String,
        /// Path.
        path: String,
    },

    /// Injected or transient failure.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Unavailable(_) | ServerError::Internal(_))
    }

    /// Converts to the `Status` body sent on the wire.
    pub fn to_status(&self) -> Status {
        use dbwatch_api::StatusReason;

        match self {
            ServerError::NotFound(key) => Status::not_found(&key.name),
            ServerError::AlreadyExists(key) => Status::already_exists(&key.name),
            ServerError::Invalid { name, message } => Status::invalid(name, message),
            ServerError::Conflict { .. } => Status::conflict(self.to_string()),
            ServerError::Expired { .. } => Status::expired(self.to_string()),
            ServerError::BadRequest(_) => Status::bad_request(self.to_string()),
            ServerError::NoRoute(_) => {
                Status::failure(404, StatusReason::NotFound, self.to_string())
            }
            ServerError::MethodNotAllowed { .. } => {
                Status::failure(405, StatusReason::Unknown, self.to_string())
            }
            ServerError::Unavailable(_) => Status::unavailable(self.to_string()),
            ServerError::Internal(_) => Status::internal(self.to_string()),
        }
    }
}

impl From<CodecError> for ServerError {
    fn from(err: CodecError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}
