//! Error types for the API crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding resource payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to JSON.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Payload is not valid JSON for the expected shape.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Payload decoded but names a different kind.
    #[error("unexpected kind: expected {expected}, got {actual}")]
    UnexpectedKind {
        /// Kind this decoder is bound to.
        expected: String,
        /// Kind found in the payload.
        actual: String,
    },

    /// Payload decoded but names a different group/version.
    #[error("unexpected apiVersion: expected {expected}, got {actual}")]
    UnexpectedApiVersion {
        /// Group/version this decoder is bound to.
        expected: String,
        /// Group/version found in the payload.
        actual: String,
    },

    /// Object has no `metadata.name`.
    #[error("object is missing metadata.name")]
    MissingName,

    /// A watch frame grew past the allowed size without a terminator.
    #[error("watch frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Maximum frame length in bytes.
        limit: usize,
    },

    /// Unknown watch event type.
    #[error("unknown watch event type: {0}")]
    UnknownEventType(String),

    /// Label selector could not be parsed.
    #[error("invalid label selector {selector:?}: {message}")]
    InvalidSelector {
        /// The selector text.
        selector: String,
        /// What is wrong with it.
        message: String,
    },

    /// Query parameter could not be parsed.
    #[error("invalid query parameter {name}: {value:?}")]
    InvalidQuery {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid selector error.
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create an invalid query parameter error.
    pub fn invalid_query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidQuery {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::decoding_failed(err.to_string())
    }
}
