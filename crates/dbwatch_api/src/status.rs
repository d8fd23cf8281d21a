//! The `Status` payload returned for failed calls and `ERROR` watch frames.

use crate::database::{KIND, PLURAL};
use crate::meta::TypeMeta;
use serde::{Deserialize, Serialize};

/// Machine-readable failure reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReason {
    /// The object does not exist.
    NotFound,
    /// An object with the same name exists.
    AlreadyExists,
    /// The payload failed validation.
    Invalid,
    /// The write lost an optimistic-concurrency race.
    Conflict,
    /// The requested resource version is no longer available.
    Expired,
    /// The resource version is too old (older servers).
    Gone,
    /// The request was malformed.
    BadRequest,
    /// Credentials missing or rejected.
    Unauthorized,
    /// Credentials valid but insufficient.
    Forbidden,
    /// Server temporarily unavailable.
    ServiceUnavailable,
    /// Server failed unexpectedly.
    InternalError,
    /// No reason given, or one this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// API server status object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Always `v1` / `Status`.
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    /// `Success` or `Failure`.
    #[serde(default)]
    pub status: String,
    /// Human readable description.
    #[serde(default)]
    pub message: String,
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: StatusReason,
    /// HTTP status code.
    #[serde(default)]
    pub code: u16,
}

impl Status {
    /// Creates a failure status.
    pub fn failure(code: u16, reason: StatusReason, message: impl Into<String>) -> Self {
        Self {
            type_meta: TypeMeta::new("v1", "Status"),
            status: "Failure".into(),
            message: message.into(),
            reason,
            code,
        }
    }

    /// 404 for a named object.
    pub fn not_found(name: &str) -> Self {
        Self::failure(
            404,
            StatusReason::NotFound,
            format!("{}.{} \"{}\" not found", PLURAL, crate::GROUP, name),
        )
    }

    /// 409 for a name collision.
    pub fn already_exists(name: &str) -> Self {
        Self::failure(
            409,
            StatusReason::AlreadyExists,
            format!("{}.{} \"{}\" already exists", PLURAL, crate::GROUP, name),
        )
    }

    /// 422 for a rejected payload.
    pub fn invalid(name: &str, message: impl AsRef<str>) -> Self {
        Self::failure(
            422,
            StatusReason::Invalid,
            format!("{} \"{}\" is invalid: {}", KIND, name, message.as_ref()),
        )
    }

    /// 409 for a stale resource version on write.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::failure(409, StatusReason::Conflict, message)
    }

    /// 410 for a watch that starts before the retained history.
    pub fn expired(message: impl Into<String>) -> Self {
        Self::failure(410, StatusReason::Expired, message)
    }

    /// 400 for a malformed request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::failure(400, StatusReason::BadRequest, message)
    }

    /// 503 for a temporarily unavailable server.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::failure(503, StatusReason::ServiceUnavailable, message)
    }

    /// 500 for an unexpected server failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::failure(500, StatusReason::InternalError, message)
    }

    /// Returns true for a success status.
    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let status = Status::not_found("mysql");
        assert_eq!(status.code, 404);
        assert_eq!(status.reason, StatusReason::NotFound);
        assert_eq!(
            status.message,
            "databases.resource.donald.com \"mysql\" not found"
        );
        assert!(!status.is_success());
    }

    #[test]
    fn unknown_reason_decodes() {
        let status: Status = serde_json::from_str(
            r#"{"kind":"Status","apiVersion":"v1","status":"Failure","reason":"TooManyRequests","code":429}"#,
        )
        .unwrap();
        assert_eq!(status.reason, StatusReason::Unknown);
        assert_eq!(status.code, 429);
    }

    #[test]
    fn wire_shape() {
        let json = serde_json::to_value(Status::expired("too old resource version")).unwrap();
        assert_eq!(json["kind"], "Status");
        assert_eq!(json["reason"], "Expired");
        assert_eq!(json["code"], 410);
    }
}
