use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Why the resource guard refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A path segment was empty, `.`, `..` or contained a NUL byte
    InvalidPath,
    /// The resolved path left the storage root
    OutsideRoot,
    /// The extension is missing or not on the allow-list
    ExtensionNotAllowed,
    /// The caller's scope does not own the resource
    ScopeMismatch,
    /// The file content does not match its claimed type
    SignatureMismatch,
}

impl RejectReason {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidPath => "invalid_path",
            RejectReason::OutsideRoot => "outside_root",
            RejectReason::ExtensionNotAllowed => "extension_not_allowed",
            RejectReason::ScopeMismatch => "scope_mismatch",
            RejectReason::SignatureMismatch => "signature_mismatch",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard error types
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Access denied: {0}")]
    Forbidden(RejectReason),

    #[error("Resource not found")]
    NotFound,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GuardError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            GuardError::Forbidden(_) => StatusCode::FORBIDDEN,
            GuardError::NotFound => StatusCode::NOT_FOUND,
            GuardError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GuardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Server-side failures may carry filesystem paths or driver messages,
    /// so they collapse to the canonical reason phrase.
    pub fn public_message(&self) -> String {
        match self {
            GuardError::Unauthenticated
            | GuardError::InvalidToken(_)
            | GuardError::Forbidden(_)
            | GuardError::NotFound => self.to_string(),
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GuardError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GuardError::Forbidden(RejectReason::OutsideRoot).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(GuardError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GuardError::Persistence("db down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_internal_details() {
        let err = GuardError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/srv/private/students/1.jpg: permission denied",
        ));
        assert_eq!(err.public_message(), "Internal Server Error");

        let err = GuardError::Forbidden(RejectReason::ScopeMismatch);
        assert_eq!(err.public_message(), "Access denied: scope_mismatch");
    }
}
