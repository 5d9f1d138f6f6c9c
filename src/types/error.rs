//! Error types for Merit
//!
//! Every fallible operation in the crate returns [`MeritError`]. The HTTP
//! layer turns it into a status code plus a stable machine-readable `code`.

use hyper::StatusCode;

/// Main error type for Merit operations
#[derive(Debug, thiserror::Error)]
pub enum MeritError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request clashes with current state: a workflow status that does
    /// not allow the transition, or a duplicate unique value.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A store call exceeded its time bound. Safe to retry.
    #[error("Timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("File storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeritError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Timeout { .. } => "STORE_TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Message safe to show to API clients.
    ///
    /// Infrastructure failures are logged in full but reported generically.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Storage(_) | Self::Config(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Timeout { .. } => "Storage backend timed out, please retry".to_string(),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg)
            | Self::PayloadTooLarge(msg) => msg.clone(),
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for MeritError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MeritError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid JSON: {}", err))
    }
}

impl From<mongodb::error::Error> for MeritError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for MeritError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encoding failed: {}", err))
    }
}

impl From<bson::oid::Error> for MeritError {
    fn from(err: bson::oid::Error) -> Self {
        Self::NotFound(format!("Invalid record id: {}", err))
    }
}

impl From<rusqlite::Error> for MeritError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for MeritError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<tokio::task::JoinError> for MeritError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Blocking task failed: {}", err))
    }
}

/// Result type alias for Merit operations
pub type Result<T> = std::result::Result<T, MeritError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_keep_failure_kinds_apart() {
        assert_eq!(
            MeritError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MeritError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MeritError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            MeritError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout = MeritError::Timeout {
            operation: "reference.submit".into(),
            after_ms: 5000,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!MeritError::Database("down".into()).is_retryable());
    }

    #[test]
    fn test_public_message_hides_infrastructure_detail() {
        let err = MeritError::Database("no such table: users".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = MeritError::Conflict("achievement is already submitted".into());
        assert_eq!(err.public_message(), "achievement is already submitted");
    }

    #[test]
    fn test_json_errors_are_validation_failures() {
        let err: MeritError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, MeritError::Validation(_)));
    }
}
