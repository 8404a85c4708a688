use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
///
/// The billing engine distinguishes errors the client can fix (Validation),
/// errors caused by the current state of the ledger (Conflict, NotFound) and
/// system errors that trigger a full rollback of the operation.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for malformed input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// State conflicts: duplicate period invoice, payment exceeding balance,
    /// active-rule cap, optimistic write check failure
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found, message carries the missing entity's id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Persistence and internal failures must not leak detail to the
        // caller; they get an opaque body plus a correlation id that is also
        // written to the log.
        let body = match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %self,
                    "system error"
                );
                serde_json::json!({
                    "error": {
                        "message": "Internal system error",
                        "code": status_code.as_u16(),
                        "correlation_id": correlation_id,
                    }
                })
            }
            _ => serde_json::json!({
                "error": {
                    "message": self.to_string(),
                    "code": status_code.as_u16(),
                }
            }),
        };

        HttpResponse::build(status_code).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
