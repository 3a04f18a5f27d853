use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::users::store::StoreError;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Deliberately coarse: bad credentials, bad/expired/stale tokens and
    /// vanished accounts all land here so responses leak nothing beyond the
    /// attached message.
    #[error("{0}")]
    Authentication(&'static str),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Delivery(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// JSON error body: `status` is "fail" for client errors, "error" for
/// server-side ones.
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "Something went very wrong".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "Something went very wrong".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            status: if status.is_server_error() { "error" } else { "fail" },
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => {
                AppError::Conflict("Email or name already in use".to_string())
            }
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
