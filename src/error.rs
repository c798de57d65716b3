//! Typed errors and their HTTP mapping

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),
    /// A stored row that no longer decodes into its record type
    #[error("stored data: {0}")]
    StoredData(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input", self.to_string()),
            AppError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "storage failure".to_string(),
                )
            }
            AppError::StoredData(_) => {
                tracing::error!("{}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "stored_data_error", self.to_string())
            }
        };
        (status, Json(ErrorBody { error: ErrorDetail { code, message } })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let not_found = AppError::NotFound("group 7".into()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = AppError::InvalidInput("bad ltmt".into()).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let storage = AppError::Storage(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let stored = AppError::StoredData("group 2: bad ltmt".into()).into_response();
        assert_eq!(stored.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
