use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{store::StoreError, types::FieldErrors};

pub const GENERIC_FAILURE: &str = "There was an error processing your request";

/// Outcome taxonomy shared by the services and the HTTP layer.
///
/// `Upstream` and `Persistence` carry detail for the logs only; their
/// response body is always the generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input")]
    Validation(FieldErrors),

    #[error("authentication required")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("Slug already taken. Please choose a different slug.")]
    Conflict,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("operation failed: {0}")]
    Persistence(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Upstream(_) | AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::SlugTaken(_) => AppError::Conflict,
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(FieldErrors::single("body", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(issues) => {
                json!({ "error": "Invalid form data", "issues": issues })
            }
            AppError::Unauthorized => json!({ "error": "Unauthorized" }),
            AppError::NotFound => json!({ "error": "Not found" }),
            AppError::Conflict => json!({ "error": self.to_string() }),
            AppError::Upstream(_) | AppError::Persistence(_) => {
                json!({ "error": GENERIC_FAILURE })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_public_taxonomy() {
        assert!(matches!(
            AppError::from(StoreError::NotFound),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(StoreError::SlugTaken("dup".into())),
            AppError::Conflict
        ));
        assert!(matches!(
            AppError::from(StoreError::Corrupt("bad provider".into())),
            AppError::Persistence(_)
        ));
    }

    #[test]
    fn internal_failures_share_one_status() {
        assert_eq!(
            AppError::Upstream("provider down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Persistence("pool closed".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Conflict.status(), StatusCode::CONFLICT);
    }
}
