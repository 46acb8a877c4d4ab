//! API error types with IntoResponse
//!
//! Errors are converted to the JSON error envelope with the matching status
//! code. The response also carries an [`ErrorPage`] extension so that the
//! view layer can swap the JSON for a rendered page on non-API paths.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tourbook_core::ValidationError;

use super::envelope::Envelope;
use crate::db::repos::DbError;

const GENERIC_MESSAGE: &str = "Something went very wrong!";

/// API error type with automatic HTTP status mapping
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Validation failed (400)
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Malformed request outside of model validation (400)
    #[error("{0}")]
    BadRequest(String),

    /// Missing or rejected credentials (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Unique constraint violated (409)
    #[error("{0}")]
    Conflict(String),

    /// Rate limit exceeded (429)
    #[error("{0}")]
    TooManyRequests(String),

    /// Reset email could not be delivered (500, message shown)
    #[error("There was an error sending the email. Try again later!")]
    EmailDelivery,

    /// Database error (500, logged)
    #[error("database error: {0}")]
    Database(String),

    /// Internal error (500, logged)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Status and client-facing message of an error response, kept in the
/// response extensions for the HTML error page.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::EmailDelivery | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => GENERIC_MESSAGE.to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Database(e) => tracing::error!("Database error: {}", e),
            Self::Internal(e) => tracing::error!("Internal error: {}", e),
            Self::EmailDelivery => tracing::error!("Password reset email could not be sent"),
            _ => {}
        }

        let message = self.public_message();
        let mut response = (status, Envelope::<()>::error(message.clone())).into_response();
        response.extensions_mut().insert(ErrorPage { status, message });
        response
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, .. } => {
                Self::NotFound(format!("No {} found with that ID", resource))
            }
            DbError::Conflict { field, value } => Self::Conflict(format!(
                "Duplicate field value: {} \"{}\". Please use another value!",
                field, value
            )),
            DbError::Sqlx(e) => Self::Database(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_is_400() {
        let err = ApiError::Validation(ValidationError::custom("A review must be rated!"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "A review must be rated!");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn database_error_hides_details() {
        let err = ApiError::Database("relation \"tours\" does not exist".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], GENERIC_MESSAGE);
    }

    #[tokio::test]
    async fn email_failure_keeps_its_message() {
        let response = ApiError::EmailDelivery.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "There was an error sending the email. Try again later!"
        );
    }

    #[test]
    fn response_carries_error_page() {
        let response = ApiError::forbidden("nope").into_response();
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert_eq!(page.message, "nope");
    }

    #[test]
    fn db_errors_map_to_status() {
        let err: ApiError = DbError::NotFound {
            resource: "tour",
            id: "x".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "No tour found with that ID");

        let err: ApiError = DbError::Conflict {
            field: "email",
            value: "a@b.io".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
