use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::problem::ProblemDetails;
use crate::services::{chat_store::ChatStoreError, messaging::MessagingError};

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let details = self.details;

        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = details {
            problem = problem.with_details(details);
        }

        problem.into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        error!(error = %err, "storage failure");
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err
                .code()
                .unwrap_or(std::borrow::Cow::Borrowed("unknown"));
            return Self::internal_server_error("internal server error")
                .with_details(json!({ "sqlstate": code }));
        }

        Self::internal_server_error("internal server error")
    }
}

impl From<ChatStoreError> for ApiError {
    fn from(err: ChatStoreError) -> Self {
        match err {
            ChatStoreError::InvalidPair(message) => Self::bad_request(message),
            ChatStoreError::Database(db_err) => Self::from(db_err),
        }
    }
}

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::Validation(message) => Self::bad_request(message),
            MessagingError::Store(store_err) => Self::from(store_err),
        }
    }
}
