//! Crate-wide error type and its mapping onto the HTTP surface.
//!
//! Internal helpers away from request boundaries keep returning
//! `anyhow::Result` the way the action/effect functions in the teacher
//! codebase do; `AppError` exists for the places that must carry a stable,
//! client-facing shape (handlers, the stream endpoint, the worker loop).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<async_nats::jetstream::context::PublishError> for AppError {
    fn from(e: async_nats::jetstream::context::PublishError) -> Self {
        AppError::Broker(e.to_string())
    }
}

impl From<crate::broker::BrokerError> for AppError {
    fn from(e: crate::broker::BrokerError) -> Self {
        AppError::Broker(e.to_string())
    }
}

impl From<crate::submission::SubmissionError> for AppError {
    fn from(e: crate::submission::SubmissionError) -> Self {
        use crate::submission::SubmissionError as E;
        match e {
            E::NotFound => AppError::NotFound(e.to_string()),
            E::Inactive => AppError::PolicyViolation(e.to_string()),
            E::Validation(msg) => AppError::Validation(msg),
            E::Database(err) => AppError::Database(err),
            E::Broker(err) => AppError::Broker(err.to_string()),
        }
    }
}

impl From<crate::dlq::DlqError> for AppError {
    fn from(e: crate::dlq::DlqError) -> Self {
        use crate::dlq::DlqError as E;
        match e {
            E::AlreadyQuarantined => AppError::Conflict(e.to_string()),
            E::JobNotFound | E::EntryNotFound => AppError::NotFound(e.to_string()),
            E::Database(err) => AppError::Database(err),
            E::Broker(err) => AppError::Broker(err.to_string()),
        }
    }
}

impl From<crate::cancellation::CancellationError> for AppError {
    fn from(e: crate::cancellation::CancellationError) -> Self {
        use crate::cancellation::CancellationError as E;
        match e {
            E::NotFound => AppError::NotFound(e.to_string()),
            E::AlreadyTerminal => AppError::AlreadyTerminal(e.to_string()),
        }
    }
}

impl From<crate::scheduler::ScheduleError> for AppError {
    fn from(e: crate::scheduler::ScheduleError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<crate::logs::stream::StreamAuthError> for AppError {
    fn from(e: crate::logs::stream::StreamAuthError) -> Self {
        AppError::PolicyViolation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::AlreadyTerminal(_) => (StatusCode::BAD_REQUEST, "already_terminal"),
            AppError::PolicyViolation(_) => (StatusCode::FORBIDDEN, "policy_violation"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Broker(_) => (StatusCode::INTERNAL_SERVER_ERROR, "broker_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        tracing::error!(error = %self, code, "request failed");

        let body = json!({
            "error": code,
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
