use crate::accounts::AccountError;
use crate::disputes::DisputeError;
use crate::moderation::ModerationError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the JSON API as `{ "ok": false, "error": ... }`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("timed_out")]
    TimedOut,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("MAIN_GUILD_ID is not configured")]
    NoGuild,

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Moderation(#[from] ModerationError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),

    #[error("internal_error")]
    Internal(String),
}

impl ApiError {
    pub const fn forbidden() -> Self {
        Self::Forbidden("forbidden")
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::TimedOut | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Moderation(_) | Self::Dispute(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoGuild => StatusCode::SERVICE_UNAVAILABLE,
            Self::Account(e) => match e {
                AccountError::UsernameTaken => StatusCode::CONFLICT,
                AccountError::NotFound => StatusCode::NOT_FOUND,
                AccountError::OwnerNotDeletable | AccountError::OwnerNotSuspendable => {
                    StatusCode::FORBIDDEN
                }
                AccountError::Hash(_) | AccountError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::Error> for ApiError {
    fn from(error: crate::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::Internal(detail) => error!("API error: {detail}"),
                other => error!("API error: {other:?}"),
            }
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
