use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::session::SessionError;

/// Transport-level rejections. These never carry a JSON-RPC envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not acceptable: {message}")]
    NotAcceptable {
        code: &'static str,
        message: &'static str,
    },
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn not_acceptable() -> Self {
        Self::NotAcceptable {
            code: "not_acceptable",
            message: "client must accept both application/json and text/event-stream",
        }
    }

    pub fn missing_session() -> Self {
        Self::BadRequest {
            code: "missing_session_id",
            message: "missing session id",
        }
    }

    pub fn unknown_session() -> Self {
        Self::BadRequest {
            code: "invalid_session_id",
            message: "no valid session id provided",
        }
    }

    pub fn session_not_ready() -> Self {
        Self::BadRequest {
            code: "session_not_ready",
            message: "session initialization has not completed",
        }
    }

    pub fn initialize_without_id() -> Self {
        Self::BadRequest {
            code: "invalid_request",
            message: "initialize must be sent as a request with an id",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownSession(_) => Self::unknown_session(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            Self::NotAcceptable { code, message } | Self::BadRequest { code, message } => {
                (code, message.to_string())
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (code, "internal server error".to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
