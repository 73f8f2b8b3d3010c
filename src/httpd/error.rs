// src/httpd/error.rs

//! JSON error bodies for failures that happen before a stream is committed.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::errors::ExecError;

/// Wire shape of every non-streaming error: `{"code": 400, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_body(err: serde_json::Error) -> Self {
        Self::new(StatusCode::BAD_REQUEST, format!("invalid body: {err}"))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// HTTP status for each executor/registry failure.
pub fn status_for(err: &ExecError) -> StatusCode {
    match err {
        ExecError::AlreadyRunning { .. } | ExecError::NoActiveProcess => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ExecError::InvalidExecId(_)
        | ExecError::NoExecutionToCancel
        | ExecError::AmbiguousCancel => StatusCode::BAD_REQUEST,
        ExecError::StartCmd { .. }
        | ExecError::Pipe(_)
        | ExecError::CancelTimeout(_)
        | ExecError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        Self::new(status_for(&err), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.status.as_u16(),
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
