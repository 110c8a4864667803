use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

/// Failures raised by the reconciliation engine itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("partial commit: history {history}, appointment {appointment}")]
    PartialCommit {
        history: &'static str,
        appointment: &'static str,
    },

    #[error("unrecognized response shape: {0}")]
    Normalization(String),

    #[error("result for a superseded context was discarded")]
    Superseded,

    #[error("no patient loaded")]
    NotLoaded,

    #[error("no visit on {0}")]
    UnknownVisit(String),

    #[error("a commit is in progress; edits are locked until it settles")]
    CommitInProgress,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    BadGateway(&'static str, String),
}

impl ApiError {
    pub fn session_not_found() -> Self {
        ApiError::NotFound("SESSION_NOT_FOUND", "Session does not exist".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let msg = e.to_string();
        match e {
            EngineError::Validation(_) => ApiError::BadRequest("VALIDATION_ERROR", msg),
            EngineError::UnknownVisit(_) => ApiError::BadRequest("UNKNOWN_VISIT", msg),
            EngineError::NotLoaded => ApiError::Conflict("NOT_LOADED", msg),
            EngineError::Superseded => ApiError::Conflict("SUPERSEDED", msg),
            EngineError::CommitInProgress => ApiError::Conflict("COMMIT_IN_PROGRESS", msg),
            EngineError::Resolution(_) => ApiError::BadGateway("RESOLUTION_ERROR", msg),
            EngineError::PartialCommit { .. } => ApiError::BadGateway("PARTIAL_COMMIT", msg),
            EngineError::Normalization(_) => ApiError::BadGateway("NORMALIZATION_ERROR", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadGateway(code, msg) => {
                (StatusCode::BAD_GATEWAY, ApiError::to_error_response(code, &msg)).into_response()
            }
        }
    }
}
