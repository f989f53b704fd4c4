use crate::engine::EngineError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::MemberNotFound(_) | EngineError::CommissionNotFound(_) => {
                AppError::NotFound(message)
            }
            EngineError::InvalidSponsor(_)
            | EngineError::InvalidAmount(_)
            | EngineError::InvalidPeriod { .. } => AppError::BadRequest(message),
            EngineError::PlacementExhausted { .. }
            | EngineError::AlreadyPlaced(_)
            | EngineError::SlotClaimConflict { .. }
            | EngineError::InvalidStateTransition { .. } => AppError::Conflict(message),
            EngineError::Store(StoreError::Conflict(_) | StoreError::AlreadyPlaced(_)) => {
                AppError::Conflict(message)
            }
            EngineError::Store(StoreError::NotFound(_)) => AppError::NotFound(message),
            EngineError::Store(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
