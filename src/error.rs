use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MileageError {
    #[error("mileage ledger for user {0} does not exist")]
    LedgerNotFound(i64),
    #[error("mileage ledger for user {0} already exists")]
    LedgerAlreadyExists(i64),
    #[error("charge request {0} does not exist")]
    ChargeRequestNotFound(i64),
    #[error("user {user_id} has {available} mileage available, {requested} requested")]
    InsufficientBalance {
        user_id: i64,
        requested: i64,
        available: i64,
    },
    #[error("invalid mileage amount: {0}")]
    InvalidAmount(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user directory error: {0}")]
    Directory(String),
}

impl MileageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MileageError::LedgerNotFound(_) | MileageError::ChargeRequestNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            MileageError::LedgerAlreadyExists(_) => StatusCode::CONFLICT,
            MileageError::InsufficientBalance { .. } | MileageError::InvalidAmount(_) => {
                StatusCode::BAD_REQUEST
            }
            MileageError::Directory(_) => StatusCode::BAD_GATEWAY,
            MileageError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MileageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(?self);
        let body = json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("error"),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type MileageResult<T> = Result<T, MileageError>;
