//! Error handling for the Factory Flow Platform
//!
//! Maps domain errors to consistent JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::StockError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Domain errors raised by the ledger, engine and reconciler
    #[error(transparent)]
    Stock(#[from] StockError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "DUPLICATE_ENTRY".to_string(),
                    message: format!("A record with this {} already exists", field),
                    field: Some(field.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::Stock(err) => {
                let (status, code) = match err {
                    StockError::InsufficientStock { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
                    }
                    StockError::Conservation { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "CONSERVATION_VIOLATION")
                    }
                    StockError::OverReturn { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "OVER_RETURN")
                    }
                    StockError::ExpiredOrRejectedBatch { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "BATCH_BLOCKED")
                    }
                    StockError::SequenceIntegrity(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "SEQUENCE_INTEGRITY")
                    }
                    StockError::ConcurrencyConflict => {
                        (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT")
                    }
                    StockError::InvalidQuantity(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_QUANTITY")
                    }
                    StockError::InvalidStatusTransition { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATUS_TRANSITION")
                    }
                };
                (
                    status,
                    ErrorDetail {
                        code: code.to_string(),
                        message: err.to_string(),
                        field: None,
                    },
                )
            }
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
