//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps custody errors to HTTP status codes and returns JSON error bodies
//! with a stable code, a message and optional details. Internal error
//! details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use depot_custody::CustodyError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "ALREADY_RETURNED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// A custody operation was rejected; status and code follow the variant.
    #[error(transparent)]
    Custody(#[from] CustodyError),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Custody(err) => (custody_status(err), err.code()),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Custody(CustodyError::Internal(_))
                | Self::Custody(CustodyError::Export(_))
        )
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Custody(CustodyError::AlreadyReturned { asset_id, status }) => Some(
                serde_json::json!({ "assetId": asset_id, "status": status }),
            ),
            _ => None,
        }
    }
}

fn custody_status(err: &CustodyError) -> StatusCode {
    match err {
        CustodyError::Validation(_) | CustodyError::MalformedToken(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CustodyError::NotFound(_) | CustodyError::UnknownAsset(_) => StatusCode::NOT_FOUND,
        CustodyError::Forbidden(_) | CustodyError::SeedMismatch(_) => StatusCode::FORBIDDEN,
        CustodyError::InvalidTransition(_)
        | CustodyError::PreconditionFailed(_)
        | CustodyError::AlreadyReturned { .. }
        | CustodyError::InvalidState(_)
        | CustodyError::DuplicateAssetId(_) => StatusCode::CONFLICT,
        CustodyError::Export(_) | CustodyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<depot_core::ValidationError> for AppError {
    fn from(err: depot_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
