use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::api::responses::{ApiResponse, ErrorResponse};

/// Errors raised by the payment core and its adapters.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    AmountInvalid(String),

    #[error("Payment callback is missing {0}")]
    SignatureMissing(&'static str),

    #[error("Payment signature verification failed")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transaction {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Optimistic version check lost against a concurrent commit.
    #[error("Transaction {0} was modified concurrently")]
    StaleRecord(Uuid),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::AmountInvalid(_)
            | AppError::SignatureMissing(_)
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_)
            | AppError::AlreadyPaid(_)
            | AppError::InvalidTransition(_)
            | AppError::StaleRecord(_) => StatusCode::CONFLICT,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::AmountInvalid(_) => "AMOUNT_INVALID",
            AppError::SignatureMissing(_) => "SIGNATURE_MISSING",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) | AppError::StaleRecord(_) => "CONFLICT",
            AppError::AlreadyPaid(_) => "ALREADY_PAID",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Upstream failures the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::GatewayUnavailable(_) | AppError::StaleRecord(_))
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_internal() {
            tracing::error!(error = %self, "Request failed with internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ApiResponse::<()>::error(ErrorResponse::new(self.error_code(), message));
        (status, Json(body)).into_response()
    }
}
