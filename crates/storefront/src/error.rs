//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error response is JSON: `{"error": "<Code>", "message": "..", "retryable": bool}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::backend::BackendError;
use crate::services::{CartError, CheckoutError, VoucherError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Voucher(#[from] VoucherError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Request body or parameters failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

struct Classified {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
    details: Option<Value>,
}

impl Classified {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    const fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    fn unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "TransportFailed",
            "Service temporarily unavailable, please retry",
        )
        .retryable()
    }
}

fn classify_backend(err: &BackendError) -> Classified {
    if err.is_retryable() {
        return Classified::unavailable();
    }
    match err {
        BackendError::NotFound(what) => {
            Classified::new(StatusCode::NOT_FOUND, "NotFound", format!("Not found: {what}"))
        }
        BackendError::Conflict { reason, .. } => {
            Classified::new(StatusCode::CONFLICT, "Conflict", reason.clone())
        }
        BackendError::Rejected {
            reason, details, ..
        } => Classified {
            details: details.clone(),
            ..Classified::new(StatusCode::BAD_REQUEST, "RejectedByBackend", reason.clone())
        },
        _ => Classified::new(StatusCode::BAD_GATEWAY, "UpstreamError", "External service error"),
    }
}

impl AppError {
    fn classify(&self) -> Classified {
        match self {
            Self::Cart(err) => match err {
                CartError::ConcurrencyConflict { .. } => Classified::new(
                    StatusCode::CONFLICT,
                    "ConcurrencyConflict",
                    "Cart changed in another session, please reload",
                ),
                CartError::InsufficientStock { .. } => {
                    Classified::new(StatusCode::CONFLICT, "InsufficientStock", err.to_string())
                }
                CartError::ItemNotFound(_)
                | CartError::CartNotFound(_)
                | CartError::VariantNotFound(_) => {
                    Classified::new(StatusCode::NOT_FOUND, "NotFound", err.to_string())
                }
                CartError::InvalidQuantity => Classified::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "InvalidInput",
                    err.to_string(),
                ),
                CartError::Backend(e) => classify_backend(e),
            },
            Self::Voucher(err) => match err {
                VoucherError::TransportFailed(_) => Classified::unavailable(),
                VoucherError::Stale { .. } | VoucherError::Cancelled => {
                    Classified::new(StatusCode::CONFLICT, "StaleValidation", err.to_string())
                }
            },
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart => {
                    Classified::new(StatusCode::UNPROCESSABLE_ENTITY, "EmptyCart", err.to_string())
                }
                CheckoutError::InvalidInput(msg) => {
                    Classified::new(StatusCode::UNPROCESSABLE_ENTITY, "InvalidInput", msg.clone())
                }
                CheckoutError::Validation(reason) => Classified::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Validation",
                    reason.to_string(),
                ),
                CheckoutError::SubmissionInProgress => Classified::new(
                    StatusCode::CONFLICT,
                    "SubmissionInProgress",
                    err.to_string(),
                )
                .retryable(),
                CheckoutError::StaleVoucher { .. } => {
                    Classified::new(StatusCode::CONFLICT, "StaleVoucher", err.to_string())
                }
                CheckoutError::InventoryConflict { .. } => {
                    Classified::new(StatusCode::CONFLICT, "InventoryConflict", err.to_string())
                }
                CheckoutError::PriceMismatch { .. } => {
                    Classified::new(StatusCode::CONFLICT, "PriceMismatch", err.to_string())
                }
                CheckoutError::RejectedByBackend { reason, details } => Classified {
                    details: details.clone(),
                    ..Classified::new(StatusCode::BAD_REQUEST, "RejectedByBackend", reason.clone())
                },
                CheckoutError::TransportFailed(_) => Classified::unavailable(),
            },
            Self::Backend(err) => classify_backend(err),
            Self::InvalidInput(msg) => {
                Classified::new(StatusCode::UNPROCESSABLE_ENTITY, "InvalidInput", msg.clone())
            }
        }
    }

    /// HTTP status this error responds with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.classify().status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let classified = self.classify();

        // Capture server errors to Sentry
        if classified.status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorResponse {
            error: classified.code,
            message: classified.message,
            retryable: classified.retryable,
            details: classified.details,
        };
        (classified.status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
