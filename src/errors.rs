use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Where navigational failures (unpaid or missing sessions) send the browser.
pub const NAVIGATION_FALLBACK: &str = "/";

/// Standard error body returned by every JSON endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Forbidden")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cart is empty or invalid")]
    EmptyOrInvalidCart,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Checkout session is not paid")]
    Unpaid,

    #[error("Checkout session is missing")]
    MissingSession,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        ServiceError::ProviderUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidInput(_) | Self::EmptyOrInvalidCart => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unpaid | Self::MissingSession => StatusCode::SEE_OTHER,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Navigational failures answer with a redirect instead of an error payload.
    pub fn is_navigational(&self) -> bool {
        matches!(self, Self::Unpaid | Self::MissingSession)
    }

    /// Returns the error message suitable for HTTP responses.
    /// Provider and internal errors return generic messages to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::ProviderUnavailable(_) => "Payment provider unavailable".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Forbidden(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if self.is_navigational() {
            tracing::debug!(reason = %self, "redirecting to {}", NAVIGATION_FALLBACK);
            return Redirect::to(NAVIGATION_FALLBACK).into_response();
        }

        let status = self.status_code();
        match &self {
            Self::ProviderUnavailable(detail) => {
                tracing::error!(detail = %detail, "payment provider call failed");
            }
            Self::InternalError(detail) => {
                tracing::error!(detail = %detail, "internal error");
            }
            _ => {}
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(err)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
        response
    }
}
