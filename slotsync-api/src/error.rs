//! Error Types for the SlotSync service layer
//!
//! - [`ServiceError`] is what the availability service, the refresher and the
//!   invalidation gateway return to Rust callers.
//! - [`ApiError`] is the JSON error body served over HTTP, categorized by
//!   [`ErrorCode`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use slotsync_core::{CacheKey, UpstreamError, ValidationError};
use std::fmt;
use thiserror::Error;

use crate::jobs::RefresherState;

// ============================================================================
// SERVICE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ServiceError {
    /// No cached entry exists and the synchronous fetch failed.
    #[error("Availability for {key} is unavailable: {source}")]
    AvailabilityUnavailable {
        key: CacheKey,
        #[source]
        source: UpstreamError,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Refresher is {actual}, expected {expected}")]
    RefresherState {
        expected: RefresherState,
        actual: RefresherState,
    },

    #[error(
        "Initial population failed for {count} tracked key(s): {last_error}",
        count = .failed_keys.len()
    )]
    InitialPopulation {
        failed_keys: Vec<CacheKey>,
        last_error: UpstreamError,
    },
}

impl ServiceError {
    /// Failures the conversational layer should answer with "try again
    /// shortly" rather than a hard error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::AvailabilityUnavailable { .. } => true,
            ServiceError::Upstream(err) => err.is_unavailability(),
            _ => false,
        }
    }
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Webhook signature missing, malformed, expired or wrong
    InvalidSignature,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    ValidationFailed,
    InvalidInput,

    // ========================================================================
    // Upstream Errors
    // ========================================================================
    /// Provider refused the request (4xx)
    UpstreamRejected,

    /// A booking mutation may or may not have been applied
    UpstreamAmbiguous,

    /// Provider answered with something we could not decode
    UpstreamInvalidResponse,

    /// Provider unreachable and nothing cached to fall back on
    AvailabilityUnavailable,

    Timeout,

    // ========================================================================
    // Service Errors
    // ========================================================================
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::UpstreamRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::UpstreamAmbiguous | ErrorCode::UpstreamInvalidResponse => {
                StatusCode::BAD_GATEWAY
            }
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::AvailabilityUnavailable | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSignature => "Webhook signature is invalid",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Request contains invalid input",
            ErrorCode::UpstreamRejected => "The scheduling provider rejected the request",
            ErrorCode::UpstreamAmbiguous => {
                "The scheduling provider may have applied the request; verify before retrying"
            }
            ErrorCode::UpstreamInvalidResponse => {
                "The scheduling provider returned an unexpected response"
            }
            ErrorCode::AvailabilityUnavailable => "Availability is temporarily unavailable",
            ErrorCode::Timeout => "The scheduling provider did not respond in time",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for HTTP endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSignature, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type alias for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        let code = match &err {
            UpstreamError::Rejected { .. } => ErrorCode::UpstreamRejected,
            UpstreamError::Ambiguous { .. } => ErrorCode::UpstreamAmbiguous,
            UpstreamError::InvalidResponse { .. } => ErrorCode::UpstreamInvalidResponse,
            UpstreamError::Timeout { .. } => ErrorCode::Timeout,
            UpstreamError::Transient { .. }
            | UpstreamError::Unavailable { .. }
            | UpstreamError::PoolClosed => ErrorCode::ServiceUnavailable,
        };
        let details = match &err {
            UpstreamError::Rejected { status, .. } => {
                Some(serde_json::json!({ "provider_status": status }))
            }
            _ => None,
        };
        let mut api = ApiError::new(code, err.to_string());
        api.details = details;
        api
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_failed(err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::AvailabilityUnavailable { ref key, .. } => {
                ApiError::new(ErrorCode::AvailabilityUnavailable, err.to_string())
                    .with_details(serde_json::json!({ "key": key.to_string() }))
            }
            ServiceError::Upstream(upstream) => upstream.into(),
            ServiceError::Validation(validation) => validation.into(),
            ServiceError::RefresherState { .. } | ServiceError::InitialPopulation { .. } => {
                tracing::error!(error = %err, "Refresher failure surfaced to HTTP");
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotsync_core::{SendPhase, UpstreamOperation};

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::AvailabilityUnavailable).unwrap();
        assert_eq!(json, "\"AVAILABILITY_UNAVAILABLE\"");
    }

    #[test]
    fn test_rejected_maps_to_422_with_provider_status() {
        let err = UpstreamError::Rejected {
            operation: UpstreamOperation::CreateBooking,
            status: 409,
            reason: "slot taken".to_string(),
        };
        let api: ApiError = err.into();
        assert_eq!(api.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.details, Some(serde_json::json!({ "provider_status": 409 })));
    }

    #[test]
    fn test_ambiguous_is_distinct_from_unavailable() {
        let ambiguous: ApiError = UpstreamError::Ambiguous {
            operation: UpstreamOperation::CreateBooking,
            reason: "timed out after send".to_string(),
        }
        .into();
        let unavailable: ApiError = UpstreamError::Unavailable {
            operation: UpstreamOperation::FetchAvailability,
            attempts: 4,
            last_error: Box::new(UpstreamError::Transient {
                operation: UpstreamOperation::FetchAvailability,
                reason: "HTTP 503".to_string(),
                phase: SendPhase::Sent,
            }),
        }
        .into();
        assert_eq!(ambiguous.code, ErrorCode::UpstreamAmbiguous);
        assert_eq!(unavailable.code, ErrorCode::ServiceUnavailable);
        assert_ne!(ambiguous.status_code(), unavailable.status_code());
    }

    #[test]
    fn test_availability_unavailable_is_retryable() {
        let key = CacheKey::for_days(
            "r",
            chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        )
        .unwrap();
        let err = ServiceError::AvailabilityUnavailable {
            key,
            source: UpstreamError::PoolClosed,
        };
        assert!(err.is_retryable());
        let api: ApiError = err.into();
        assert_eq!(api.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(api.details.is_some());
    }
}
