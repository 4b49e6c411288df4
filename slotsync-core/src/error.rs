//! Error types for SlotSync operations

use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Upstream operations, used to decide retry discipline and to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamOperation {
    FetchAvailability,
    FindBookings,
    ResolveUser,
    CreateBooking,
    CancelBooking,
}

impl UpstreamOperation {
    /// Mutations change provider state and are never retried blindly.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::CreateBooking | Self::CancelBooking)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchAvailability => "fetch_availability",
            Self::FindBookings => "find_bookings",
            Self::ResolveUser => "resolve_user",
            Self::CreateBooking => "create_booking",
            Self::CancelBooking => "cancel_booking",
        }
    }
}

impl fmt::Display for UpstreamOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a failed request got before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendPhase {
    /// No request bytes reached the provider (e.g. connection refused).
    NotSent,
    /// The request may have been received and acted upon.
    Sent,
}

/// Failures talking to the scheduling provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Network error, 5xx or per-attempt timeout. Retryable for reads.
    #[error("Transient failure during {operation}: {reason}")]
    Transient {
        operation: UpstreamOperation,
        reason: String,
        phase: SendPhase,
    },

    /// 4xx / validation failure. Never retried.
    #[error("{operation} rejected by provider with status {status}: {reason}")]
    Rejected {
        operation: UpstreamOperation,
        status: u16,
        reason: String,
    },

    /// A mutation may or may not have been applied.
    #[error("Outcome of {operation} is unknown: {reason}")]
    Ambiguous {
        operation: UpstreamOperation,
        reason: String,
    },

    /// Retries exhausted on transient failures.
    #[error("Provider unavailable for {operation} after {attempts} attempts: {last_error}")]
    Unavailable {
        operation: UpstreamOperation,
        attempts: u32,
        last_error: Box<UpstreamError>,
    },

    /// The overall call deadline elapsed.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: UpstreamOperation,
        elapsed: Duration,
    },

    /// The provider answered 2xx with a body we could not decode.
    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse {
        operation: UpstreamOperation,
        reason: String,
    },

    #[error("Upstream connection pool is closed")]
    PoolClosed,
}

impl UpstreamError {
    pub fn operation(&self) -> Option<UpstreamOperation> {
        match self {
            Self::Transient { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::Ambiguous { operation, .. }
            | Self::Unavailable { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::InvalidResponse { operation, .. } => Some(*operation),
            Self::PoolClosed => None,
        }
    }

    /// Reads retry every transient failure regardless of send phase.
    pub fn is_retryable_read(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// True only when the failure is known to have happened before any
    /// request bytes were sent.
    pub fn is_pre_send(&self) -> bool {
        matches!(
            self,
            Self::Transient {
                phase: SendPhase::NotSent,
                ..
            }
        )
    }

    /// Transient and timeout failures mean "try again later" to a caller.
    pub fn is_unavailability(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::Unavailable { .. } | Self::Timeout { .. } | Self::PoolClosed
        )
    }
}

/// Result type alias for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Validation errors for keys, windows and booking requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Resource identifier must not be empty")]
    EmptyResource,

    #[error("Invalid date window: {start} is after {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Malformed or unrecognized provider events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown provider event kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Provider event missing field: {field}")]
    MissingField { field: String },

    #[error("Invalid provider event field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Malformed provider event: {reason}")]
    Malformed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}
