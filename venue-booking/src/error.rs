//! Domain errors and their HTTP mapping.

use booking_web::AppError;
use thiserror::Error;

/// Errors surfaced by account, catalog and booking operations.
///
/// Reducers keep the last one on their state, so the payloads are plain
/// strings and the type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed input or a field that failed validation
    #[error("{0}")]
    Validation(String),

    /// Unique key already taken
    #[error("{0}")]
    Duplicate(String),

    /// Wrong, missing or expired one-time code
    #[error("{0}")]
    InvalidOtp(String),

    /// No matching entity
    #[error("{0}")]
    NotFound(String),

    /// Bad credentials, locked or unverified account
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Maintenance mode
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Email delivery failure
    #[error("notification error: {0}")]
    Notification(String),
}

impl BookingError {
    /// Shorthand for `NotFound`
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Shorthand for `Unauthorized`
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

impl From<crate::store::StoreError> for BookingError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Conflict(message) => Self::Duplicate(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<crate::notifications::NotificationError> for BookingError {
    fn from(err: crate::notifications::NotificationError) -> Self {
        Self::Notification(err.to_string())
    }
}

impl From<crate::qr::QrError> for BookingError {
    fn from(err: crate::qr::QrError) -> Self {
        Self::Notification(err.to_string())
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(message) => Self::validation(message),
            BookingError::Duplicate(message) => Self::duplicate(message),
            BookingError::InvalidOtp(message) => {
                Self::new(axum::http::StatusCode::BAD_REQUEST, "INVALID_OTP", message)
            }
            BookingError::NotFound(message) => Self::missing(message),
            BookingError::Unauthorized(message) => Self::unauthorized(message),
            BookingError::Forbidden(message) => Self::forbidden(message),
            BookingError::ServiceUnavailable(message) => Self::unavailable(message),
            BookingError::Storage(_) => {
                Self::internal("A storage error occurred").with_source(anyhow::Error::new(err))
            }
            BookingError::Notification(_) => {
                Self::internal("Failed to send email").with_source(anyhow::Error::new(err))
            }
        }
    }
}

/// Result alias for domain operations
pub type BookingResult<T> = Result<T, BookingError>;
