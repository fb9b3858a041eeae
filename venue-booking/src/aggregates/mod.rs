//! Reducers for the venue booking service.
//!
//! - **Account**: registration, OTP verification, login lockout, password reset
//! - **Booking**: slot claims, payment review, cancellation, QR confirmation
//!
//! Each reducer works on a request-scoped snapshot loaded by a service and
//! sequences its writes and emails through feedback actions; the
//! [`EffectRunner`](booking_runtime::EffectRunner) drives it to completion.

use rand::thread_rng;

use crate::types::{OtpCode, QrToken};

pub mod account;
pub mod booking;

pub use account::{AccountAction, AccountEnvironment, AccountOutcome, AccountPolicy, AccountReducer, AccountState};
pub use booking::{BookingAction, BookingEnvironment, BookingOutcome, BookingReducer, BookingState};

/// Source of one-time codes and QR tokens
pub trait SecretSource: Send + Sync {
    /// Fresh six-digit code
    fn otp(&self) -> OtpCode;

    /// Fresh QR token
    fn qr_token(&self) -> QrToken;
}

/// Secrets from the thread-local CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSecrets;

impl SecretSource for RandomSecrets {
    fn otp(&self) -> OtpCode {
        OtpCode::generate(&mut thread_rng())
    }

    fn qr_token(&self) -> QrToken {
        QrToken::generate(&mut thread_rng())
    }
}

/// Returns the same code and token every time
#[derive(Debug, Clone)]
pub struct FixedSecrets {
    /// Code handed out by `otp`
    pub otp: OtpCode,
    /// Token handed out by `qr_token`
    pub qr_token: QrToken,
}

impl SecretSource for FixedSecrets {
    fn otp(&self) -> OtpCode {
        self.otp
    }

    fn qr_token(&self) -> QrToken {
        self.qr_token.clone()
    }
}
