//! HTTP handlers, organized by resource:
//! - Users: registration, OTP, login/logout, administration, global flags
//! - Venues: catalog reads and writes
//! - Time slots: per-venue intervals
//! - Bookings: creation, payment review, cancellation, QR validation

pub mod bookings;
pub mod timeslots;
pub mod users;
pub mod venues;

use booking_web::AppError;
use serde::Serialize;

use crate::types::{parse_time_of_day, SlotKey};

/// `{ "message": ... }` confirmation body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human readable outcome
    pub message: String,
}

impl MessageResponse {
    /// Creates a new `MessageResponse`
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Build a slot key from raw request fields
///
/// # Errors
///
/// Returns a validation error for unparseable times or an inverted interval.
pub fn slot_from(venue_name: &str, start_time: &str, end_time: &str) -> Result<SlotKey, AppError> {
    let start = parse_time_of_day(start_time)?;
    let end = parse_time_of_day(end_time)?;
    Ok(SlotKey::new(venue_name, start, end)?)
}
