//! Venue Booking - a campus venue booking API built on reducers
//!
//! Students register with a university email, verify it with an emailed
//! one-time code and book time slots at venues, uploading a payment
//! screenshot. Staff review the payment: accepting confirms the booking and
//! emails a QR code, rejecting deletes it. At the door the QR code is
//! validated against the confirmed booking.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum)                 api/ + auth/ (session cookie, role extractors)
//!      │
//!      ▼
//! Services                    app/ (AccountService, CatalogService, BookingService)
//!      │  send commands, drive effects to completion
//!      ▼
//! Reducers                    aggregates/ (AccountReducer, BookingReducer)
//!      │  effects call out to
//!      ▼
//! Collaborators               store/ (sqlx SQLite), notifications/ (lettre), qr/
//! ```
//!
//! # Key Invariants
//!
//! - A slot is unavailable exactly while a booking holds it. Claiming a slot
//!   and creating its booking is one transaction, so two concurrent claims
//!   cannot both win.
//! - A booking carries a QR token exactly when it is confirmed.
//! - Registration codes expire after 10 minutes and reset codes after 5. A
//!   failed registration verification deletes the pending user.
//! - With lockout enabled, the 5th consecutive wrong password locks the
//!   account for an hour.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod notifications;
pub mod qr;
pub mod server;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{BookingError, BookingResult};
pub use types::*;
