//! Application layer - services the HTTP handlers call, and background jobs.
//!
//! - [`AccountService`], [`CatalogService`], [`BookingService`]: load a
//!   snapshot, run the reducer, translate the outcome
//! - [`OtpSweeper`]: periodic cleanup of lapsed registrations

mod services;
mod sweeper;

pub use services::{normalize_email, AccountService, BookingService, CatalogService};
pub use sweeper::OtpSweeper;
