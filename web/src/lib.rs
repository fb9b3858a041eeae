//! HTTP plumbing shared by the venue booking server.
//!
//! Handlers in `venue-booking` stay thin: they parse the request, call a
//! service that runs the reducers, and turn the result into JSON. What they
//! have in common lives here:
//!
//! - [`AppError`], the one error type every handler returns
//! - [`CorrelationId`] and [`ClientIp`] extractors
//! - [`correlate_request`], which tags requests and their log spans
//! - liveness and readiness handlers in [`handlers::health`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId};
pub use middleware::{correlate_request, CORRELATION_ID_HEADER};

/// What handlers return
pub type WebResult<T> = Result<T, AppError>;
