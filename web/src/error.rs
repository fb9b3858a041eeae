//! HTTP error type shared by every handler.
//!
//! Handlers return [`AppError`] and let `?` do the conversion. The body is
//! always `{ "code": ..., "message": ... }`. 5xx responses are logged once,
//! here, with the attached source chain; 4xx responses only at debug level.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Error rendered as a JSON response.
///
/// ```ignore
/// async fn venue(Path(name): Path<String>) -> Result<Json<Venue>, AppError> {
///     let venue = catalog.venue(&name).await?
///         .ok_or_else(|| AppError::not_found("Venue", &name))?;
///     Ok(Json(venue))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    // Logged, never sent to the client
    source: Option<anyhow::Error>,
}

#[derive(Serialize)]
struct Body<'a> {
    code: &'a str,
    message: &'a str,
}

impl AppError {
    /// Error with an explicit status and code
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Keep `source` for the server log
    #[must_use]
    pub fn with_source(self, source: anyhow::Error) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }

    /// Response status
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code, e.g. `NOT_FOUND`
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Message shown to the user
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 400 for malformed input
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 400 for input that breaks a business rule
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// 400 for a unique-key collision
    #[must_use]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "DUPLICATE", message)
    }

    /// 401
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 404 phrased as "`{resource} {id}` not found"
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::missing(format!("{resource} {id} not found"))
    }

    /// 404 with a free-form message
    #[must_use]
    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 500
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// 503, used while the service is in maintenance
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    fn log(&self) {
        if !self.status.is_server_error() {
            tracing::debug!(status = %self.status, code = self.code, message = %self.message, "request rejected");
            return;
        }
        let cause = self.source.as_ref().map(|e| format!("{e:#}"));
        tracing::error!(
            status = %self.status,
            code = self.code,
            message = %self.message,
            cause = cause.as_deref().unwrap_or("-"),
            "request failed"
        );
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| -> &(dyn std::error::Error + 'static) { e.as_ref() })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = Body {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
