//! Request correlation.
//!
//! [`correlate_request`] tags every request with a UUID, either the caller's
//! `X-Correlation-ID` when it parses or a fresh one. The id is put into the
//! request extensions for [`crate::CorrelationId`], recorded on an
//! `http_request` span around the handler, and echoed back on the response.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/venues", get(list_venues))
//!     .layer(axum::middleware::from_fn(correlate_request));
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Request and response header carrying the correlation id
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Caller-supplied correlation id, when present and a valid UUID
pub(crate) fn incoming_id(headers: &HeaderMap) -> Option<Uuid> {
    let raw = headers.get(CORRELATION_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok()
}

/// Middleware function for `axum::middleware::from_fn`
pub async fn correlate_request(mut req: Request, next: Next) -> Response {
    let id = incoming_id(req.headers()).unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = next.run(req).instrument(span).await;

    // A hyphenated UUID is always a valid header value
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extractors::CorrelationId;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/echo", get(|CorrelationId(id): CorrelationId| async move { id.to_string() }))
            .layer(axum::middleware::from_fn(correlate_request))
    }

    async fn send(header: Option<&str>) -> Response {
        let mut request = axum::http::Request::builder().uri("/echo");
        if let Some(value) = header {
            request = request.header(CORRELATION_ID_HEADER, value);
        }
        app().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn echoed(response: &Response) -> String {
        response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("correlation header on response")
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn fresh_id_when_header_absent() {
        let response = send(None).await;
        assert!(Uuid::parse_str(&echoed(&response)).is_ok());
    }

    #[tokio::test]
    async fn caller_id_reaches_handler_and_response() {
        let id = Uuid::new_v4().to_string();
        let response = send(Some(&id)).await;
        assert_eq!(echoed(&response), id);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, id.as_bytes());
    }

    #[tokio::test]
    async fn garbage_header_is_replaced() {
        let response = send(Some("not-a-uuid")).await;
        let id = echoed(&response);
        assert_ne!(id, "not-a-uuid");
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
