//! Extractors for request metadata.
//!
//! Both are infallible, so handlers can take them without changing their
//! rejection behaviour.

use axum::{
    async_trait,
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

use crate::middleware::incoming_id;

/// Id tying a request to its log lines.
///
/// Reads the id [`crate::correlate_request`] stored in the extensions, so the
/// handler, its span and the response header all agree. Without the
/// middleware it parses `X-Correlation-ID` itself or makes up a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| incoming_id(&parts.headers))
            .unwrap_or_else(Uuid::new_v4);
        Ok(Self(id))
    }
}

/// Best guess at the caller's address.
///
/// Proxy headers win over the socket: the first hop of `X-Forwarded-For`,
/// then `X-Real-IP`, then the peer address when the server was started with
/// `into_make_service_with_connect_info`. Loopback when nothing is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let ip = header_ip(&parts.headers, "X-Forwarded-For")
            .or_else(|| header_ip(&parts.headers, "X-Real-IP"))
            .or(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(Self(ip))
    }
}

// First entry of a comma-separated address list
fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    value.split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CORRELATION_ID_HEADER;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap_or_default().into_parts();
        parts
    }

    #[tokio::test]
    async fn correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let mut parts = parts_with(&[(CORRELATION_ID_HEADER, &Uuid::new_v4().to_string())]);
        parts.extensions.insert(stored);

        let Ok(CorrelationId(id)) = CorrelationId::from_request_parts(&mut parts, &()).await;
        assert_eq!(id, stored);
    }

    #[tokio::test]
    async fn correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let mut parts = parts_with(&[(CORRELATION_ID_HEADER, &uuid.to_string())]);

        let Ok(CorrelationId(id)) = CorrelationId::from_request_parts(&mut parts, &()).await;
        assert_eq!(id, uuid);
    }

    #[tokio::test]
    async fn client_ip_from_x_forwarded_for() {
        let mut parts = parts_with(&[("X-Forwarded-For", "203.0.113.1, 198.51.100.1")]);

        let Ok(ClientIp(ip)) = ClientIp::from_request_parts(&mut parts, &()).await;
        assert_eq!(ip.to_string(), "203.0.113.1");
    }

    #[tokio::test]
    async fn client_ip_from_connect_info() {
        let mut parts = parts_with(&[]);
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 4000))));

        let Ok(ClientIp(ip)) = ClientIp::from_request_parts(&mut parts, &()).await;
        assert_eq!(ip.to_string(), "192.0.2.7");
    }

    #[tokio::test]
    async fn client_ip_fallback() {
        let mut parts = parts_with(&[("X-Real-IP", "not an ip")]);

        let Ok(ClientIp(ip)) = ClientIp::from_request_parts(&mut parts, &()).await;
        assert_eq!(ip.to_string(), "127.0.0.1");
    }
}
