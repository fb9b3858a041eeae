//! Session middleware and role extractors.
//!
//! [`session_layer`] reads the session cookie once per request and stores the
//! verified identity in the request extensions; the extractors only look
//! there.
//!
//! # Usage
//!
//! ```rust,ignore
//! use venue_booking::auth::{RequireStaff, SessionUser};
//!
//! async fn me(session: SessionUser) -> Json<MeResponse> { ... }
//!
//! async fn accept(staff: RequireStaff, Query(key): Query<BookingQuery>) -> WebResult<...> { ... }
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use booking_web::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

use super::session::{SessionKeys, SESSION_COOKIE};
use crate::types::Role;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// Session subject
    pub email: String,
    /// Role the session was issued for
    pub role: Role,
}

impl SessionUser {
    /// Whether the caller may act on data belonging to `email`
    #[must_use]
    pub fn may_act_for(&self, email: &str) -> bool {
        self.role.is_staff_or_admin() || self.email.eq_ignore_ascii_case(email.trim())
    }
}

/// Verify the session cookie and renew it when half its lifetime has passed.
///
/// Requests without a valid session pass through anonymous.
pub async fn session_layer(
    State(keys): State<Arc<SessionKeys>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let mut renewed = None;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match keys.verify(cookie.value()) {
            Ok(claims) => {
                if keys.needs_renewal(&claims) {
                    match keys.issue(&claims.sub, claims.role) {
                        Ok(token) => renewed = Some(token),
                        Err(error) => warn!(%error, "Session renewal failed"),
                    }
                }
                request.extensions_mut().insert(SessionUser {
                    email: claims.sub,
                    role: claims.role,
                });
            }
            Err(error) => debug!(%error, "Ignoring session cookie"),
        }
    }

    let response = next.run(request).await;

    let handler_set_session = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(SESSION_COOKIE));

    match renewed {
        Some(token) if !handler_set_session => {
            debug!("Session renewed");
            (jar.add(keys.cookie(token)), response).into_response()
        }
        _ => response,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

/// Caller with the staff or admin role
#[derive(Debug, Clone)]
pub struct RequireStaff(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionUser::from_request_parts(parts, state).await?;
        if !session.role.is_staff_or_admin() {
            return Err(AppError::forbidden("Staff or admin role required"));
        }
        Ok(Self(session))
    }
}

/// Caller with the admin role
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionUser::from_request_parts(parts, state).await?;
        if session.role != Role::Admin {
            return Err(AppError::forbidden("Admin role required"));
        }
        Ok(Self(session))
    }
}
