//! Session credentials: HS256 JWTs carried in an HttpOnly cookie.

use axum_extra::extract::cookie::{Cookie, SameSite};
use booking_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::types::Role;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "vb_session";

/// Session token failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// Signing failed
    #[error("failed to sign session token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    /// Bad signature, malformed token or wrong algorithm
    #[error("invalid session token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Token past its expiry
    #[error("session expired")]
    Expired,
}

/// Claims inside a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User email
    pub sub: String,
    /// Role the user logged in as
    pub role: Role,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

impl SessionClaims {
    /// Expiry as an instant
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Signs, verifies and renews session tokens
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookie: bool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl", &self.ttl)
            .field("secure_cookie", &self.secure_cookie)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Keys derived from a shared secret
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration, secure_cookie: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            secure_cookie,
            clock,
        }
    }

    /// Current time on the session clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Sign a token for `email` valid for the session TTL from now
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Encode` if signing fails.
    pub fn issue(&self, email: &str, role: Role) -> Result<String, SessionError> {
        let now = self.now();
        let claims = SessionClaims {
            sub: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(SessionError::Encode)
    }

    /// Check signature and expiry against the session clock
    ///
    /// # Errors
    ///
    /// `Invalid` for a bad token, `Expired` once `exp` has passed.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the injected clock below
        validation.validate_exp = false;
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(SessionError::Invalid)?
            .claims;

        if self.now().timestamp() >= claims.exp {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    /// Sliding renewal: re-issue once less than half the TTL remains
    #[must_use]
    pub fn needs_renewal(&self, claims: &SessionClaims) -> bool {
        claims.expires_at() - self.now() < self.ttl / 2
    }

    /// Cookie carrying `token`
    #[must_use]
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .path("/")
            .build()
    }

    /// Cookie that clears the session
    #[must_use]
    pub fn removal_cookie() -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE).path("/").build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booking_testing::{test_clock, ManualClock};

    fn keys(clock: &ManualClock) -> SessionKeys {
        SessionKeys::new(b"test-secret", Duration::days(2), false, Arc::new(clock.clone()))
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let clock = ManualClock::new(test_clock().now());
        let keys = keys(&clock);

        let token = keys.issue("a@graduate.utm.my", Role::Staff).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, "a@graduate.utm.my");
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(claims.exp - claims.iat, Duration::days(2).num_seconds());
    }

    #[test]
    fn token_expires_after_ttl() {
        let clock = ManualClock::new(test_clock().now());
        let keys = keys(&clock);
        let token = keys.issue("a@graduate.utm.my", Role::Student).unwrap();

        clock.advance(Duration::days(2));
        assert!(matches!(keys.verify(&token), Err(SessionError::Expired)));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let clock = ManualClock::new(test_clock().now());
        let other = SessionKeys::new(b"other", Duration::days(2), false, Arc::new(clock.clone()));
        let token = other.issue("a@graduate.utm.my", Role::Admin).unwrap();

        assert!(matches!(keys(&clock).verify(&token), Err(SessionError::Invalid(_))));
    }

    #[test]
    fn renewal_starts_at_half_ttl() {
        let clock = ManualClock::new(test_clock().now());
        let keys = keys(&clock);
        let claims = keys.verify(&keys.issue("a@graduate.utm.my", Role::Student).unwrap()).unwrap();

        clock.advance(Duration::hours(23));
        assert!(!keys.needs_renewal(&claims));
        clock.advance(Duration::hours(2));
        assert!(keys.needs_renewal(&claims));
    }

    #[test]
    fn session_cookie_is_http_only_and_lax() {
        let clock = ManualClock::new(test_clock().now());
        let cookie = keys(&clock).cookie("t".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
