//! Authentication: session tokens, the session cookie and role extractors.
//!
//! - [`SessionKeys`]: signs and verifies HS256 session tokens
//! - [`session_layer`]: resolves the cookie into a [`SessionUser`] and
//!   slides the expiry
//! - [`RequireStaff`], [`RequireAdmin`]: role gates for handlers

pub mod middleware;
pub mod session;

pub use middleware::{session_layer, RequireAdmin, RequireStaff, SessionUser};
pub use session::{SessionClaims, SessionError, SessionKeys, SESSION_COOKIE};
