//! Application state for the venue booking HTTP server.

use axum::extract::FromRef;
use booking_core::environment::Clock;
use std::sync::Arc;

use crate::aggregates::{AccountEnvironment, AccountPolicy, BookingEnvironment, SecretSource};
use crate::app::{AccountService, BookingService, CatalogService};
use crate::auth::SessionKeys;
use crate::notifications::Mailer;
use crate::store::SqliteStore;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Registration, login and user administration
    pub accounts: Arc<AccountService>,
    /// Venues and time slots
    pub catalog: Arc<CatalogService>,
    /// Booking lifecycle and queries
    pub bookings: Arc<BookingService>,
    /// Session token signing
    pub sessions: Arc<SessionKeys>,
    /// Database, for readiness checks
    pub store: Arc<SqliteStore>,
}

impl AppState {
    /// Wire the services over one store and mailer.
    #[must_use]
    pub fn new(
        store: Arc<SqliteStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        secrets: Arc<dyn SecretSource>,
        sessions: Arc<SessionKeys>,
        policy: AccountPolicy,
    ) -> Self {
        let account_env = AccountEnvironment::new(
            store.clone(),
            mailer.clone(),
            clock,
            secrets.clone(),
            policy,
        );
        let booking_env = BookingEnvironment::new(store.clone(), mailer, secrets);

        Self {
            accounts: Arc::new(AccountService::new(store.clone(), account_env)),
            catalog: Arc::new(CatalogService::new(store.clone())),
            bookings: Arc::new(BookingService::new(store.clone(), store.clone(), booking_env)),
            sessions,
            store,
        }
    }
}

// The session middleware only needs the keys
impl FromRef<AppState> for Arc<SessionKeys> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.sessions.clone()
    }
}
