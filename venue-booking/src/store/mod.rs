//! Persistence seams.
//!
//! Reducers and services talk to storage through these traits; the SQLite
//! implementation lives in [`sqlite`]. Every method is one statement or one
//! transaction, so a caller never observes half of a slot flip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Booking, BookingDetails, BookingKey, QrToken, SlotKey, TimeSlot, User, Venue};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not open the database
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema migration failed
    #[error("migration error: {0}")]
    Migration(String),

    /// Statement failed
    #[error("query error: {0}")]
    Query(String),

    /// Unique constraint violated
    #[error("{0}")]
    Conflict(String),

    /// A stored value could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

/// Result alias for storage calls
pub type StoreResult<T> = Result<T, StoreError>;

/// A venue and its slots, ordered by start time
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueWithSlots {
    /// The venue
    pub venue: Venue,
    /// Its slots
    pub time_slots: Vec<TimeSlot>,
}

/// User accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up by email
    async fn find_user(&self, email: &str) -> StoreResult<Option<User>>;

    /// Every user, ordered by email
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Insert a new user; `Conflict` if the email is taken
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Overwrite every mutable field; `false` if the user no longer exists
    async fn save_user(&self, user: &User) -> StoreResult<bool>;

    /// Delete a user and their bookings, restoring the slots they held
    async fn delete_user(&self, email: &str) -> StoreResult<bool>;

    /// Delete unverified users whose registration code expired at or before `now`
    async fn delete_expired_unverified(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Set `lockout_enabled` on every existing user
    async fn set_lockout_enabled_for_all(&self, enabled: bool) -> StoreResult<u64>;
}

/// The persisted settings row
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Whether logins are restricted to admins
    async fn maintenance_mode(&self) -> StoreResult<bool>;

    /// Persist the maintenance flag
    async fn set_maintenance_mode(&self, enabled: bool) -> StoreResult<()>;
}

/// Venues and their time slots
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every venue with its slots, ordered by name
    async fn list_venues(&self) -> StoreResult<Vec<VenueWithSlots>>;

    /// Look up a venue by name
    async fn find_venue(&self, name: &str) -> StoreResult<Option<Venue>>;

    /// Slots of one venue, ordered by start time
    async fn venue_slots(&self, venue_name: &str) -> StoreResult<Vec<TimeSlot>>;

    /// Insert a venue; `Conflict` if the name is taken
    async fn insert_venue(&self, venue: &Venue) -> StoreResult<()>;

    /// Update every field but the name; `false` if missing
    async fn update_venue(&self, venue: &Venue) -> StoreResult<bool>;

    /// Delete a venue with its slots and their bookings
    async fn delete_venue(&self, name: &str) -> StoreResult<bool>;

    /// Insert an available slot; `Conflict` if the interval exists
    async fn insert_slot(&self, slot: &SlotKey) -> StoreResult<TimeSlot>;

    /// Delete a slot and its booking
    async fn delete_slot(&self, slot: &SlotKey) -> StoreResult<bool>;
}

/// Bookings and the slot availability they imply
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Claim an available slot and insert an unconfirmed booking, atomically.
    ///
    /// Returns `None` when no available slot matches, including when a
    /// concurrent booking claimed it first.
    async fn create_booking(
        &self,
        user_email: &str,
        slot: &SlotKey,
        screenshot: Option<Vec<u8>>,
    ) -> StoreResult<Option<Booking>>;

    /// Look up by composite key
    async fn find_booking(&self, key: &BookingKey) -> StoreResult<Option<BookingDetails>>;

    /// Confirmed booking holding exactly this token
    async fn find_confirmed_by_token(&self, token: &QrToken) -> StoreResult<Option<BookingDetails>>;

    /// Mark confirmed with `token`; `false` if the booking is gone
    async fn confirm_booking(&self, booking_id: i64, token: &QrToken) -> StoreResult<bool>;

    /// Delete a booking and make its slot available, atomically
    async fn remove_booking(&self, booking_id: i64) -> StoreResult<bool>;

    /// Every booking, ordered by id
    async fn list_bookings(&self) -> StoreResult<Vec<BookingDetails>>;

    /// Bookings of one user, ordered by id
    async fn bookings_for_user(&self, email: &str) -> StoreResult<Vec<BookingDetails>>;

    /// The uploaded payment screenshot, if the booking exists and has one
    async fn screenshot(&self, booking_id: i64) -> StoreResult<Option<Vec<u8>>>;
}
