//! SQLite store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    BookingStore, CatalogStore, SettingsStore, StoreError, StoreResult, UserStore, VenueWithSlots,
};
use crate::types::{
    parse_time_of_day, time_of_day, Booking, BookingDetails, BookingKey, OtpCode, PendingOtp,
    QrToken, Role, SlotKey, TimeSlot, User, Venue,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `sqlx` pool over one SQLite database
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and migrate it.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the URL is malformed or the file cannot be
    /// opened, `Migration` if the schema cannot be applied.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(url = %url, max_connections, "Database opened");

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database, for tests and demos.
    ///
    /// # Errors
    ///
    /// Returns `Connection` or `Migration` as for [`Self::connect`].
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .foreign_keys(true);

        // One connection that never recycles: the database lives and dies with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        debug!("Database migrations complete");
        Ok(())
    }

    /// Round-trip a trivial query, for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the database is unreachable.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn time_text(time: NaiveTime) -> String {
    time.format(time_of_day::FORMAT).to_string()
}

fn parse_time(text: &str) -> StoreResult<NaiveTime> {
    parse_time_of_day(text).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn pending_otp(code: Option<i64>, expiry: Option<i64>) -> StoreResult<Option<PendingOtp>> {
    match (code, expiry) {
        (Some(code), Some(expiry)) => {
            let code = u32::try_from(code)
                .map_err(|_| StoreError::Corrupt(format!("otp out of range: {code}")))?;
            Ok(Some(PendingOtp {
                code: OtpCode::new(code),
                expires_at: from_millis(expiry)?,
            }))
        }
        _ => Ok(None),
    }
}

#[derive(FromRow)]
struct UserRow {
    email: String,
    name: String,
    password: String,
    role: String,
    failed_login_attempts: i64,
    lockout_end: Option<i64>,
    lockout_enabled: bool,
    email_verified: bool,
    registration_otp: Option<i64>,
    registration_otp_expiry: Option<i64>,
    password_reset_otp: Option<i64>,
    password_reset_otp_expiry: Option<i64>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(Self {
            role: Role::from_str(&row.role).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            failed_login_attempts: u32::try_from(row.failed_login_attempts).unwrap_or(u32::MAX),
            lockout_end: row.lockout_end.map(from_millis).transpose()?,
            registration_otp: pending_otp(row.registration_otp, row.registration_otp_expiry)?,
            password_reset_otp: pending_otp(row.password_reset_otp, row.password_reset_otp_expiry)?,
            email: row.email,
            name: row.name,
            password: row.password,
            lockout_enabled: row.lockout_enabled,
            email_verified: row.email_verified,
        })
    }
}

#[derive(FromRow)]
struct VenueRow {
    name: String,
    location: String,
    capacity: i64,
    venue_type: String,
    status: bool,
    price: f64,
}

impl TryFrom<VenueRow> for Venue {
    type Error = StoreError;

    fn try_from(row: VenueRow) -> StoreResult<Self> {
        Ok(Self {
            capacity: u32::try_from(row.capacity)
                .map_err(|_| StoreError::Corrupt(format!("capacity out of range: {}", row.capacity)))?,
            name: row.name,
            location: row.location,
            venue_type: row.venue_type,
            status: row.status,
            price: row.price,
        })
    }
}

#[derive(FromRow)]
struct SlotRow {
    id: i64,
    venue_name: String,
    start_time: String,
    end_time: String,
    is_available: bool,
}

impl TryFrom<SlotRow> for TimeSlot {
    type Error = StoreError;

    fn try_from(row: SlotRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            start_time: parse_time(&row.start_time)?,
            end_time: parse_time(&row.end_time)?,
            venue_name: row.venue_name,
            is_available: row.is_available,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: i64,
    user_email: String,
    time_slot_id: i64,
    is_confirmed: bool,
    qr_token: String,
    has_screenshot: bool,
    venue_name: String,
    start_time: String,
    end_time: String,
}

impl TryFrom<BookingRow> for BookingDetails {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        let qr_token = (!row.qr_token.is_empty()).then(|| QrToken::from_string(row.qr_token));
        Ok(Self {
            slot: SlotKey {
                venue_name: row.venue_name,
                start_time: parse_time(&row.start_time)?,
                end_time: parse_time(&row.end_time)?,
            },
            booking: Booking {
                id: row.id,
                user_email: row.user_email,
                time_slot_id: row.time_slot_id,
                is_confirmed: row.is_confirmed,
                qr_token,
            },
            has_screenshot: row.has_screenshot,
        })
    }
}

const BOOKING_SELECT: &str = "SELECT b.id, b.user_email, b.time_slot_id, b.is_confirmed, b.qr_token, \
     b.payment_screenshot IS NOT NULL AS has_screenshot, \
     t.venue_name, t.start_time, t.end_time \
     FROM bookings b JOIN time_slots t ON t.id = b.time_slot_id";

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_user(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (email, name, password, role, failed_login_attempts, lockout_end, \
             lockout_enabled, email_verified, registration_otp, registration_otp_expiry, \
             password_reset_otp, password_reset_otp_expiry) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(i64::from(user.failed_login_attempts))
        .bind(user.lockout_end.map(to_millis))
        .bind(user.lockout_enabled)
        .bind(user.email_verified)
        .bind(user.registration_otp.map(|otp| i64::from(otp.code.value())))
        .bind(user.registration_otp.map(|otp| to_millis(otp.expires_at)))
        .bind(user.password_reset_otp.map(|otp| i64::from(otp.code.value())))
        .bind(user.password_reset_otp.map(|otp| to_millis(otp.expires_at)))
        .execute(&self.pool)
        .await
        .map_err(|err| match StoreError::from(err) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("A user with email {} already exists.", user.email))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn save_user(&self, user: &User) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, password = ?, role = ?, failed_login_attempts = ?, \
             lockout_end = ?, lockout_enabled = ?, email_verified = ?, registration_otp = ?, \
             registration_otp_expiry = ?, password_reset_otp = ?, password_reset_otp_expiry = ? \
             WHERE email = ?",
        )
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(i64::from(user.failed_login_attempts))
        .bind(user.lockout_end.map(to_millis))
        .bind(user.lockout_enabled)
        .bind(user.email_verified)
        .bind(user.registration_otp.map(|otp| i64::from(otp.code.value())))
        .bind(user.registration_otp.map(|otp| to_millis(otp.expires_at)))
        .bind(user.password_reset_otp.map(|otp| i64::from(otp.code.value())))
        .bind(user.password_reset_otp.map(|otp| to_millis(otp.expires_at)))
        .bind(&user.email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, email: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE time_slots SET is_available = 1 \
             WHERE id IN (SELECT time_slot_id FROM bookings WHERE user_email = ?)",
        )
        .bind(email)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM users WHERE email = ?")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_unverified(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let cutoff = to_millis(now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE time_slots SET is_available = 1 WHERE id IN ( \
             SELECT b.time_slot_id FROM bookings b JOIN users u ON u.email = b.user_email \
             WHERE u.email_verified = 0 AND u.registration_otp_expiry <= ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM users WHERE email_verified = 0 AND registration_otp_expiry <= ?",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn set_lockout_enabled_for_all(&self, enabled: bool) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE users SET lockout_enabled = ?")
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Settings
// ============================================================================

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn maintenance_mode(&self) -> StoreResult<bool> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT maintenance_mode FROM settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(enabled.unwrap_or(false))
    }

    async fn set_maintenance_mode(&self, enabled: bool) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO settings (id, maintenance_mode) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET maintenance_mode = excluded.maintenance_mode",
        )
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn list_venues(&self) -> StoreResult<Vec<VenueWithSlots>> {
        let venues: Vec<Venue> = collect(
            sqlx::query_as::<_, VenueRow>("SELECT * FROM venues ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )?;
        let slots: Vec<TimeSlot> = collect(
            sqlx::query_as::<_, SlotRow>(
                "SELECT * FROM time_slots ORDER BY venue_name, start_time, end_time",
            )
            .fetch_all(&self.pool)
            .await?,
        )?;

        let mut listing: Vec<VenueWithSlots> = venues
            .into_iter()
            .map(|venue| VenueWithSlots {
                venue,
                time_slots: Vec::new(),
            })
            .collect();
        for slot in slots {
            if let Some(entry) = listing.iter_mut().find(|e| e.venue.name == slot.venue_name) {
                entry.time_slots.push(slot);
            }
        }
        Ok(listing)
    }

    async fn find_venue(&self, name: &str) -> StoreResult<Option<Venue>> {
        sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Venue::try_from)
            .transpose()
    }

    async fn venue_slots(&self, venue_name: &str) -> StoreResult<Vec<TimeSlot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            "SELECT * FROM time_slots WHERE venue_name = ? ORDER BY start_time, end_time",
        )
        .bind(venue_name)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn insert_venue(&self, venue: &Venue) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO venues (name, location, capacity, venue_type, status, price) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&venue.name)
        .bind(&venue.location)
        .bind(i64::from(venue.capacity))
        .bind(&venue.venue_type)
        .bind(venue.status)
        .bind(venue.price)
        .execute(&self.pool)
        .await
        .map_err(|err| match StoreError::from(err) {
            StoreError::Conflict(_) => {
                StoreError::Conflict("A venue with this name already exists.".to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn update_venue(&self, venue: &Venue) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE venues SET location = ?, capacity = ?, venue_type = ?, status = ?, price = ? \
             WHERE name = ?",
        )
        .bind(&venue.location)
        .bind(i64::from(venue.capacity))
        .bind(&venue.venue_type)
        .bind(venue.status)
        .bind(venue.price)
        .bind(&venue.name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_venue(&self, name: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM venues WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_slot(&self, slot: &SlotKey) -> StoreResult<TimeSlot> {
        let result = sqlx::query(
            "INSERT INTO time_slots (venue_name, start_time, end_time, is_available) VALUES (?, ?, ?, 1)",
        )
        .bind(&slot.venue_name)
        .bind(time_text(slot.start_time))
        .bind(time_text(slot.end_time))
        .execute(&self.pool)
        .await
        .map_err(|err| match StoreError::from(err) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("Time slot {slot} already exists."))
            }
            other => other,
        })?;

        Ok(TimeSlot {
            id: result.last_insert_rowid(),
            venue_name: slot.venue_name.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            is_available: true,
        })
    }

    async fn delete_slot(&self, slot: &SlotKey) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM time_slots WHERE venue_name = ? AND start_time = ? AND end_time = ?",
        )
        .bind(&slot.venue_name)
        .bind(time_text(slot.start_time))
        .bind(time_text(slot.end_time))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Bookings
// ============================================================================

#[async_trait]
impl BookingStore for SqliteStore {
    async fn create_booking(
        &self,
        user_email: &str,
        slot: &SlotKey,
        screenshot: Option<Vec<u8>>,
    ) -> StoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await?;

        // The claim is the first statement, so the write lock is taken before
        // anything is read and competing claims serialize on it.
        let claimed: Option<i64> = sqlx::query_scalar(
            "UPDATE time_slots SET is_available = 0 \
             WHERE venue_name = ? AND start_time = ? AND end_time = ? AND is_available = 1 \
             RETURNING id",
        )
        .bind(&slot.venue_name)
        .bind(time_text(slot.start_time))
        .bind(time_text(slot.end_time))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(time_slot_id) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let result = sqlx::query(
            "INSERT INTO bookings (user_email, time_slot_id, payment_screenshot, is_confirmed, qr_token) \
             VALUES (?, ?, ?, 0, '')",
        )
        .bind(user_email)
        .bind(time_slot_id)
        .bind(screenshot)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Booking {
            id: result.last_insert_rowid(),
            user_email: user_email.to_string(),
            time_slot_id,
            is_confirmed: false,
            qr_token: None,
        }))
    }

    async fn find_booking(&self, key: &BookingKey) -> StoreResult<Option<BookingDetails>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE b.user_email = ? AND t.venue_name = ? \
             AND t.start_time = ? AND t.end_time = ?"
        ))
        .bind(&key.user_email)
        .bind(&key.slot.venue_name)
        .bind(time_text(key.slot.start_time))
        .bind(time_text(key.slot.end_time))
        .fetch_optional(&self.pool)
        .await?
        .map(BookingDetails::try_from)
        .transpose()
    }

    async fn find_confirmed_by_token(&self, token: &QrToken) -> StoreResult<Option<BookingDetails>> {
        if token.as_str().is_empty() {
            return Ok(None);
        }
        sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE b.qr_token = ? AND b.is_confirmed = 1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(BookingDetails::try_from)
        .transpose()
    }

    async fn confirm_booking(&self, booking_id: i64, token: &QrToken) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE bookings SET is_confirmed = 1, qr_token = ? WHERE id = ?")
            .bind(token.as_str())
            .bind(booking_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_booking(&self, booking_id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let released: Option<i64> =
            sqlx::query_scalar("DELETE FROM bookings WHERE id = ? RETURNING time_slot_id")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(time_slot_id) = released else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE time_slots SET is_available = 1 WHERE id = ?")
            .bind(time_slot_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_bookings(&self) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!("{BOOKING_SELECT} ORDER BY b.id"))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn bookings_for_user(&self, email: &str) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE b.user_email = ? ORDER BY b.id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn screenshot(&self, booking_id: i64) -> StoreResult<Option<Vec<u8>>> {
        let screenshot: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT payment_screenshot FROM bookings WHERE id = ?")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(screenshot.flatten())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(value: &str) -> NaiveTime {
        parse_time_of_day(value).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_735_689_600_000).unwrap()
    }

    fn hall_a() -> Venue {
        Venue {
            name: "Hall A".into(),
            location: "Block N28".into(),
            capacity: 120,
            venue_type: "Hall".into(),
            status: true,
            price: 80.0,
        }
    }

    fn verified(email: &str) -> User {
        let mut user = User::new_student(email.into(), "student1".into(), "secret".into());
        user.email_verified = true;
        user
    }

    async fn seeded() -> (SqliteStore, SlotKey) {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_venue(&hall_a()).await.unwrap();
        store.insert_user(&verified("ali@graduate.utm.my")).await.unwrap();
        let key = SlotKey::new("Hall A", t("09:00"), t("10:00")).unwrap();
        store.insert_slot(&key).await.unwrap();
        (store, key)
    }

    async fn slot_available(store: &SqliteStore, key: &SlotKey) -> bool {
        store
            .venue_slots(&key.venue_name)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.start_time == key.start_time && s.end_time == key.end_time)
            .unwrap()
            .is_available
    }

    #[tokio::test]
    async fn user_round_trip_keeps_otp_and_lockout() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut user = User::new_student("a@graduate.utm.my".into(), "student1".into(), "pw".into());
        user.registration_otp = Some(PendingOtp {
            code: OtpCode::new(482_913),
            expires_at: now() + Duration::minutes(10),
        });
        user.lockout_end = Some(now() + Duration::hours(1));
        user.failed_login_attempts = 5;
        store.insert_user(&user).await.unwrap();

        assert_eq!(store.find_user("a@graduate.utm.my").await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn duplicate_user_is_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_user(&verified("a@graduate.utm.my")).await.unwrap();

        let err = store.insert_user(&verified("a@graduate.utm.my")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn booking_claims_slot_once() {
        let (store, key) = seeded().await;

        let first = store.create_booking("ali@graduate.utm.my", &key, Some(vec![1, 2, 3])).await.unwrap();
        assert!(first.is_some());
        assert!(!slot_available(&store, &key).await);

        let second = store.create_booking("ali@graduate.utm.my", &key, None).await.unwrap();
        assert!(second.is_none());
        assert_eq!(store.list_bookings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_booking_restores_slot() {
        let (store, key) = seeded().await;
        let booking = store.create_booking("ali@graduate.utm.my", &key, None).await.unwrap().unwrap();

        assert!(store.remove_booking(booking.id).await.unwrap());
        assert!(slot_available(&store, &key).await);
        assert!(!store.remove_booking(booking.id).await.unwrap());
    }

    #[tokio::test]
    async fn confirmed_token_lookup() {
        let (store, key) = seeded().await;
        let booking = store.create_booking("ali@graduate.utm.my", &key, None).await.unwrap().unwrap();
        let token = QrToken::from_string("dG9rZW4=".into());

        assert!(store.find_confirmed_by_token(&token).await.unwrap().is_none());
        store.confirm_booking(booking.id, &token).await.unwrap();

        let found = store.find_confirmed_by_token(&token).await.unwrap().unwrap();
        assert_eq!(found.booking.id, booking.id);
        assert_eq!(found.slot, key);
        assert!(store.find_confirmed_by_token(&QrToken::from_string(String::new())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_user_frees_their_slots() {
        let (store, key) = seeded().await;
        store.create_booking("ali@graduate.utm.my", &key, None).await.unwrap();

        assert!(store.delete_user("ali@graduate.utm.my").await.unwrap());
        assert!(slot_available(&store, &key).await);
        assert!(store.list_bookings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_unverified() {
        let store = SqliteStore::in_memory().await.unwrap();
        let pending = |email: &str, expires_at| {
            let mut user = User::new_student(email.into(), "student1".into(), "pw".into());
            user.registration_otp = Some(PendingOtp { code: OtpCode::new(111_111), expires_at });
            user
        };
        store.insert_user(&pending("old@graduate.utm.my", now() - Duration::seconds(1))).await.unwrap();
        store.insert_user(&pending("edge@graduate.utm.my", now())).await.unwrap();
        store.insert_user(&pending("new@graduate.utm.my", now() + Duration::minutes(5))).await.unwrap();
        store.insert_user(&verified("done@graduate.utm.my")).await.unwrap();

        assert_eq!(store.delete_expired_unverified(now()).await.unwrap(), 2);
        assert_eq!(store.delete_expired_unverified(now()).await.unwrap(), 0);

        let left: Vec<String> = store.list_users().await.unwrap().into_iter().map(|u| u.email).collect();
        assert_eq!(left, vec!["done@graduate.utm.my", "new@graduate.utm.my"]);
    }

    #[tokio::test]
    async fn venue_delete_cascades() {
        let (store, key) = seeded().await;
        store.create_booking("ali@graduate.utm.my", &key, None).await.unwrap();

        assert!(store.delete_venue("Hall A").await.unwrap());
        assert!(store.venue_slots("Hall A").await.unwrap().is_empty());
        assert!(store.list_bookings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_slot_is_conflict() {
        let (store, key) = seeded().await;
        assert!(matches!(store.insert_slot(&key).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn maintenance_flag_persists() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(!store.maintenance_mode().await.unwrap());

        store.set_maintenance_mode(true).await.unwrap();
        assert!(store.maintenance_mode().await.unwrap());
    }

    #[tokio::test]
    async fn lockout_toggle_is_bulk() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_user(&verified("a@graduate.utm.my")).await.unwrap();
        store.insert_user(&verified("b@graduate.utm.my")).await.unwrap();

        assert_eq!(store.set_lockout_enabled_for_all(false).await.unwrap(), 2);
        assert!(store.list_users().await.unwrap().iter().all(|u| !u.lockout_enabled));
    }
}
