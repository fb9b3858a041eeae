//! Domain types for the venue booking service.
//!
//! Value objects and entities shared by the reducers, the store and the HTTP
//! layer. Users are keyed by email and venues by name; slots and bookings
//! carry numeric row ids but are addressed externally by their natural
//! composite keys.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveTime, Utc};
use rand::{Rng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::BookingError;

// ============================================================================
// Roles
// ============================================================================

/// Role carried by a user and by their session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Books venues
    Student,
    /// Runs the system; the only role allowed in during maintenance
    Admin,
    /// Manages venues and reviews payments
    Staff,
}

impl Role {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Admin => "admin",
            Self::Staff => "staff",
        }
    }

    /// Whether this role may manage venues, slots and payments
    #[must_use]
    pub const fn is_staff_or_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            other => Err(BookingError::Validation(format!("Unknown role: {other}"))),
        }
    }
}

// ============================================================================
// Account values
// ============================================================================

#[allow(clippy::expect_used)] // literal pattern
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@graduate\.utm\.my$").expect("email pattern is a valid regex")
});

/// Minimum display-name length, in characters
pub const NAME_MIN_LEN: usize = 6;
/// Maximum display-name length, in characters
pub const NAME_MAX_LEN: usize = 18;

/// Check an email against the accepted university domain.
///
/// # Errors
///
/// Returns `Validation` if the address is not a `@graduate.utm.my` address.
pub fn validate_email(email: &str) -> Result<(), BookingError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(BookingError::Validation(
            "Email must be a valid @graduate.utm.my address.".to_string(),
        ))
    }
}

/// Check a display name's length.
///
/// # Errors
///
/// Returns `Validation` if the name is shorter than 6 or longer than 18 characters.
pub fn validate_name(name: &str) -> Result<(), BookingError> {
    let len = name.chars().count();
    if (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(BookingError::Validation(format!(
            "Username must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters long."
        )))
    }
}

/// Six-digit one-time code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OtpCode(u32);

impl OtpCode {
    /// Smallest issued code
    pub const MIN: u32 = 100_000;
    /// Largest issued code
    pub const MAX: u32 = 999_999;

    /// Draw a uniformly random code in `100000..=999999`
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX))
    }

    /// Wrap a code received from a client or loaded from storage
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Numeric value
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// An issued code and the instant it stops being valid
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingOtp {
    /// The code
    pub code: OtpCode,
    /// First instant at which the code is rejected
    pub expires_at: DateTime<Utc>,
}

impl PendingOtp {
    /// Valid only for a matching code strictly before expiry
    #[must_use]
    pub fn accepts(&self, code: OtpCode, now: DateTime<Utc>) -> bool {
        self.code == code && now < self.expires_at
    }
}

/// Derived security state of an account
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    /// Registered, email not yet verified
    Unverified,
    /// Verified and allowed to log in
    Active,
    /// Verified but refusing logins until the given instant
    Locked {
        /// End of the lockout window
        until: DateTime<Utc>,
    },
}

// ============================================================================
// Entities
// ============================================================================

/// User account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Unique, immutable identifier
    pub email: String,
    /// Display name
    pub name: String,
    /// Stored as given and compared by exact match
    pub password: String,
    /// Role
    pub role: Role,
    /// Consecutive failed logins since the last success
    pub failed_login_attempts: u32,
    /// End of the current lockout window
    pub lockout_end: Option<DateTime<Utc>>,
    /// Whether failed logins count towards a lockout
    pub lockout_enabled: bool,
    /// Verified email address
    pub email_verified: bool,
    /// Outstanding registration code
    pub registration_otp: Option<PendingOtp>,
    /// Outstanding password-reset code
    pub password_reset_otp: Option<PendingOtp>,
}

impl User {
    /// A freshly registered student account, unverified, lockout enabled
    #[must_use]
    pub fn new_student(email: String, name: String, password: String) -> Self {
        Self {
            email,
            name,
            password,
            role: Role::Student,
            failed_login_attempts: 0,
            lockout_end: None,
            lockout_enabled: true,
            email_verified: false,
            registration_otp: None,
            password_reset_otp: None,
        }
    }

    /// Where login stands for this account at `now`.
    ///
    /// A lockout binds only while enabled for the account and takes
    /// precedence over a pending verification.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> AccountStatus {
        match self.lockout_end {
            Some(until) if self.lockout_enabled && until > now => AccountStatus::Locked { until },
            _ if !self.email_verified => AccountStatus::Unverified,
            _ => AccountStatus::Active,
        }
    }
}

/// Bookable resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    /// Primary identifier
    pub name: String,
    /// Where it is
    pub location: String,
    /// People it holds
    pub capacity: u32,
    /// Free-form category
    #[serde(rename = "type")]
    pub venue_type: String,
    /// Active (`true`) or inactive
    pub status: bool,
    /// Price per booking
    pub price: f64,
}

impl Venue {
    /// Field-level checks for create and update.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first offending field.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.name.trim().is_empty() {
            return Err(BookingError::Validation("Venue name is required.".to_string()));
        }
        if self.location.trim().is_empty() {
            return Err(BookingError::Validation("Venue location is required.".to_string()));
        }
        if self.venue_type.trim().is_empty() {
            return Err(BookingError::Validation("Venue type is required.".to_string()));
        }
        if self.capacity < 1 {
            return Err(BookingError::Validation("Capacity must be greater than 0.".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(BookingError::Validation("Price must be a positive value.".to_string()));
        }
        Ok(())
    }
}

/// A bookable interval of one venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    /// Row id
    pub id: i64,
    /// Owning venue
    pub venue_name: String,
    /// Start, time of day
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    /// End, time of day
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    /// `true` exactly when no booking references the slot
    pub is_available: bool,
}

/// Natural key of a slot: venue plus interval
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// Venue name
    pub venue_name: String,
    /// Start, time of day
    pub start_time: NaiveTime,
    /// End, time of day
    pub end_time: NaiveTime,
}

impl SlotKey {
    /// Build a key, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `start_time < end_time`.
    pub fn new(
        venue_name: impl Into<String>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, BookingError> {
        if start_time >= end_time {
            return Err(BookingError::Validation(
                "Start time must be before end time.".to_string(),
            ));
        }
        Ok(Self {
            venue_name: venue_name.into(),
            start_time,
            end_time,
        })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.venue_name,
            self.start_time.format(time_of_day::FORMAT),
            self.end_time.format(time_of_day::FORMAT)
        )
    }
}

/// Identifies a booking from outside: who booked which slot
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BookingKey {
    /// Booking user's email
    pub user_email: String,
    /// Booked slot
    pub slot: SlotKey,
}

/// Opaque proof that a booking is confirmed
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QrToken(String);

impl QrToken {
    /// Bytes of entropy per token
    pub const ENTROPY_BYTES: usize = 32;

    /// 32 random bytes, base64-encoded
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; Self::ENTROPY_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(BASE64.encode(bytes))
    }

    /// Wrap a token received from a scanner or loaded from storage
    #[must_use]
    pub const fn from_string(token: String) -> Self {
        Self(token)
    }

    /// Encoded token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservation of one slot by one user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Booking {
    /// Row id
    pub id: i64,
    /// Booking user
    pub user_email: String,
    /// Booked slot
    pub time_slot_id: i64,
    /// Payment accepted
    pub is_confirmed: bool,
    /// Present exactly when confirmed
    pub qr_token: Option<QrToken>,
}

/// Booking joined with its slot, for listings and notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingDetails {
    /// The booking
    pub booking: Booking,
    /// The slot it holds
    pub slot: SlotKey,
    /// Whether a payment screenshot was uploaded
    pub has_screenshot: bool,
}

// ============================================================================
// Time-of-day wire format
// ============================================================================

/// Parse a time of day written as `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns `Validation` for anything else.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, BookingError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| BookingError::Validation(format!("Invalid time of day: {value}")))
}

/// Serde adapter writing `HH:MM:SS` and reading `HH:MM[:SS]`
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Canonical output format
    pub const FORMAT: &str = "%H:%M:%S";

    /// Serialize as `HH:MM:SS`
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    /// Deserialize from `HH:MM` or `HH:MM:SS`
    ///
    /// # Errors
    ///
    /// Fails on any other shape.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booking_core::environment::Clock;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn t(value: &str) -> NaiveTime {
        parse_time_of_day(value).unwrap()
    }

    #[test]
    fn email_must_be_graduate_domain() {
        assert!(validate_email("a@graduate.utm.my").is_ok());
        assert!(validate_email("first.last@graduate.utm.my").is_ok());
        assert!(validate_email("a@utm.my").is_err());
        assert!(validate_email("a b@graduate.utm.my").is_err());
        assert!(validate_email("@graduate.utm.my").is_err());
        assert!(validate_email("a@graduate.utm.my.evil").is_err());
        assert!(validate_email("a@b@graduate.utm.my").is_err());
    }

    #[test]
    fn name_length_bounds_are_inclusive() {
        assert!(validate_name("abcdef").is_ok());
        assert!(validate_name(&"x".repeat(18)).is_ok());
        assert!(validate_name("abcde").is_err());
        assert!(validate_name(&"x".repeat(19)).is_err());
    }

    #[test]
    fn otp_codes_stay_in_six_digit_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let code = OtpCode::generate(&mut rng).value();
            assert!((OtpCode::MIN..=OtpCode::MAX).contains(&code));
        }
        assert_eq!(OtpCode::new(123_456).to_string(), "123456");
    }

    #[test]
    fn pending_otp_expiry_is_strict() {
        let now = booking_testing::test_clock().now();
        let otp = PendingOtp {
            code: OtpCode::new(123_456),
            expires_at: now + Duration::minutes(10),
        };

        assert!(otp.accepts(OtpCode::new(123_456), now));
        assert!(otp.accepts(OtpCode::new(123_456), otp.expires_at - Duration::seconds(1)));
        assert!(!otp.accepts(OtpCode::new(123_456), otp.expires_at));
        assert!(!otp.accepts(OtpCode::new(654_321), now));
    }

    #[test]
    fn lockout_only_applies_when_enabled_and_in_future() {
        let now = booking_testing::test_clock().now();
        let mut user = User::new_student("a@graduate.utm.my".into(), "student1".into(), "pw".into());
        assert_eq!(user.status(now), AccountStatus::Unverified);

        user.email_verified = true;
        user.lockout_end = Some(now + Duration::minutes(30));
        assert_eq!(user.status(now), AccountStatus::Locked { until: now + Duration::minutes(30) });

        user.lockout_enabled = false;
        assert_eq!(user.status(now), AccountStatus::Active);

        user.lockout_enabled = true;
        user.lockout_end = Some(now);
        assert_eq!(user.status(now), AccountStatus::Active);

        user.email_verified = false;
        user.lockout_end = Some(now + Duration::minutes(5));
        assert!(matches!(user.status(now), AccountStatus::Locked { .. }));
    }

    #[test]
    fn qr_tokens_are_base64_of_32_bytes() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = QrToken::generate(&mut rng);
        let b = QrToken::generate(&mut rng);

        assert_ne!(a, b);
        assert_eq!(BASE64.decode(a.as_str()).map(|v| v.len()).ok(), Some(32));
    }

    #[test]
    fn slot_key_rejects_inverted_interval() {
        assert!(SlotKey::new("Hall A", t("09:00"), t("10:00")).is_ok());
        assert!(SlotKey::new("Hall A", t("10:00"), t("10:00")).is_err());
        assert!(SlotKey::new("Hall A", t("11:00"), t("10:00")).is_err());
    }

    #[test]
    fn time_of_day_accepts_both_shapes() {
        assert_eq!(t("09:00"), t("09:00:00"));
        assert!(parse_time_of_day("9am").is_err());
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn venue_validation() {
        let mut venue = Venue {
            name: "Hall A".into(),
            location: "Block N28".into(),
            capacity: 100,
            venue_type: "Hall".into(),
            status: true,
            price: 50.0,
        };
        assert!(venue.validate().is_ok());

        venue.capacity = 0;
        assert!(venue.validate().is_err());

        venue.capacity = 1;
        venue.price = -1.0;
        assert!(venue.validate().is_err());

        venue.price = 0.0;
        assert!(venue.validate().is_ok());
    }
}
