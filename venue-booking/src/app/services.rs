//! Application services: the entry points HTTP handlers call.
//!
//! Workflows with ordering rules run through a reducer:
//! 1. Load a request-scoped snapshot from the store
//! 2. Dispatch the command through the [`EffectRunner`]
//! 3. Read the outcome or error left on the state
//!
//! Plain reads and catalog writes go straight to the store.

use booking_core::reducer::Reducer;
use booking_runtime::EffectRunner;
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregates::{
    AccountAction, AccountEnvironment, AccountOutcome, AccountReducer, AccountState, BookingAction,
    BookingEnvironment, BookingOutcome, BookingReducer, BookingState,
};
use crate::error::{BookingError, BookingResult};
use crate::store::{BookingStore, CatalogStore, SettingsStore, UserStore, VenueWithSlots};
use crate::types::{
    validate_email, validate_name, Booking, BookingDetails, BookingKey, OtpCode, QrToken, Role,
    SlotKey, TimeSlot, User, Venue,
};

/// Emails are compared trimmed and lowercased
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn dispatch<R>(reducer: &R, mut state: R::State, action: R::Action, env: &R::Environment) -> R::State
where
    R: Reducer + Sync,
    R::State: Send,
    R::Action: Send + 'static,
    R::Environment: Sync,
{
    let steps = EffectRunner::new().run(reducer, &mut state, action, env).await;
    debug!(steps, "Workflow dispatched");
    state
}

// ============================================================================
// Accounts
// ============================================================================

/// Registration, login, password reset and user administration
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    settings: Arc<dyn SettingsStore>,
    env: AccountEnvironment,
}

impl AccountService {
    /// Create a new account service
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsStore>, env: AccountEnvironment) -> Self {
        Self {
            users: Arc::clone(&env.users),
            settings,
            env,
        }
    }

    async fn run(&self, email: &str, action: AccountAction) -> BookingResult<AccountOutcome> {
        let user = self.users.find_user(email).await?;
        let state = AccountState::for_user(user);
        dispatch(&AccountReducer, state, action, &self.env).await.into_result()
    }

    /// Register a student and email the verification code
    ///
    /// # Errors
    ///
    /// `Validation`, `Duplicate`, or a server error if the email could not be sent.
    pub async fn register(&self, email: &str, name: &str, password: &str) -> BookingResult<()> {
        let email = normalize_email(email);
        let action = AccountAction::Register {
            email: email.clone(),
            name: name.trim().to_string(),
            password: password.to_string(),
        };
        self.run(&email, action).await?;
        info!(email = %email, "User registered, verification pending");
        Ok(())
    }

    /// Re-issue a registration code
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation` if already verified, or a mail failure.
    pub async fn generate_otp(&self, email: &str) -> BookingResult<()> {
        let email = normalize_email(email);
        self.run(&email, AccountAction::IssueRegistrationOtp { email: email.clone() })
            .await?;
        Ok(())
    }

    /// Verify a registration code; a wrong or late code deletes the account
    ///
    /// # Errors
    ///
    /// `NotFound` or `InvalidOtp`.
    pub async fn verify_otp(&self, email: &str, code: &str) -> BookingResult<()> {
        let email = normalize_email(email);
        let action = AccountAction::VerifyRegistrationOtp {
            email: email.clone(),
            code: parse_code(code),
        };
        self.run(&email, action).await?;
        info!(email = %email, "Email verified");
        Ok(())
    }

    /// Check credentials and return the session identity
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` during maintenance, otherwise `Unauthorized`.
    pub async fn login(&self, email: &str, role: Role, password: &str) -> BookingResult<(String, Role)> {
        let email = normalize_email(email);
        let user = self.users.find_user(&email).await?;
        let maintenance = self.settings.maintenance_mode().await?;
        let state = AccountState::for_user(user).with_maintenance_mode(maintenance);
        let action = AccountAction::Login {
            email: email.clone(),
            role,
            password: password.to_string(),
        };

        match dispatch(&AccountReducer, state, action, &self.env).await.into_result() {
            Ok(AccountOutcome::LoggedIn { email, role }) => {
                info!(email = %email, role = %role, "Login succeeded");
                Ok((email, role))
            }
            Ok(other) => Err(BookingError::Storage(format!("unexpected login outcome {other:?}"))),
            Err(error) => {
                info!(email = %email, error = %error, "Login refused");
                metrics::counter!("accounts.login_refused").increment(1);
                Err(error)
            }
        }
    }

    /// Store and email a password-reset code
    ///
    /// # Errors
    ///
    /// `NotFound` or a mail failure.
    pub async fn request_password_reset(&self, email: &str) -> BookingResult<()> {
        let email = normalize_email(email);
        self.run(&email, AccountAction::RequestPasswordReset { email: email.clone() })
            .await?;
        Ok(())
    }

    /// Replace the password with a valid reset code
    ///
    /// # Errors
    ///
    /// `NotFound` or `InvalidOtp`.
    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> BookingResult<()> {
        let email = normalize_email(email);
        let action = AccountAction::ResetPassword {
            email: email.clone(),
            code: parse_code(code),
            new_password: new_password.to_string(),
        };
        self.run(&email, action).await?;
        info!(email = %email, "Password reset");
        Ok(())
    }

    /// Create an already verified user of any role
    ///
    /// # Errors
    ///
    /// `Validation` or `Duplicate`.
    pub async fn create_verified_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> BookingResult<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_name(name.trim())?;

        let mut user = User::new_student(email, name.trim().to_string(), password.to_string());
        user.role = role;
        user.email_verified = true;
        self.users.insert_user(&user).await?;
        info!(email = %user.email, role = %role, "User created by admin");
        Ok(user)
    }

    /// Every user
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn list_users(&self) -> BookingResult<Vec<User>> {
        Ok(self.users.list_users().await?)
    }

    /// One user
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn get_user(&self, email: &str) -> BookingResult<User> {
        self.users
            .find_user(&normalize_email(email))
            .await?
            .ok_or_else(|| BookingError::not_found(format!("User with email '{email}' not found.")))
    }

    /// Replace name, password and role
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Validation` for a bad name.
    pub async fn update_user(&self, email: &str, name: &str, password: &str, role: Role) -> BookingResult<User> {
        validate_name(name.trim())?;
        let mut user = self.get_user(email).await?;
        user.name = name.trim().to_string();
        user.password = password.to_string();
        user.role = role;
        if !self.users.save_user(&user).await? {
            return Err(BookingError::not_found(format!("User with email '{email}' not found.")));
        }
        Ok(user)
    }

    /// Delete a user; their bookings go too and the slots are released
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn delete_user(&self, email: &str) -> BookingResult<()> {
        if self.users.delete_user(&normalize_email(email)).await? {
            info!(email = %email, "User deleted");
            Ok(())
        } else {
            Err(BookingError::not_found(format!("User with email '{email}' not found.")))
        }
    }

    /// Persist the maintenance flag
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn set_maintenance_mode(&self, enabled: bool) -> BookingResult<()> {
        self.settings.set_maintenance_mode(enabled).await?;
        info!(enabled, "Maintenance mode changed");
        Ok(())
    }

    /// Current maintenance flag
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn maintenance_mode(&self) -> BookingResult<bool> {
        Ok(self.settings.maintenance_mode().await?)
    }

    /// Enable or disable lockout on every existing user
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn set_login_lockout(&self, enabled: bool) -> BookingResult<u64> {
        let updated = self.users.set_lockout_enabled_for_all(enabled).await?;
        info!(enabled, updated, "Login lockout changed for all users");
        Ok(updated)
    }
}

/// A code that is not six digits can never match an issued one
fn parse_code(code: &str) -> OtpCode {
    OtpCode::new(code.trim().parse().unwrap_or(0))
}

// ============================================================================
// Catalog
// ============================================================================

/// Venues and their time slots
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
}

impl CatalogService {
    /// Create a new catalog service
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    fn venue_missing(name: &str) -> BookingError {
        BookingError::not_found(format!("Venue '{name}' not found."))
    }

    /// Every venue with its slots
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn list_venues(&self) -> BookingResult<Vec<VenueWithSlots>> {
        Ok(self.catalog.list_venues().await?)
    }

    /// One venue with its slots
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn get_venue(&self, name: &str) -> BookingResult<VenueWithSlots> {
        let venue = self
            .catalog
            .find_venue(name)
            .await?
            .ok_or_else(|| Self::venue_missing(name))?;
        let time_slots = self.catalog.venue_slots(name).await?;
        Ok(VenueWithSlots { venue, time_slots })
    }

    /// Add a venue
    ///
    /// # Errors
    ///
    /// `Validation` or `Duplicate`.
    pub async fn create_venue(&self, venue: Venue) -> BookingResult<Venue> {
        venue.validate()?;
        self.catalog.insert_venue(&venue).await?;
        info!(venue = %venue.name, "Venue created");
        Ok(venue)
    }

    /// Replace a venue's attributes; the name is immutable
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Validation` on a rename or bad fields.
    pub async fn update_venue(&self, name: &str, venue: Venue) -> BookingResult<()> {
        if venue.name != name {
            return Err(BookingError::Validation("Venue name cannot be changed.".to_string()));
        }
        venue.validate()?;
        if !self.catalog.update_venue(&venue).await? {
            return Err(Self::venue_missing(name));
        }
        info!(venue = %name, "Venue updated");
        Ok(())
    }

    /// Remove a venue with its slots and their bookings
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn delete_venue(&self, name: &str) -> BookingResult<()> {
        if !self.catalog.delete_venue(name).await? {
            return Err(Self::venue_missing(name));
        }
        info!(venue = %name, "Venue deleted");
        Ok(())
    }

    /// Slots of one venue
    ///
    /// # Errors
    ///
    /// `NotFound` if the venue has none.
    pub async fn slots_for_venue(&self, venue_name: &str) -> BookingResult<Vec<TimeSlot>> {
        let slots = self.catalog.venue_slots(venue_name).await?;
        if slots.is_empty() {
            return Err(BookingError::not_found(format!(
                "No time slots found for venue '{venue_name}'."
            )));
        }
        Ok(slots)
    }

    /// Add an available slot
    ///
    /// # Errors
    ///
    /// `NotFound` if the venue is missing, `Duplicate` if the interval exists.
    pub async fn create_slot(&self, slot: &SlotKey) -> BookingResult<TimeSlot> {
        if self.catalog.find_venue(&slot.venue_name).await?.is_none() {
            return Err(Self::venue_missing(&slot.venue_name));
        }
        let created = self.catalog.insert_slot(slot).await?;
        info!(slot = %slot, id = created.id, "Time slot created");
        Ok(created)
    }

    /// Remove a slot and any booking on it
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn delete_slot(&self, slot: &SlotKey) -> BookingResult<()> {
        if !self.catalog.delete_slot(slot).await? {
            return Err(BookingError::not_found(format!("Time slot {slot} not found.")));
        }
        info!(slot = %slot, "Time slot deleted");
        Ok(())
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// Booking lifecycle and queries
#[derive(Clone)]
pub struct BookingService {
    users: Arc<dyn UserStore>,
    catalog: Arc<dyn CatalogStore>,
    env: BookingEnvironment,
}

impl BookingService {
    /// Create a new booking service
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, catalog: Arc<dyn CatalogStore>, env: BookingEnvironment) -> Self {
        Self { users, catalog, env }
    }

    async fn on_booking(&self, key: &BookingKey, action: BookingAction) -> BookingResult<BookingOutcome> {
        let details = self.env.bookings.find_booking(key).await?;
        let state = BookingState::for_booking(details);
        dispatch(&BookingReducer, state, action, &self.env).await.into_result()
    }

    /// Claim a slot for a user
    ///
    /// # Errors
    ///
    /// `NotFound` if the user, the venue or an available slot is missing.
    pub async fn create_booking(
        &self,
        user_email: &str,
        slot: SlotKey,
        screenshot: Option<Vec<u8>>,
    ) -> BookingResult<Booking> {
        let user_email = normalize_email(user_email);
        let user_known = self.users.find_user(&user_email).await?.is_some();
        let venue_known = self.catalog.find_venue(&slot.venue_name).await?.is_some();
        let state = BookingState::for_create(user_known, venue_known);
        let action = BookingAction::CreateBooking {
            user_email: user_email.clone(),
            slot: slot.clone(),
            screenshot,
        };

        match dispatch(&BookingReducer, state, action, &self.env).await.into_result()? {
            BookingOutcome::Created(booking) => {
                info!(booking_id = booking.id, email = %user_email, slot = %slot, "Booking created");
                metrics::counter!("bookings.created").increment(1);
                Ok(booking)
            }
            other => Err(BookingError::Storage(format!("unexpected booking outcome {other:?}"))),
        }
    }

    /// Confirm payment and email the QR code
    ///
    /// # Errors
    ///
    /// `NotFound`, or a server error if the email failed after confirming.
    pub async fn accept_payment(&self, key: &BookingKey) -> BookingResult<QrToken> {
        match self.on_booking(key, BookingAction::AcceptPayment).await? {
            BookingOutcome::Confirmed { token } => {
                info!(email = %key.user_email, slot = %key.slot, "Payment accepted");
                Ok(token)
            }
            other => Err(BookingError::Storage(format!("unexpected booking outcome {other:?}"))),
        }
    }

    /// Notify the student, then remove the booking
    ///
    /// # Errors
    ///
    /// `NotFound`, or a server error if the email failed (nothing changed).
    pub async fn reject_payment(&self, key: &BookingKey) -> BookingResult<()> {
        self.on_booking(key, BookingAction::RejectPayment).await?;
        info!(email = %key.user_email, slot = %key.slot, "Payment rejected");
        Ok(())
    }

    /// Remove the booking and notify the student best-effort
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn cancel_booking(&self, key: &BookingKey) -> BookingResult<()> {
        self.on_booking(key, BookingAction::CancelBooking).await?;
        info!(email = %key.user_email, slot = %key.slot, "Booking cancelled");
        Ok(())
    }

    /// Remove the booking and notify the student best-effort
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn delete_booking(&self, key: &BookingKey) -> BookingResult<()> {
        self.on_booking(key, BookingAction::DeleteBooking).await?;
        info!(email = %key.user_email, slot = %key.slot, "Booking deleted");
        Ok(())
    }

    /// The confirmed booking holding `token`
    ///
    /// # Errors
    ///
    /// `NotFound` unless a confirmed booking holds exactly this token.
    pub async fn validate_qr(&self, token: &QrToken) -> BookingResult<BookingDetails> {
        self.env
            .bookings
            .find_confirmed_by_token(token)
            .await?
            .ok_or_else(|| BookingError::not_found("Invalid or expired QR code."))
    }

    /// Every booking
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn list_bookings(&self) -> BookingResult<Vec<BookingDetails>> {
        Ok(self.env.bookings.list_bookings().await?)
    }

    /// Bookings of one user
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has none.
    pub async fn bookings_for_user(&self, email: &str) -> BookingResult<Vec<BookingDetails>> {
        let bookings = self.env.bookings.bookings_for_user(&normalize_email(email)).await?;
        if bookings.is_empty() {
            return Err(BookingError::not_found(format!(
                "No bookings found for user with email '{email}'."
            )));
        }
        Ok(bookings)
    }

    /// Raw payment screenshot
    ///
    /// # Errors
    ///
    /// `NotFound` without a booking or a screenshot.
    pub async fn screenshot(&self, booking_id: i64) -> BookingResult<Vec<u8>> {
        self.env
            .bookings
            .screenshot(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Screenshot not found."))
    }
}
