//! Booking and slot lifecycle.
//!
//! A slot is `Available` until a booking claims it, `PendingPayment` while
//! staff review the screenshot and `Confirmed` once payment is accepted and
//! a QR token issued. Rejection, cancellation and deletion remove the
//! booking and release the slot in one store transaction.
//!
//! Notification ordering differs per command:
//! - accept: persist, then email the QR code; a failed email is an error
//!   but the booking stays confirmed
//! - reject: email first, then delete; a failed email leaves the booking
//! - cancel and delete: delete, then email best-effort

use booking_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use std::sync::Arc;
use tracing::warn;

use super::SecretSource;
use crate::error::BookingError;
use crate::notifications::{templates, Mailer, OutgoingEmail};
use crate::qr;
use crate::store::BookingStore;
use crate::types::{Booking, BookingDetails, QrToken, SlotKey};

// ============================================================================
// State
// ============================================================================

/// What a finished booking workflow achieved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    /// Booking created, slot claimed
    Created(Booking),
    /// Payment accepted, QR code emailed
    Confirmed {
        /// Token encoded in the emailed QR code
        token: QrToken,
    },
    /// Payment rejected, booking removed
    Rejected,
    /// Cancelled by the student
    Cancelled,
    /// Removed outright
    Deleted,
}

/// Snapshot of the booking a command touches
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// Booking addressed by the command, if it exists
    pub booking: Option<BookingDetails>,
    /// Whether the booking user exists (create only)
    pub user_known: bool,
    /// Whether the venue exists (create only)
    pub venue_known: bool,
    /// Set when the workflow completed
    pub outcome: Option<BookingOutcome>,
    /// Set when the workflow failed
    pub last_error: Option<BookingError>,
}

impl BookingState {
    /// Snapshot for a new booking
    #[must_use]
    pub fn for_create(user_known: bool, venue_known: bool) -> Self {
        Self {
            user_known,
            venue_known,
            ..Self::default()
        }
    }

    /// Snapshot around an existing (possibly absent) booking
    #[must_use]
    pub fn for_booking(booking: Option<BookingDetails>) -> Self {
        Self {
            booking,
            ..Self::default()
        }
    }

    /// The outcome, or the error that prevented it
    ///
    /// # Errors
    ///
    /// Returns the recorded error; `Storage` if the workflow never settled.
    pub fn into_result(self) -> Result<BookingOutcome, BookingError> {
        match (self.last_error, self.outcome) {
            (Some(error), _) => Err(error),
            (None, Some(outcome)) => Ok(outcome),
            (None, None) => Err(BookingError::Storage(
                "booking workflow did not complete".to_string(),
            )),
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Why a booking was removed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// Payment rejected (already notified)
    Rejected,
    /// Student cancelled
    Cancelled,
    /// Deleted by owner or staff
    Deleted,
}

/// Actions for the booking reducer
#[derive(Clone, Debug)]
pub enum BookingAction {
    // Commands
    /// Claim a slot for a user
    CreateBooking {
        /// Booking user
        user_email: String,
        /// Slot to claim
        slot: SlotKey,
        /// Uploaded payment proof
        screenshot: Option<Vec<u8>>,
    },

    /// Confirm the loaded booking and email a QR code
    AcceptPayment,

    /// Email a rejection, then remove the loaded booking
    RejectPayment,

    /// Remove the loaded booking at the student's request
    CancelBooking,

    /// Remove the loaded booking
    DeleteBooking,

    // Effect outcomes
    /// The store answered a claim; `None` when the slot was not available
    ClaimAnswered {
        /// Created booking
        booking: Option<Booking>,
    },

    /// Confirmation committed with this token
    ConfirmationStored {
        /// Fresh token
        token: QrToken,
    },

    /// Rejection email delivered
    RejectionSent,

    /// Booking row removed and slot released
    Removed {
        /// Why
        removal: Removal,
    },

    /// Workflow done
    Settled {
        /// Outcome to record
        outcome: BookingOutcome,
    },

    /// A write or a required email failed
    Failed {
        /// Error to surface
        error: BookingError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Booking persistence
    pub bookings: Arc<dyn BookingStore>,
    /// Email delivery
    pub mailer: Arc<dyn Mailer>,
    /// QR token generator
    pub secrets: Arc<dyn SecretSource>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        mailer: Arc<dyn Mailer>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            bookings,
            mailer,
            secrets,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Reducer for the booking lifecycle
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut BookingState, error: BookingError) -> Effects {
        state.last_error = Some(error);
        SmallVec::new()
    }

    fn booking_not_found() -> BookingError {
        BookingError::not_found("Booking not found.")
    }

    fn claim(
        env: &BookingEnvironment,
        user_email: String,
        slot: SlotKey,
        screenshot: Option<Vec<u8>>,
    ) -> Effect<BookingAction> {
        let bookings = Arc::clone(&env.bookings);
        Effect::future(async move {
            Some(match bookings.create_booking(&user_email, &slot, screenshot).await {
                Ok(booking) => BookingAction::ClaimAnswered { booking },
                Err(err) => BookingAction::Failed { error: err.into() },
            })
        })
    }

    fn confirm(env: &BookingEnvironment, booking_id: i64, token: QrToken) -> Effect<BookingAction> {
        let bookings = Arc::clone(&env.bookings);
        Effect::future(async move {
            Some(match bookings.confirm_booking(booking_id, &token).await {
                Ok(true) => BookingAction::ConfirmationStored { token },
                Ok(false) => BookingAction::Failed {
                    error: Self::booking_not_found(),
                },
                Err(err) => BookingAction::Failed { error: err.into() },
            })
        })
    }

    fn remove(env: &BookingEnvironment, booking_id: i64, removal: Removal) -> Effect<BookingAction> {
        let bookings = Arc::clone(&env.bookings);
        Effect::future(async move {
            Some(match bookings.remove_booking(booking_id).await {
                Ok(true) => BookingAction::Removed { removal },
                Ok(false) => BookingAction::Failed {
                    error: Self::booking_not_found(),
                },
                Err(err) => BookingAction::Failed { error: err.into() },
            })
        })
    }

    /// Render the QR code and email it; failure of either is surfaced
    fn send_confirmation(
        env: &BookingEnvironment,
        to: String,
        slot: SlotKey,
        token: QrToken,
    ) -> Effect<BookingAction> {
        let mailer = Arc::clone(&env.mailer);
        Effect::future(async move {
            let png = match qr::render_png(&token) {
                Ok(png) => png,
                Err(err) => return Some(BookingAction::Failed { error: err.into() }),
            };
            let email = templates::booking_confirmed(&to, &slot, png);
            Some(match mailer.send(email).await {
                Ok(()) => BookingAction::Settled {
                    outcome: BookingOutcome::Confirmed { token },
                },
                Err(err) => BookingAction::Failed { error: err.into() },
            })
        })
    }

    fn send_rejection(env: &BookingEnvironment, email: OutgoingEmail) -> Effect<BookingAction> {
        let mailer = Arc::clone(&env.mailer);
        Effect::future(async move {
            Some(match mailer.send(email).await {
                Ok(()) => BookingAction::RejectionSent,
                Err(err) => BookingAction::Failed { error: err.into() },
            })
        })
    }

    /// The booking is already gone; a lost email only warrants a warning
    fn notify_best_effort(
        env: &BookingEnvironment,
        email: OutgoingEmail,
        outcome: BookingOutcome,
    ) -> Effect<BookingAction> {
        let mailer = Arc::clone(&env.mailer);
        Effect::future(async move {
            let to = email.to.clone();
            if let Err(error) = mailer.send(email).await {
                warn!(%to, %error, "Booking removal notice not delivered");
                metrics::counter!("booking.notification_dropped").increment(1);
            }
            Some(BookingAction::Settled { outcome })
        })
    }

    fn loaded_id(state: &BookingState) -> Option<i64> {
        state.booking.as_ref().map(|details| details.booking.id)
    }

    fn start_removal(state: &mut BookingState, env: &BookingEnvironment, removal: Removal) -> Effects {
        let Some(booking_id) = Self::loaded_id(state) else {
            return Self::fail(state, Self::booking_not_found());
        };
        smallvec![Self::remove(env, booking_id, removal)]
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::CreateBooking {
                user_email,
                slot,
                screenshot,
            } => {
                if !state.user_known {
                    return Self::fail(state, BookingError::not_found("User not found."));
                }
                if !state.venue_known {
                    return Self::fail(state, BookingError::not_found("Venue not found."));
                }
                smallvec![Self::claim(env, user_email, slot, screenshot)]
            }

            BookingAction::ClaimAnswered { booking: Some(booking) } => {
                state.outcome = Some(BookingOutcome::Created(booking));
                SmallVec::new()
            }

            BookingAction::ClaimAnswered { booking: None } => Self::fail(
                state,
                BookingError::not_found("The selected time slot is not available."),
            ),

            BookingAction::AcceptPayment => {
                let Some(booking_id) = Self::loaded_id(state) else {
                    return Self::fail(state, Self::booking_not_found());
                };
                let token = env.secrets.qr_token();
                smallvec![Self::confirm(env, booking_id, token)]
            }

            BookingAction::ConfirmationStored { token } => {
                let Some(details) = state.booking.as_mut() else {
                    return Self::fail(state, Self::booking_not_found());
                };
                details.booking.is_confirmed = true;
                details.booking.qr_token = Some(token.clone());
                let to = details.booking.user_email.clone();
                let slot = details.slot.clone();
                smallvec![Self::send_confirmation(env, to, slot, token)]
            }

            BookingAction::RejectPayment => {
                let email = state
                    .booking
                    .as_ref()
                    .map(|details| templates::booking_rejected(&details.booking.user_email, &details.slot));
                let Some(email) = email else {
                    return Self::fail(state, Self::booking_not_found());
                };
                smallvec![Self::send_rejection(env, email)]
            }

            BookingAction::RejectionSent => Self::start_removal(state, env, Removal::Rejected),

            BookingAction::CancelBooking => Self::start_removal(state, env, Removal::Cancelled),

            BookingAction::DeleteBooking => Self::start_removal(state, env, Removal::Deleted),

            BookingAction::Removed { removal } => {
                let Some(details) = state.booking.take() else {
                    return Self::fail(state, Self::booking_not_found());
                };
                let to = details.booking.user_email.as_str();
                match removal {
                    Removal::Rejected => {
                        state.outcome = Some(BookingOutcome::Rejected);
                        SmallVec::new()
                    }
                    Removal::Cancelled => smallvec![Self::notify_best_effort(
                        env,
                        templates::booking_cancelled(to, &details.slot),
                        BookingOutcome::Cancelled,
                    )],
                    Removal::Deleted => smallvec![Self::notify_best_effort(
                        env,
                        templates::booking_deleted(to, &details.slot),
                        BookingOutcome::Deleted,
                    )],
                }
            }

            BookingAction::Settled { outcome } => {
                state.outcome = Some(outcome);
                SmallVec::new()
            }

            BookingAction::Failed { error } => Self::fail(state, error),
        }
    }
}
