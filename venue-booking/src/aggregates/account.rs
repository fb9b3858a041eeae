//! Account security state machine.
//!
//! A user is `Unverified` from registration until a valid registration code
//! is presented, then `Active`, and `Locked` for an hour after five
//! consecutive wrong passwords while lockout is enabled.
//!
//! Every mutating command updates the snapshot, persists it and only then
//! emails the user; outcomes and errors are left on [`AccountState`].

use booking_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use chrono::Duration;
use std::sync::Arc;

use super::SecretSource;
use crate::error::BookingError;
use crate::notifications::{templates, Mailer, OutgoingEmail};
use crate::store::UserStore;
use crate::types::{
    validate_email, validate_name, AccountStatus, OtpCode, PendingOtp, Role, User,
};

// ============================================================================
// Policy
// ============================================================================

/// Time limits and thresholds of the account lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountPolicy {
    /// Validity of a registration code
    pub registration_otp_ttl: Duration,
    /// Validity of a password-reset code
    pub reset_otp_ttl: Duration,
    /// Wrong passwords that trigger a lockout
    pub lockout_threshold: u32,
    /// Length of a lockout
    pub lockout_duration: Duration,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            registration_otp_ttl: Duration::minutes(10),
            reset_otp_ttl: Duration::minutes(5),
            lockout_threshold: 5,
            lockout_duration: Duration::hours(1),
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// What a finished account workflow achieved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountOutcome {
    /// User created and registration code emailed
    Registered,
    /// Registration code re-issued and emailed
    OtpSent,
    /// Email verified
    Verified,
    /// Credentials accepted; a session may be issued
    LoggedIn {
        /// Session subject
        email: String,
        /// Session role
        role: Role,
    },
    /// Reset code stored and emailed
    ResetOtpSent,
    /// Password replaced
    PasswordReset,
}

/// Snapshot of the one account a command touches
#[derive(Clone, Debug, Default)]
pub struct AccountState {
    /// The user as loaded, then as modified
    pub user: Option<User>,
    /// Persisted maintenance flag, consulted by login
    pub maintenance_mode: bool,
    /// Set when the workflow completed
    pub outcome: Option<AccountOutcome>,
    /// Set when the workflow failed
    pub last_error: Option<BookingError>,
}

impl AccountState {
    /// Snapshot around a (possibly absent) user
    #[must_use]
    pub fn for_user(user: Option<User>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    /// Record the maintenance flag for a login
    #[must_use]
    pub const fn with_maintenance_mode(mut self, enabled: bool) -> Self {
        self.maintenance_mode = enabled;
        self
    }

    /// The outcome, or the error that prevented it
    ///
    /// # Errors
    ///
    /// Returns the recorded error; `Storage` if the workflow never settled.
    pub fn into_result(self) -> Result<AccountOutcome, BookingError> {
        match (self.last_error, self.outcome) {
            (Some(error), _) => Err(error),
            (None, Some(outcome)) => Ok(outcome),
            (None, None) => Err(BookingError::Storage(
                "account workflow did not complete".to_string(),
            )),
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Why a user write happened, and therefore what follows it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserWrite {
    /// New user inserted; email the code next
    Registered,
    /// Fresh registration code stored; email it next
    OtpReissued,
    /// Verification recorded
    Verified,
    /// Registration voided by a bad code; the user row is gone
    RegistrationVoided,
    /// Failed login recorded
    LoginRejected {
        /// Message for the client
        message: String,
    },
    /// Successful login recorded
    LoggedIn,
    /// Reset code stored; email it next
    ResetOtpIssued,
    /// New password stored
    PasswordChanged,
}

/// Actions for the account reducer
#[derive(Clone, Debug)]
pub enum AccountAction {
    // Commands
    /// Create an unverified student account and email a code
    Register {
        /// Email, the account key
        email: String,
        /// Display name
        name: String,
        /// Password
        password: String,
    },

    /// Re-issue and email a registration code
    IssueRegistrationOtp {
        /// Account email
        email: String,
    },

    /// Present a registration code
    VerifyRegistrationOtp {
        /// Account email
        email: String,
        /// Code from the email
        code: OtpCode,
    },

    /// Check credentials
    Login {
        /// Account email
        email: String,
        /// Role the client is logging in as
        role: Role,
        /// Password
        password: String,
    },

    /// Store and email a password-reset code
    RequestPasswordReset {
        /// Account email
        email: String,
    },

    /// Replace the password using a reset code
    ResetPassword {
        /// Account email
        email: String,
        /// Code from the email
        code: OtpCode,
        /// Replacement password
        new_password: String,
    },

    // Effect outcomes
    /// A user write committed
    UserWritten {
        /// What the write was for
        write: UserWrite,
    },

    /// An email was delivered
    EmailSent {
        /// Outcome to record
        outcome: AccountOutcome,
    },

    /// A write or an email failed
    Failed {
        /// Error to surface
        error: BookingError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the account reducer
#[derive(Clone)]
pub struct AccountEnvironment {
    /// User persistence
    pub users: Arc<dyn UserStore>,
    /// Email delivery
    pub mailer: Arc<dyn Mailer>,
    /// Time source for expiries and lockouts
    pub clock: Arc<dyn Clock>,
    /// Code generator
    pub secrets: Arc<dyn SecretSource>,
    /// Limits
    pub policy: AccountPolicy,
}

impl AccountEnvironment {
    /// Creates a new `AccountEnvironment`
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        secrets: Arc<dyn SecretSource>,
        policy: AccountPolicy,
    ) -> Self {
        Self {
            users,
            mailer,
            clock,
            secrets,
            policy,
        }
    }

    fn issue(&self, ttl: Duration) -> PendingOtp {
        PendingOtp {
            code: self.secrets.otp(),
            expires_at: self.clock.now() + ttl,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<AccountAction>; 4]>;

/// Reducer for account security
#[derive(Clone, Debug, Default)]
pub struct AccountReducer;

impl AccountReducer {
    /// Creates a new `AccountReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut AccountState, error: BookingError) -> Effects {
        state.last_error = Some(error);
        SmallVec::new()
    }

    fn user_not_found(state: &mut AccountState) -> Effects {
        Self::fail(state, BookingError::not_found("User not found"))
    }

    fn insert(env: &AccountEnvironment, user: User, write: UserWrite) -> Effect<AccountAction> {
        let users = Arc::clone(&env.users);
        Effect::future(async move {
            Some(match users.insert_user(&user).await {
                Ok(()) => AccountAction::UserWritten { write },
                Err(err) => AccountAction::Failed { error: err.into() },
            })
        })
    }

    fn save(env: &AccountEnvironment, user: User, write: UserWrite) -> Effect<AccountAction> {
        let users = Arc::clone(&env.users);
        Effect::future(async move {
            Some(match users.save_user(&user).await {
                Ok(true) => AccountAction::UserWritten { write },
                Ok(false) => AccountAction::Failed {
                    error: BookingError::not_found("User not found"),
                },
                Err(err) => AccountAction::Failed { error: err.into() },
            })
        })
    }

    fn delete(env: &AccountEnvironment, email: String, write: UserWrite) -> Effect<AccountAction> {
        let users = Arc::clone(&env.users);
        Effect::future(async move {
            Some(match users.delete_user(&email).await {
                Ok(_) => AccountAction::UserWritten { write },
                Err(err) => AccountAction::Failed { error: err.into() },
            })
        })
    }

    fn send(
        env: &AccountEnvironment,
        email: OutgoingEmail,
        outcome: AccountOutcome,
    ) -> Effect<AccountAction> {
        let mailer = Arc::clone(&env.mailer);
        Effect::future(async move {
            Some(match mailer.send(email).await {
                Ok(()) => AccountAction::EmailSent { outcome },
                Err(err) => AccountAction::Failed { error: err.into() },
            })
        })
    }

    fn registration_email(env: &AccountEnvironment, user: &User) -> Option<OutgoingEmail> {
        user.registration_otp.map(|otp| {
            templates::registration_otp(
                &user.email,
                &user.name,
                otp.code,
                env.policy.registration_otp_ttl.num_minutes(),
            )
        })
    }

    fn login(
        state: &mut AccountState,
        env: &AccountEnvironment,
        role: Role,
        password: &str,
    ) -> Effects {
        if state.maintenance_mode && role != Role::Admin {
            return Self::fail(
                state,
                BookingError::ServiceUnavailable(
                    "The system is currently under maintenance. Only admins can log in."
                        .to_string(),
                ),
            );
        }

        let now = env.clock.now();
        let policy = env.policy;
        let Some(user) = state.user.as_mut().filter(|u| u.role == role) else {
            return Self::fail(state, BookingError::unauthorized("Invalid email or role"));
        };

        if let AccountStatus::Locked { until } = user.status(now) {
            let message = format!("Account locked. Try again at {}.", until.to_rfc3339());
            return Self::fail(state, BookingError::Unauthorized(message));
        }

        if user.password != password {
            if !user.lockout_enabled {
                return Self::fail(state, BookingError::unauthorized("Invalid password."));
            }
            user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
            let message = if user.failed_login_attempts >= policy.lockout_threshold {
                user.lockout_end = Some(now + policy.lockout_duration);
                "Too many failed attempts. Account locked for 1 hour."
            } else {
                "Invalid password."
            };
            let write = UserWrite::LoginRejected {
                message: message.to_string(),
            };
            return smallvec![Self::save(env, user.clone(), write)];
        }

        if user.status(now) == AccountStatus::Unverified {
            return Self::fail(
                state,
                BookingError::unauthorized(
                    "Email not verified. Please verify your email before logging in.",
                ),
            );
        }

        user.failed_login_attempts = 0;
        user.lockout_end = None;
        smallvec![Self::save(env, user.clone(), UserWrite::LoggedIn)]
    }

    fn after_write(state: &mut AccountState, env: &AccountEnvironment, write: UserWrite) -> Effects {
        match write {
            UserWrite::Registered | UserWrite::OtpReissued => {
                let outcome = if write == UserWrite::Registered {
                    AccountOutcome::Registered
                } else {
                    AccountOutcome::OtpSent
                };
                match state.user.as_ref().and_then(|u| Self::registration_email(env, u)) {
                    Some(email) => smallvec![Self::send(env, email, outcome)],
                    None => Self::user_not_found(state),
                }
            }
            UserWrite::ResetOtpIssued => {
                let email = state.user.as_ref().and_then(|user| {
                    user.password_reset_otp.map(|otp| {
                        templates::password_reset_otp(
                            &user.email,
                            &user.name,
                            otp.code,
                            env.policy.reset_otp_ttl.num_minutes(),
                        )
                    })
                });
                match email {
                    Some(email) => smallvec![Self::send(env, email, AccountOutcome::ResetOtpSent)],
                    None => Self::user_not_found(state),
                }
            }
            UserWrite::Verified => {
                state.outcome = Some(AccountOutcome::Verified);
                SmallVec::new()
            }
            UserWrite::RegistrationVoided => Self::fail(
                state,
                BookingError::InvalidOtp(
                    "Invalid or expired OTP. Your account has been deleted.".to_string(),
                ),
            ),
            UserWrite::LoginRejected { message } => {
                Self::fail(state, BookingError::Unauthorized(message))
            }
            UserWrite::LoggedIn => {
                state.outcome = state.user.as_ref().map(|u| AccountOutcome::LoggedIn {
                    email: u.email.clone(),
                    role: u.role,
                });
                SmallVec::new()
            }
            UserWrite::PasswordChanged => {
                state.outcome = Some(AccountOutcome::PasswordReset);
                SmallVec::new()
            }
        }
    }
}

impl Reducer for AccountReducer {
    type State = AccountState;
    type Action = AccountAction;
    type Environment = AccountEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AccountAction::Register {
                email,
                name,
                password,
            } => {
                if let Err(error) = validate_email(&email).and_then(|()| validate_name(&name)) {
                    return Self::fail(state, error);
                }
                if state.user.is_some() {
                    return Self::fail(
                        state,
                        BookingError::Duplicate(format!("A user with email {email} already exists.")),
                    );
                }

                let mut user = User::new_student(email, name, password);
                user.registration_otp = Some(env.issue(env.policy.registration_otp_ttl));
                state.user = Some(user.clone());
                smallvec![Self::insert(env, user, UserWrite::Registered)]
            }

            AccountAction::IssueRegistrationOtp { .. } => {
                let pending = env.issue(env.policy.registration_otp_ttl);
                let Some(user) = state.user.as_mut() else {
                    return Self::user_not_found(state);
                };
                if user.email_verified {
                    return Self::fail(
                        state,
                        BookingError::Validation("Email is already verified.".to_string()),
                    );
                }
                user.registration_otp = Some(pending);
                smallvec![Self::save(env, user.clone(), UserWrite::OtpReissued)]
            }

            AccountAction::VerifyRegistrationOtp { code, .. } => {
                let now = env.clock.now();
                let Some(user) = state.user.as_mut() else {
                    return Self::user_not_found(state);
                };
                if user.email_verified {
                    return Self::fail(
                        state,
                        BookingError::Validation("Email is already verified.".to_string()),
                    );
                }

                let valid = user.registration_otp.is_some_and(|otp| otp.accepts(code, now));
                if !valid {
                    let email = user.email.clone();
                    state.user = None;
                    return smallvec![Self::delete(env, email, UserWrite::RegistrationVoided)];
                }

                user.email_verified = true;
                user.registration_otp = None;
                smallvec![Self::save(env, user.clone(), UserWrite::Verified)]
            }

            AccountAction::Login { role, password, .. } => {
                Self::login(state, env, role, &password)
            }

            AccountAction::RequestPasswordReset { .. } => {
                let pending = env.issue(env.policy.reset_otp_ttl);
                let Some(user) = state.user.as_mut() else {
                    return Self::user_not_found(state);
                };
                user.password_reset_otp = Some(pending);
                smallvec![Self::save(env, user.clone(), UserWrite::ResetOtpIssued)]
            }

            AccountAction::ResetPassword {
                code, new_password, ..
            } => {
                let now = env.clock.now();
                let Some(user) = state.user.as_mut() else {
                    return Self::user_not_found(state);
                };
                if !user.password_reset_otp.is_some_and(|otp| otp.accepts(code, now)) {
                    return Self::fail(
                        state,
                        BookingError::InvalidOtp("Invalid or expired OTP".to_string()),
                    );
                }

                user.password = new_password;
                user.password_reset_otp = None;
                smallvec![Self::save(env, user.clone(), UserWrite::PasswordChanged)]
            }

            AccountAction::UserWritten { write } => Self::after_write(state, env, write),

            AccountAction::EmailSent { outcome } => {
                state.outcome = Some(outcome);
                SmallVec::new()
            }

            AccountAction::Failed { error } => Self::fail(state, error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggregates::FixedSecrets;
    use crate::notifications::RecordingMailer;
    use crate::store::SqliteStore;
    use crate::types::QrToken;
    use booking_runtime::EffectRunner;
    use booking_testing::{assertions, test_clock, ManualClock, ReducerTest};
    use chrono::{DateTime, Utc};

    const EMAIL: &str = "ali@graduate.utm.my";
    const CODE: OtpCode = OtpCode::new(482_913);

    /// Environment whose store is never touched: effects are inspected, not run
    fn inert_env(clock: Arc<dyn Clock>) -> AccountEnvironment {
        AccountEnvironment::new(
            Arc::new(NoUsers),
            Arc::new(RecordingMailer::new()),
            clock,
            secrets(),
            AccountPolicy::default(),
        )
    }

    fn secrets() -> Arc<dyn SecretSource> {
        Arc::new(FixedSecrets {
            otp: CODE,
            qr_token: QrToken::from_string("unused".to_string()),
        })
    }

    fn active_user() -> User {
        let mut user = User::new_student(EMAIL.into(), "aliabu1".into(), "correct".into());
        user.email_verified = true;
        user
    }

    struct NoUsers;

    #[async_trait::async_trait]
    impl UserStore for NoUsers {
        async fn find_user(&self, _: &str) -> crate::store::StoreResult<Option<User>> {
            Ok(None)
        }
        async fn list_users(&self) -> crate::store::StoreResult<Vec<User>> {
            Ok(Vec::new())
        }
        async fn insert_user(&self, _: &User) -> crate::store::StoreResult<()> {
            Ok(())
        }
        async fn save_user(&self, _: &User) -> crate::store::StoreResult<bool> {
            Ok(true)
        }
        async fn delete_user(&self, _: &str) -> crate::store::StoreResult<bool> {
            Ok(true)
        }
        async fn delete_expired_unverified(&self, _: DateTime<Utc>) -> crate::store::StoreResult<u64> {
            Ok(0)
        }
        async fn set_lockout_enabled_for_all(&self, _: bool) -> crate::store::StoreResult<u64> {
            Ok(0)
        }
    }

    fn login(password: &str) -> AccountAction {
        AccountAction::Login {
            email: EMAIL.into(),
            role: Role::Student,
            password: password.into(),
        }
    }

    #[test]
    fn register_rejects_foreign_domain() {
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::default())
            .when_action(AccountAction::Register {
                email: "ali@gmail.com".into(),
                name: "aliabu1".into(),
                password: "pw".into(),
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::Validation(_))));
                assert!(state.user.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn register_rejects_existing_email() {
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(active_user())))
            .when_action(AccountAction::Register {
                email: EMAIL.into(),
                name: "aliabu1".into(),
                password: "pw".into(),
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::Duplicate(_))));
            })
            .run();
    }

    #[test]
    fn register_creates_unverified_student_with_ten_minute_code() {
        let now = test_clock().now();
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::default())
            .when_action(AccountAction::Register {
                email: EMAIL.into(),
                name: "aliabu1".into(),
                password: "pw".into(),
            })
            .then_state(move |state| {
                let user = state.user.as_ref().unwrap();
                assert_eq!(user.role, Role::Student);
                assert!(!user.email_verified);
                assert!(user.lockout_enabled);
                assert_eq!(
                    user.registration_otp,
                    Some(PendingOtp { code: CODE, expires_at: now + Duration::minutes(10) })
                );
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn login_is_refused_during_maintenance_for_non_admins() {
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(active_user())).with_maintenance_mode(true))
            .when_action(login("correct"))
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::ServiceUnavailable(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn login_with_wrong_role_is_unauthorized() {
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(active_user())))
            .when_action(AccountAction::Login {
                email: EMAIL.into(),
                role: Role::Staff,
                password: "correct".into(),
            })
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(BookingError::unauthorized("Invalid email or role"))
                );
            })
            .run();
    }

    #[test]
    fn fifth_wrong_password_locks_for_one_hour() {
        let now = test_clock().now();
        let mut user = active_user();
        user.failed_login_attempts = 4;

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(login("wrong"))
            .then_state(move |state| {
                let user = state.user.as_ref().unwrap();
                assert_eq!(user.failed_login_attempts, 5);
                assert_eq!(user.lockout_end, Some(now + Duration::hours(1)));
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn wrong_password_without_lockout_changes_nothing() {
        let mut user = active_user();
        user.lockout_enabled = false;
        user.failed_login_attempts = 9;

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(login("wrong"))
            .then_state(|state| {
                assert_eq!(state.user.as_ref().unwrap().failed_login_attempts, 9);
                assert_eq!(state.last_error, Some(BookingError::unauthorized("Invalid password.")));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn locked_account_refuses_even_correct_password() {
        let now = test_clock().now();
        let mut user = active_user();
        user.failed_login_attempts = 5;
        user.lockout_end = Some(now + Duration::minutes(30));

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(login("correct"))
            .then_state(|state| {
                assert!(matches!(
                    &state.last_error,
                    Some(BookingError::Unauthorized(m)) if m.starts_with("Account locked")
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn unverified_user_cannot_log_in() {
        let mut user = active_user();
        user.email_verified = false;

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(login("correct"))
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::Unauthorized(_))));
            })
            .run();
    }

    #[test]
    fn wrong_reset_code_keeps_the_user() {
        let now = test_clock().now();
        let mut user = active_user();
        user.password_reset_otp = Some(PendingOtp { code: CODE, expires_at: now + Duration::minutes(5) });

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(AccountAction::ResetPassword {
                email: EMAIL.into(),
                code: OtpCode::new(111_111),
                new_password: "new".into(),
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::InvalidOtp(_))));
                assert_eq!(state.user.as_ref().unwrap().password, "correct");
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn expired_registration_code_voids_the_account() {
        let now = test_clock().now();
        let mut user = active_user();
        user.email_verified = false;
        user.registration_otp = Some(PendingOtp { code: CODE, expires_at: now });

        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::for_user(Some(user)))
            .when_action(AccountAction::VerifyRegistrationOtp { email: EMAIL.into(), code: CODE })
            .then_state(|state| assert!(state.user.is_none()))
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn voided_write_surfaces_invalid_otp() {
        ReducerTest::new(AccountReducer::new())
            .with_env(inert_env(Arc::new(test_clock())))
            .given_state(AccountState::default())
            .when_action(AccountAction::UserWritten { write: UserWrite::RegistrationVoided })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::InvalidOtp(_))));
            })
            .run();
    }

    // ------------------------------------------------------------------------
    // Full workflows through the effect runner against SQLite
    // ------------------------------------------------------------------------

    struct Harness {
        store: Arc<SqliteStore>,
        mailer: RecordingMailer,
        clock: ManualClock,
        env: AccountEnvironment,
    }

    async fn harness() -> Harness {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mailer = RecordingMailer::new();
        let clock = ManualClock::new(test_clock().now());
        let env = AccountEnvironment::new(
            store.clone(),
            Arc::new(mailer.clone()),
            Arc::new(clock.clone()),
            secrets(),
            AccountPolicy::default(),
        );
        Harness { store, mailer, clock, env }
    }

    impl Harness {
        async fn dispatch(&self, action: AccountAction, email: &str) -> AccountState {
            let user = self.store.find_user(email).await.unwrap();
            let maintenance = crate::store::SettingsStore::maintenance_mode(self.store.as_ref())
                .await
                .unwrap();
            let mut state = AccountState::for_user(user).with_maintenance_mode(maintenance);
            EffectRunner::new().run(&AccountReducer, &mut state, action, &self.env).await;
            state
        }

        async fn register(&self) -> AccountState {
            self.dispatch(
                AccountAction::Register {
                    email: EMAIL.into(),
                    name: "aliabu1".into(),
                    password: "correct".into(),
                },
                EMAIL,
            )
            .await
        }
    }

    #[tokio::test]
    async fn registration_then_verification_within_ten_minutes() {
        let h = harness().await;

        let state = h.register().await;
        assert_eq!(state.into_result(), Ok(AccountOutcome::Registered));
        let sent = h.mailer.last_to(EMAIL).unwrap();
        assert!(sent.html_body.contains("482913"));

        h.clock.advance(Duration::minutes(9));
        let state = h
            .dispatch(AccountAction::VerifyRegistrationOtp { email: EMAIL.into(), code: CODE }, EMAIL)
            .await;
        assert_eq!(state.into_result(), Ok(AccountOutcome::Verified));

        let user = h.store.find_user(EMAIL).await.unwrap().unwrap();
        assert!(user.email_verified);
        assert!(user.registration_otp.is_none());
    }

    #[tokio::test]
    async fn verification_after_eleven_minutes_deletes_user() {
        let h = harness().await;
        h.register().await;

        h.clock.advance(Duration::minutes(11));
        let state = h
            .dispatch(AccountAction::VerifyRegistrationOtp { email: EMAIL.into(), code: CODE }, EMAIL)
            .await;

        assert!(matches!(state.into_result(), Err(BookingError::InvalidOtp(_))));
        assert!(h.store.find_user(EMAIL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn registration_mail_failure_is_a_server_error_and_keeps_pending_user() {
        let h = harness().await;
        h.mailer.set_should_succeed(false);

        let state = h.register().await;

        assert!(matches!(state.into_result(), Err(BookingError::Notification(_))));
        assert!(h.store.find_user(EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn five_failures_lock_and_success_resets() {
        let h = harness().await;
        h.store.insert_user(&active_user()).await.unwrap();

        for _ in 0..4 {
            let state = h.dispatch(login("wrong"), EMAIL).await;
            assert_eq!(state.into_result(), Err(BookingError::unauthorized("Invalid password.")));
        }
        let state = h.dispatch(login("correct"), EMAIL).await;
        assert!(matches!(state.into_result(), Ok(AccountOutcome::LoggedIn { .. })));
        assert_eq!(h.store.find_user(EMAIL).await.unwrap().unwrap().failed_login_attempts, 0);

        for _ in 0..5 {
            h.dispatch(login("wrong"), EMAIL).await;
        }
        let locked = h.store.find_user(EMAIL).await.unwrap().unwrap();
        assert_eq!(locked.lockout_end, Some(h.clock.now() + Duration::hours(1)));

        let state = h.dispatch(login("correct"), EMAIL).await;
        assert!(matches!(state.into_result(), Err(BookingError::Unauthorized(_))));

        h.clock.advance(Duration::hours(1));
        let state = h.dispatch(login("correct"), EMAIL).await;
        assert!(matches!(state.into_result(), Ok(AccountOutcome::LoggedIn { .. })));
    }

    #[tokio::test]
    async fn password_reset_round_trip() {
        let h = harness().await;
        h.store.insert_user(&active_user()).await.unwrap();

        let state = h.dispatch(AccountAction::RequestPasswordReset { email: EMAIL.into() }, EMAIL).await;
        assert_eq!(state.into_result(), Ok(AccountOutcome::ResetOtpSent));

        h.clock.advance(Duration::minutes(4));
        let state = h
            .dispatch(
                AccountAction::ResetPassword {
                    email: EMAIL.into(),
                    code: CODE,
                    new_password: "fresh".into(),
                },
                EMAIL,
            )
            .await;
        assert_eq!(state.into_result(), Ok(AccountOutcome::PasswordReset));

        let user = h.store.find_user(EMAIL).await.unwrap().unwrap();
        assert_eq!(user.password, "fresh");
        assert!(user.password_reset_otp.is_none());
    }

    #[tokio::test]
    async fn reset_code_expires_after_five_minutes() {
        let h = harness().await;
        h.store.insert_user(&active_user()).await.unwrap();
        h.dispatch(AccountAction::RequestPasswordReset { email: EMAIL.into() }, EMAIL).await;

        h.clock.advance(Duration::minutes(5));
        let state = h
            .dispatch(
                AccountAction::ResetPassword {
                    email: EMAIL.into(),
                    code: CODE,
                    new_password: "fresh".into(),
                },
                EMAIL,
            )
            .await;

        assert!(matches!(state.into_result(), Err(BookingError::InvalidOtp(_))));
        assert!(h.store.find_user(EMAIL).await.unwrap().is_some());
    }
}
