//! User endpoints.
//!
//! - POST /api/users - Register a student (emails a verification code)
//! - POST /api/users/generate-otp/:email - Re-issue the code
//! - POST /api/users/verify-otp - Verify; a bad code deletes the registration
//! - POST /api/users/login, POST /api/users/logout, GET /api/users/me
//! - POST /api/users/request-password-reset-otp, POST /api/users/reset-password
//! - Admin: create-for-admin, list/get/update/delete, maintenance and lockout toggles

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use booking_web::{AppError, ClientIp, WebResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::MessageResponse;
use crate::auth::{RequireAdmin, SessionKeys, SessionUser};
use crate::server::AppState;
use crate::types::{Role, User};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Self-registration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// University email
    pub email: String,
    /// Display name, 6 to 18 characters
    pub name: String,
    /// Password
    pub password: String,
}

/// Admin-created account
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    /// University email
    pub email: String,
    /// Display name
    pub name: String,
    /// Password
    pub password: String,
    /// Role
    pub role: Role,
}

/// Replacement attributes for a user
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    /// Display name
    pub name: String,
    /// Password
    pub password: String,
    /// Role
    pub role: Role,
}

/// Credentials
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Password
    pub password: String,
    /// Role to log in as
    #[serde(alias = "rolebase")]
    pub role: Role,
}

/// A one-time code, accepted as a JSON string or number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OtpInput {
    /// `"042133"`
    Text(String),
    /// `42133`
    Number(u32),
}

impl OtpInput {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

/// Registration code submission
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    /// Account email
    pub email: String,
    /// Code from the email
    pub otp: OtpInput,
}

/// Password reset using an emailed code
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Account email
    pub email: String,
    /// Code from the email
    pub otp: OtpInput,
    /// Replacement password
    pub new_password: String,
}

/// User as exposed over HTTP; the password never leaves the server
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// Email
    pub email: String,
    /// Display name
    pub name: String,
    /// Role
    pub role: Role,
    /// Verified
    pub email_verified: bool,
    /// Whether wrong passwords count towards a lockout
    pub lockout_enabled: bool,
    /// Consecutive failures
    pub failed_login_attempts: u32,
    /// End of the current lockout, if any
    pub lockout_end: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
            role: user.role,
            email_verified: user.email_verified,
            lockout_enabled: user.lockout_enabled,
            failed_login_attempts: user.failed_login_attempts,
            lockout_end: user.lockout_end,
        }
    }
}

/// Successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Confirmation
    pub message: String,
    /// Logged-in user
    pub user: UserResponse,
}

/// Caller identity
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Session email
    pub email: String,
    /// Session role
    pub role: Role,
}

/// Maintenance flag
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceResponse {
    /// Whether only admins may log in
    pub maintenance_mode_enabled: bool,
}

/// Lockout flag
#[derive(Debug, Serialize)]
pub struct LockoutResponse {
    /// Whether wrong passwords now count towards a lockout
    pub enabled: bool,
}

// ============================================================================
// Registration and OTP
// ============================================================================

/// Register a student and email a verification code.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/users \
///   -H "Content-Type: application/json" \
///   -d '{"email": "ali@graduate.utm.my", "name": "aliabu", "password": "secret"}'
/// ```
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> WebResult<(StatusCode, Json<MessageResponse>)> {
    state
        .accounts
        .register(&request.email, &request.name, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "User registered successfully. Please verify your email with the OTP sent.",
        )),
    ))
}

/// Re-issue a registration code
pub async fn generate_otp(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> WebResult<Json<MessageResponse>> {
    state.accounts.generate_otp(&email).await?;
    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

/// Verify a registration code
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> WebResult<Json<MessageResponse>> {
    state
        .accounts
        .verify_otp(&request.email, &request.otp.into_text())
        .await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// Email a password-reset code; the body is the bare email string
pub async fn request_password_reset_otp(
    State(state): State<AppState>,
    Json(email): Json<String>,
) -> WebResult<Json<MessageResponse>> {
    state.accounts.request_password_reset(&email).await?;
    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

/// Replace the password with a reset code
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> WebResult<Json<MessageResponse>> {
    state
        .accounts
        .reset_password(&request.email, &request.otp.into_text(), &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

// ============================================================================
// Session
// ============================================================================

/// Check credentials and set the session cookie
pub async fn login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> WebResult<(CookieJar, Json<LoginResponse>)> {
    let (email, role) = state
        .accounts
        .login(&request.email, request.role, &request.password)
        .await?;

    let token = state.sessions.issue(&email, role).map_err(|error| {
        AppError::internal("Failed to issue session").with_source(anyhow::Error::new(error))
    })?;
    let user = state.accounts.get_user(&email).await?;
    info!(email = %email, ip = %client_ip.0, "Session issued");

    Ok((
        jar.add(state.sessions.cookie(token)),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user: user.into(),
        }),
    ))
}

/// Clear the session cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.remove(SessionKeys::removal_cookie()),
        Json(MessageResponse::new("Logged out successfully")),
    )
}

/// Identity of the caller
pub async fn me(session: SessionUser) -> Json<MeResponse> {
    Json(MeResponse {
        email: session.email,
        role: session.role,
    })
}

// ============================================================================
// Administration
// ============================================================================

/// Create a verified user of any role
pub async fn create_for_admin(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> WebResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .accounts
        .create_verified_user(&request.email, &request.name, &request.password, request.role)
        .await?;
    info!(admin = %admin.email, email = %user.email, "Admin created user");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Every user
pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> WebResult<Json<Vec<UserResponse>>> {
    let users = state.accounts.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// One user
pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> WebResult<Json<UserResponse>> {
    Ok(Json(state.accounts.get_user(&email).await?.into()))
}

/// Replace a user's name, password and role
pub async fn update_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> WebResult<Json<UserResponse>> {
    let user = state
        .accounts
        .update_user(&email, &request.name, &request.password, request.role)
        .await?;
    Ok(Json(user.into()))
}

/// Delete a user, their bookings, and release their slots
pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> WebResult<StatusCode> {
    state.accounts.delete_user(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Turn maintenance mode on or off; the body is a bare boolean
pub async fn toggle_maintenance_mode(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(enabled): Json<bool>,
) -> WebResult<Json<MaintenanceResponse>> {
    state.accounts.set_maintenance_mode(enabled).await?;
    info!(admin = %admin.email, enabled, "Maintenance mode toggled");
    Ok(Json(MaintenanceResponse {
        maintenance_mode_enabled: enabled,
    }))
}

/// Current maintenance flag
pub async fn maintenance_mode_status(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> WebResult<Json<MaintenanceResponse>> {
    Ok(Json(MaintenanceResponse {
        maintenance_mode_enabled: state.accounts.maintenance_mode().await?,
    }))
}

/// Enable or disable lockout for every existing user; the body is a bare boolean
pub async fn toggle_login_lockout(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(enabled): Json<bool>,
) -> WebResult<Json<LockoutResponse>> {
    let updated = state.accounts.set_login_lockout(enabled).await?;
    info!(admin = %admin.email, enabled, updated, "Login lockout toggled");
    Ok(Json(LockoutResponse { enabled }))
}
