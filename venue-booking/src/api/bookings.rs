//! Booking endpoints.
//!
//! - GET /api/bookings - Every booking
//! - GET /api/bookings/user/:email - Bookings of one user
//! - POST /api/bookings - Claim a slot (multipart, with payment screenshot)
//! - DELETE /api/bookings/user/:email/venue/:venueName/time?startTime&endTime - Delete
//! - DELETE /api/bookings/cancel?email&venueName&startTime&endTime - Cancel
//! - PUT /api/bookings/accept?... / reject?... - Payment review (staff/admin)
//! - GET /api/bookings/:id/screenshot - Uploaded screenshot
//! - GET /api/bookings/validate-qr?token - Check a scanned QR code
//!
//! Students may only act on their own bookings; staff and admins on any.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use booking_web::{AppError, CorrelationId, WebResult};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{slot_from, MessageResponse};
use crate::app::normalize_email;
use crate::auth::{RequireStaff, SessionUser};
use crate::server::AppState;
use crate::types::{time_of_day, BookingDetails, BookingKey, QrToken};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Composite booking key in the query string
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    /// Booking user
    pub email: String,
    /// Venue
    pub venue_name: String,
    /// Slot start
    pub start_time: String,
    /// Slot end
    pub end_time: String,
}

impl BookingQuery {
    fn key(&self) -> Result<BookingKey, AppError> {
        Ok(BookingKey {
            user_email: normalize_email(&self.email),
            slot: slot_from(&self.venue_name, &self.start_time, &self.end_time)?,
        })
    }
}

/// Slot interval in the query string
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalQuery {
    /// Slot start
    pub start_time: String,
    /// Slot end
    pub end_time: String,
}

/// Scanned token
#[derive(Debug, Deserialize)]
pub struct QrQuery {
    /// Token decoded from the QR image
    pub token: String,
}

/// Created booking
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    /// Row id
    pub booking_id: i64,
    /// Booking user
    pub user_email: String,
    /// Claimed slot
    pub time_slot_id: i64,
    /// Always `false` until payment is accepted
    pub is_confirmed: bool,
}

/// Booking listing entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    /// Row id
    pub id: i64,
    /// Booking user
    pub user_email: String,
    /// Slot id
    pub time_slot_id: i64,
    /// Payment accepted
    pub is_confirmed: bool,
    /// Where the screenshot can be fetched, if one was uploaded
    pub payment_screenshot_url: Option<String>,
    /// Slot start
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    /// Slot end
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    /// Venue
    pub venue_name: String,
}

impl From<BookingDetails> for BookingResponse {
    fn from(details: BookingDetails) -> Self {
        let id = details.booking.id;
        Self {
            id,
            user_email: details.booking.user_email,
            time_slot_id: details.booking.time_slot_id,
            is_confirmed: details.booking.is_confirmed,
            payment_screenshot_url: details
                .has_screenshot
                .then(|| format!("/api/bookings/{id}/screenshot")),
            start_time: details.slot.start_time,
            end_time: details.slot.end_time,
            venue_name: details.slot.venue_name,
        }
    }
}

/// A valid QR code
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrValidation {
    /// Always `true`
    pub valid: bool,
    /// Booking user
    pub user_email: String,
    /// Venue
    pub venue_name: String,
    /// Slot start
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    /// Slot end
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    /// Always `true` for a valid code
    pub is_confirmed: bool,
}

fn ensure_may_act_for(session: &SessionUser, email: &str) -> Result<(), AppError> {
    if session.may_act_for(email) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only manage your own bookings"))
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Every booking
pub async fn list_bookings(
    _session: SessionUser,
    State(state): State<AppState>,
) -> WebResult<Json<Vec<BookingResponse>>> {
    let bookings = state.bookings.list_bookings().await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// Bookings of one user
pub async fn bookings_for_user(
    session: SessionUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> WebResult<Json<Vec<BookingResponse>>> {
    ensure_may_act_for(&session, &email)?;
    let bookings = state.bookings.bookings_for_user(&email).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// Raw screenshot bytes
pub async fn screenshot(
    _session: SessionUser,
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> WebResult<Response> {
    let bytes = state.bookings.screenshot(booking_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

/// Check a scanned token; unknown or unconfirmed tokens are `404 {valid: false}`
pub async fn validate_qr(
    _session: SessionUser,
    State(state): State<AppState>,
    Query(query): Query<QrQuery>,
) -> WebResult<Response> {
    match state.bookings.validate_qr(&QrToken::from_string(query.token)).await {
        Ok(details) => Ok(Json(QrValidation {
            valid: true,
            user_email: details.booking.user_email,
            venue_name: details.slot.venue_name,
            start_time: details.slot.start_time,
            end_time: details.slot.end_time,
            is_confirmed: details.booking.is_confirmed,
        })
        .into_response()),
        Err(crate::error::BookingError::NotFound(message)) => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": false, "message": message })),
        )
            .into_response()),
        Err(error) => Err(error.into()),
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Claim a slot.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   --cookie "vb_session=<token>" \
///   -F userEmail=ali@graduate.utm.my -F venueName="Hall A" \
///   -F startTime=09:00 -F endTime=10:00 -F paymentScreenshot=@receipt.jpg
/// ```
pub async fn create_booking(
    session: SessionUser,
    CorrelationId(request_id): CorrelationId,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> WebResult<(StatusCode, Json<BookingCreated>)> {
    let mut user_email = None;
    let mut venue_name = None;
    let mut start_time = None;
    let mut end_time = None;
    let mut screenshot = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::bad_request(format!("Invalid multipart body: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let read_error = |error: axum::extract::multipart::MultipartError| {
            AppError::bad_request(format!("Invalid field {name}: {error}"))
        };
        match name.as_str() {
            "paymentScreenshot" => {
                let bytes = field.bytes().await.map_err(read_error)?;
                if !bytes.is_empty() {
                    screenshot = Some(bytes.to_vec());
                }
            }
            "userEmail" => user_email = Some(field.text().await.map_err(read_error)?),
            "venueName" => venue_name = Some(field.text().await.map_err(read_error)?),
            "startTime" => start_time = Some(field.text().await.map_err(read_error)?),
            "endTime" => end_time = Some(field.text().await.map_err(read_error)?),
            _ => {}
        }
    }

    let required = |value: Option<String>, field: &str| {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::validation(format!("{field} is required")))
    };
    let user_email = required(user_email, "userEmail")?;
    let slot = slot_from(
        &required(venue_name, "venueName")?,
        &required(start_time, "startTime")?,
        &required(end_time, "endTime")?,
    )?;
    ensure_may_act_for(&session, &user_email)?;

    let with_screenshot = screenshot.is_some();
    let booking = state.bookings.create_booking(&user_email, slot, screenshot).await?;
    info!(
        request_id = %request_id,
        booking_id = booking.id,
        with_screenshot,
        "Slot claimed"
    );
    Ok((
        StatusCode::CREATED,
        Json(BookingCreated {
            booking_id: booking.id,
            user_email: booking.user_email,
            time_slot_id: booking.time_slot_id,
            is_confirmed: booking.is_confirmed,
        }),
    ))
}

/// Delete a booking addressed by path
pub async fn delete_booking(
    session: SessionUser,
    State(state): State<AppState>,
    Path((email, venue_name)): Path<(String, String)>,
    Query(interval): Query<IntervalQuery>,
) -> WebResult<StatusCode> {
    ensure_may_act_for(&session, &email)?;
    let key = BookingKey {
        user_email: normalize_email(&email),
        slot: slot_from(&venue_name, &interval.start_time, &interval.end_time)?,
    };
    state.bookings.delete_booking(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a booking
pub async fn cancel_booking(
    session: SessionUser,
    State(state): State<AppState>,
    Query(query): Query<BookingQuery>,
) -> WebResult<Json<MessageResponse>> {
    ensure_may_act_for(&session, &query.email)?;
    state.bookings.cancel_booking(&query.key()?).await?;
    Ok(Json(MessageResponse::new("Booking canceled successfully.")))
}

/// Accept payment and email the QR code
pub async fn accept_payment(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<BookingQuery>,
) -> WebResult<Json<MessageResponse>> {
    state.bookings.accept_payment(&query.key()?).await?;
    Ok(Json(MessageResponse::new(
        "Payment accepted and booking confirmed. QR code sent to student.",
    )))
}

/// Reject payment: notify, then delete
pub async fn reject_payment(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<BookingQuery>,
) -> WebResult<Json<MessageResponse>> {
    state.bookings.reject_payment(&query.key()?).await?;
    Ok(Json(MessageResponse::new(
        "Payment rejected and booking deleted. Rejection email sent to student.",
    )))
}
