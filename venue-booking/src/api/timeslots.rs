//! Time slot endpoints.
//!
//! - GET /api/timeslots/venue/:venueName - Slots of a venue
//! - POST /api/timeslots/:venueName - Add an available slot (staff/admin)
//! - DELETE /api/timeslots/:venueName/:startTime/:endTime - Remove a slot (staff/admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use booking_web::WebResult;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::slot_from;
use crate::auth::{RequireStaff, SessionUser};
use crate::server::AppState;
use crate::types::{time_of_day, TimeSlot};

/// New slot interval
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeSlotRequest {
    /// `HH:MM` or `HH:MM:SS`
    pub start_time: String,
    /// `HH:MM` or `HH:MM:SS`
    pub end_time: String,
}

/// Created slot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotCreated {
    /// Row id
    pub id: i64,
    /// Venue
    pub venue_name: String,
    /// Start
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    /// End
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
}

/// Slots of a venue
pub async fn list_for_venue(
    _session: SessionUser,
    State(state): State<AppState>,
    Path(venue_name): Path<String>,
) -> WebResult<Json<Vec<TimeSlot>>> {
    Ok(Json(state.catalog.slots_for_venue(&venue_name).await?))
}

/// Add a slot
pub async fn create_time_slot(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Path(venue_name): Path<String>,
    Json(request): Json<CreateTimeSlotRequest>,
) -> WebResult<(StatusCode, Json<TimeSlotCreated>)> {
    let key = slot_from(&venue_name, &request.start_time, &request.end_time)?;
    let slot = state.catalog.create_slot(&key).await?;
    Ok((
        StatusCode::CREATED,
        Json(TimeSlotCreated {
            id: slot.id,
            venue_name: slot.venue_name,
            start_time: slot.start_time,
            end_time: slot.end_time,
        }),
    ))
}

/// Remove a slot and any booking on it
pub async fn delete_time_slot(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Path((venue_name, start_time, end_time)): Path<(String, String, String)>,
) -> WebResult<StatusCode> {
    let key = slot_from(&venue_name, &start_time, &end_time)?;
    state.catalog.delete_slot(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
