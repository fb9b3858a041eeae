//! Venue endpoints.
//!
//! - GET /api/venues - Every venue with its slots
//! - GET /api/venues/:name/timeslots - One venue with its slots
//! - POST /api/venues - Create (staff/admin)
//! - PUT /api/venues/:name - Update; renames are rejected (staff/admin)
//! - DELETE /api/venues/:name - Delete with slots and bookings (staff/admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use booking_web::WebResult;
use tracing::info;

use super::MessageResponse;
use crate::auth::{RequireStaff, SessionUser};
use crate::server::AppState;
use crate::store::VenueWithSlots;
use crate::types::Venue;

/// Every venue with its slots
pub async fn list_venues(
    _session: SessionUser,
    State(state): State<AppState>,
) -> WebResult<Json<Vec<VenueWithSlots>>> {
    Ok(Json(state.catalog.list_venues().await?))
}

/// One venue with its slots, as a one-element list
pub async fn get_venue_with_time_slots(
    _session: SessionUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> WebResult<Json<Vec<VenueWithSlots>>> {
    Ok(Json(vec![state.catalog.get_venue(&name).await?]))
}

/// Create a venue and echo it back
pub async fn create_venue(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Json(venue): Json<Venue>,
) -> WebResult<(StatusCode, Json<Venue>)> {
    let venue = state.catalog.create_venue(venue).await?;
    info!(by = %staff.email, venue = %venue.name, "Venue created over HTTP");
    Ok((StatusCode::CREATED, Json(venue)))
}

/// Replace a venue's attributes
pub async fn update_venue(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(venue): Json<Venue>,
) -> WebResult<Json<MessageResponse>> {
    state.catalog.update_venue(&name, venue).await?;
    Ok(Json(MessageResponse::new("Venue updated successfully")))
}

/// Delete a venue
pub async fn delete_venue(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> WebResult<StatusCode> {
    state.catalog.delete_venue(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
