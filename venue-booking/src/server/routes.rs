//! Router configuration for the venue booking API.

use super::state::AppState;
use crate::api::{bookings, timeslots, users, venues};
use crate::auth::session_layer;
use crate::config::ServerConfig;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use booking_runtime::HealthCheck;
use booking_web::correlate_request;
use booking_web::handlers::health::{health_check, readiness, ReadinessReport};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Build the complete Axum router.
///
/// Everything except the health checks is nested under `/api`. Every
/// request passes the session layer; handlers decide whether they need a
/// session through their extractors.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let user_routes = Router::new()
        .route("/", post(users::register).get(users::list_users))
        .route("/create-for-admin", post(users::create_for_admin))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout))
        .route("/me", get(users::me))
        .route("/generate-otp/:email", post(users::generate_otp))
        .route("/verify-otp", post(users::verify_otp))
        .route("/request-password-reset-otp", post(users::request_password_reset_otp))
        .route("/reset-password", post(users::reset_password))
        .route("/toggle-maintenance-mode", post(users::toggle_maintenance_mode))
        .route("/maintenance-mode-status", get(users::maintenance_mode_status))
        .route("/toggle-login-lockout", post(users::toggle_login_lockout))
        .route(
            "/:email",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    let venue_routes = Router::new()
        .route("/", get(venues::list_venues).post(venues::create_venue))
        .route("/:name", put(venues::update_venue).delete(venues::delete_venue))
        .route("/:name/timeslots", get(venues::get_venue_with_time_slots));

    let timeslot_routes = Router::new()
        .route("/venue/:venue_name", get(timeslots::list_for_venue))
        .route("/:venue_name", post(timeslots::create_time_slot))
        .route("/:venue_name/:start/:end", delete(timeslots::delete_time_slot));

    let booking_routes = Router::new()
        .route("/", get(bookings::list_bookings).post(bookings::create_booking))
        .route("/user/:email", get(bookings::bookings_for_user))
        .route(
            "/user/:email/venue/:venue_name/time",
            delete(bookings::delete_booking),
        )
        .route("/cancel", delete(bookings::cancel_booking))
        .route("/accept", put(bookings::accept_payment))
        .route("/reject", put(bookings::reject_payment))
        .route("/validate-qr", get(bookings::validate_qr))
        .route("/:id/screenshot", get(bookings::screenshot));

    let api_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/venues", venue_routes)
        .nest("/timeslots", timeslot_routes)
        .nest("/bookings", booking_routes);

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session_layer,
        ))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors(&config.cors_origin))
        .layer(middleware::from_fn(correlate_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Credentialed CORS for the frontend origin
fn cors(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true);

    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(error) => {
            warn!(origin = %origin, %error, "Invalid CORS origin; cross-origin requests disabled");
            layer
        }
    }
}

/// Readiness: the database answers
async fn readiness_check(
    State(state): State<AppState>,
) -> (axum::http::StatusCode, Json<ReadinessReport>) {
    let database = match state.store.ping().await {
        Ok(()) => HealthCheck::healthy("database"),
        Err(error) => HealthCheck::unhealthy("database", error.to_string()),
    };
    readiness(vec![database])
}
