//! Liveness and readiness.
//!
//! `GET /health` answers as long as the process serves HTTP. Readiness is
//! assembled by the application from its own probes and rendered through
//! [`readiness`].

use axum::{http::StatusCode, Json};
use booking_runtime::{HealthCheck, HealthStatus};
use serde::Serialize;

/// Liveness probe; never touches a dependency
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Body of a readiness response
#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    /// Worst of `checks`
    pub status: HealthStatus,
    /// One entry per probed dependency
    pub checks: Vec<HealthCheck>,
}

/// 503 when any probe is unhealthy, otherwise 200
#[must_use]
pub fn readiness(checks: Vec<HealthCheck>) -> (StatusCode, Json<ReadinessReport>) {
    let status = checks
        .iter()
        .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));
    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(ReadinessReport { status, checks }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_plain_ok() {
        assert_eq!(health_check().await, (StatusCode::OK, "ok"));
    }

    #[test]
    fn ready_when_database_answers() {
        let (code, Json(report)) = readiness(vec![HealthCheck::healthy("database")]);
        assert_eq!(code, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn one_failed_probe_makes_the_service_unready() {
        let (code, Json(report)) = readiness(vec![
            HealthCheck::healthy("mailer"),
            HealthCheck::unhealthy("database", "connection refused"),
        ]);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.len(), 2);
    }
}
