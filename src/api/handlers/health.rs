//! Health check endpoint

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub zones_loaded: usize,
    pub sessions: usize,
    pub detector: DetectorHealth,
}

#[derive(Serialize)]
pub struct DetectorHealth {
    pub name: String,
    pub state: String,
}

/// GET /health - Health check endpoint
///
/// Reports `degraded` while the landmark detector is not ready; the service
/// still renders, using zone geometry only.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0);
    let detector_ready = state.landmarks.is_ready();

    let response = HealthResponse {
        status: if detector_ready { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
        zones_loaded: state.zones.len(),
        sessions: state.sessions.len(),
        detector: DetectorHealth {
            name: state.landmarks.detector_name().to_string(),
            state: state.landmarks.state().to_string(),
        },
    };

    HttpResponse::Ok().json(response)
}
