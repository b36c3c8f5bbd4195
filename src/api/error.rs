//! JSON error bodies shared by every handler

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

use crate::error::SimulationError;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Build a `{ success: false, error: { code, message } }` response
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        success: false,
        error: ApiError {
            code: code.to_string(),
            message: message.into(),
        },
    })
}

pub fn session_not_found(id: &str) -> HttpResponse {
    error_response(
        StatusCode::NOT_FOUND,
        "SESSION_NOT_FOUND",
        format!("Session '{}' does not exist", id),
    )
}

/// Worker pool failure while running engine work off the async threads
pub fn blocking_failed(err: impl std::fmt::Display) -> HttpResponse {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_FAILED", err.to_string())
}

/// Map an engine error to its HTTP status and code
pub fn simulation_error(err: &SimulationError) -> HttpResponse {
    let (status, code) = match err {
        SimulationError::ZoneNotFound(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_ZONE"),
        SimulationError::InvalidImage(_) | SimulationError::Image(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_IMAGE")
        }
        SimulationError::DetectionUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "DETECTION_UNAVAILABLE")
        }
        SimulationError::DisplacementMapSizeMismatch { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_FAILED")
        }
    };
    error_response(status, code, err.to_string())
}
