//! Simulation session endpoints
//!
//! Engine work (warp, sculpt, render, PNG encoding) runs on the blocking
//! pool; each session's simulation sits behind its own mutex so gestures
//! on one session are applied strictly in order.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::error::{blocking_failed, error_response, session_not_found, simulation_error};
use crate::api::store::Session;
use crate::config::DetectorBackend;
use crate::domain::{Procedure, ProcedureSet};
use crate::engine::{check_dimensions, SculptState, Simulation, Stroke};
use crate::error::SimulationError;
use crate::landmarks::{
    DetectionToken, Landmark, LandmarkAdapter, LandmarkError, LandmarkSet, PrecomputedDetector,
};
use crate::AppState;

/// Request body carrying a photo, for session creation and photo replacement
#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    /// Base64 encoded photo, optionally as a `data:` URL
    pub image: String,
    /// Faces found by a client-side detector
    #[serde(default)]
    pub faces: Option<Vec<Vec<Landmark>>>,
}

/// One zone assignment in a procedure update
#[derive(Debug, Deserialize)]
pub struct ZoneProcedure {
    pub zone_id: String,
    pub procedure: Procedure,
}

/// Request body replacing every procedure of a session
#[derive(Debug, Deserialize)]
pub struct UpdateProceduresRequest {
    pub procedures: Vec<ZoneProcedure>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub has_landmarks: bool,
    pub procedures: usize,
    pub sculpt: SculptState,
    pub history: usize,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub data: SessionInfo,
    /// Why the session runs without landmarks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SessionResponse {
    fn new(data: SessionInfo) -> Self {
        SessionResponse { success: true, data, warning: None }
    }

    fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }
}

#[derive(Serialize)]
pub struct UndoResponse {
    pub success: bool,
    pub undone: bool,
    pub data: SessionInfo,
}

#[derive(Serialize)]
pub struct RenderResponse {
    pub success: bool,
    pub image: String,
    pub metadata: RenderMetadata,
}

#[derive(Serialize)]
pub struct RenderMetadata {
    pub render_time_ms: u64,
    pub width: u32,
    pub height: u32,
}

fn session_info(id: Uuid, created_at: DateTime<Utc>, sim: &Simulation) -> SessionInfo {
    let (width, height) = sim.dimensions();
    SessionInfo {
        id,
        created_at,
        width,
        height,
        has_landmarks: sim.landmarks().is_some(),
        procedures: sim.procedures().len(),
        sculpt: sim.sculpt_state(),
        history: sim.sculpt().history_len(),
    }
}

/// Decode an uploaded photo. The header is checked against `max_dimension`
/// before any pixel data is decoded.
fn decode_image(data: &str, max_dimension: u32) -> Result<RgbaImage, SimulationError> {
    let payload = match data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| SimulationError::InvalidImage(format!("invalid base64: {}", e)))?;

    let (width, height) = image::io::Reader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| SimulationError::InvalidImage(e.to_string()))?
        .into_dimensions()?;
    check_dimensions(width, height, max_dimension)?;

    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(buffer)
}

/// Outcome of landmark detection for one uploaded photo
enum Detection {
    Found(LandmarkSet),
    /// No usable landmarks; the session runs on zone geometry
    Degraded(SimulationError),
    /// A newer photo or a session delete got there first
    Cancelled,
}

async fn detect_landmarks(
    state: &AppState,
    image: Arc<RgbaImage>,
    faces: Option<Vec<Vec<Landmark>>>,
    token: &DetectionToken,
) -> Detection {
    let result = match (state.settings.detector.backend, faces) {
        (DetectorBackend::Client, Some(faces)) => {
            let detector = PrecomputedDetector::new();
            detector.set_faces(faces);
            let adapter = LandmarkAdapter::new(Arc::new(detector));
            match adapter.initialize().await {
                Ok(()) => adapter.detect_async(image, token).await,
                Err(e) => Err(e),
            }
        }
        (backend, faces) => {
            if faces.is_some() && backend != DetectorBackend::Client {
                debug!("Ignoring uploaded faces, client detection is disabled");
            }
            state.landmarks.detect_async(image, token).await
        }
    };

    match result {
        Ok(landmarks) => Detection::Found(landmarks),
        Err(LandmarkError::Cancelled) => {
            debug!("Landmark detection cancelled");
            Detection::Cancelled
        }
        Err(e) => {
            match &e {
                LandmarkError::NotReady(detector) => {
                    debug!(state = %detector, "Landmark detector not ready, using zone geometry")
                }
                e if e.is_not_found() => info!(reason = %e, "No single face found, using zone geometry"),
                e => warn!(error = %e, "Landmark detection failed, using zone geometry"),
            }
            Detection::Degraded(e.into())
        }
    }
}

fn find_session(state: &AppState, id: &str) -> Result<Arc<Session>, HttpResponse> {
    Uuid::parse_str(id)
        .ok()
        .and_then(|uuid| state.sessions.get(&uuid))
        .ok_or_else(|| session_not_found(id))
}

/// Run `f` against the session's simulation on the blocking pool
async fn with_simulation<T, F>(session: Arc<Session>, f: F) -> Result<T, HttpResponse>
where
    F: FnOnce(&mut Simulation) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut sim = session.simulation();
        f(&mut sim)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Engine task failed");
        blocking_failed(e)
    })
}

fn photo_replaced() -> HttpResponse {
    error_response(
        StatusCode::CONFLICT,
        "PHOTO_REPLACED",
        "A newer photo replaced this one before detection finished",
    )
}

/// POST /api/v1/sessions - Upload a photo and start a session
pub async fn create_session(
    state: web::Data<AppState>,
    body: web::Json<PhotoRequest>,
) -> HttpResponse {
    let start = Instant::now();
    let body = body.into_inner();

    let image = match decode_image(&body.image, state.settings.sessions.max_image_dimension) {
        Ok(image) => Arc::new(image),
        Err(e) => {
            warn!(error = %e, "Rejected session photo");
            return simulation_error(&e);
        }
    };

    let detection = detect_landmarks(&state, Arc::clone(&image), body.faces, &DetectionToken::new()).await;
    let (landmarks, warning) = match detection {
        Detection::Found(landmarks) => (Some(landmarks), None),
        Detection::Degraded(e) => (None, Some(e.to_string())),
        Detection::Cancelled => (None, None),
    };
    let image = Arc::try_unwrap(image).unwrap_or_else(|shared| (*shared).clone());

    let simulation = match Simulation::new(image, landmarks, Arc::clone(&state.zones), &state.settings) {
        Ok(sim) => sim,
        Err(e) => {
            warn!(error = %e, "Rejected session photo");
            return simulation_error(&e);
        }
    };

    let session = state.sessions.insert(simulation);
    let (id, created_at) = (session.id, session.created_at);
    let info = match with_simulation(session, move |sim| session_info(id, created_at, sim)).await {
        Ok(info) => info,
        Err(response) => return response,
    };

    info!(
        session_id = %id,
        width = info.width,
        height = info.height,
        has_landmarks = info.has_landmarks,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Session ready"
    );

    HttpResponse::Created().json(SessionResponse::new(info).with_warning(warning))
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let session = match find_session(&state, &path) {
        Ok(s) => s,
        Err(response) => return response,
    };
    let (id, created_at) = (session.id, session.created_at);
    match with_simulation(session, move |sim| session_info(id, created_at, sim)).await {
        Ok(info) => HttpResponse::Ok().json(SessionResponse::new(info)),
        Err(response) => response,
    }
}

/// PUT /api/v1/sessions/{session_id}/photo - Replace the photo, keeping procedures
///
/// The new photo is shown at once on zone geometry; landmarks follow when
/// detection finishes, unless another photo replaced this one first.
pub async fn replace_photo(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PhotoRequest>,
) -> HttpResponse {
    let session = match find_session(&state, &path) {
        Ok(s) => s,
        Err(response) => return response,
    };
    let body = body.into_inner();

    let image = match decode_image(&body.image, state.settings.sessions.max_image_dimension) {
        Ok(image) => image,
        Err(e) => {
            warn!(error = %e, "Rejected replacement photo");
            return simulation_error(&e);
        }
    };
    let detect_input = Arc::new(image.clone());
    let token = session.begin_detection();

    let loaded = with_simulation(Arc::clone(&session), move |sim| sim.load_photo(image, None)).await;
    let generation = match loaded {
        Ok(Ok(generation)) => generation,
        Ok(Err(e)) => return simulation_error(&e),
        Err(response) => return response,
    };

    let (landmarks, warning) = match detect_landmarks(&state, detect_input, body.faces, &token).await {
        Detection::Found(landmarks) => (Some(landmarks), None),
        Detection::Degraded(e) => (None, Some(e.to_string())),
        Detection::Cancelled => return photo_replaced(),
    };

    let (id, created_at) = (session.id, session.created_at);
    let result = with_simulation(session, move |sim| {
        let current = match landmarks {
            Some(landmarks) => sim.set_landmarks(generation, Some(landmarks)),
            None => sim.photo_generation() == generation,
        };
        (current, session_info(id, created_at, sim))
    })
    .await;

    match result {
        Ok((true, info)) => {
            debug!(session_id = %id, generation = generation, has_landmarks = info.has_landmarks, "Photo replaced");
            HttpResponse::Ok().json(SessionResponse::new(info).with_warning(warning))
        }
        Ok((false, _)) => photo_replaced(),
        Err(response) => response,
    }
}

/// DELETE /api/v1/sessions/{session_id}
pub async fn delete_session(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match Uuid::parse_str(&path) {
        Ok(id) if state.sessions.remove(&id) => HttpResponse::NoContent().finish(),
        _ => session_not_found(&path),
    }
}

/// PUT /api/v1/sessions/{session_id}/procedures - Replace all procedures
pub async fn update_procedures(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateProceduresRequest>,
) -> HttpResponse {
    let session = match find_session(&state, &path) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let mut procedures = ProcedureSet::new();
    for entry in body.into_inner().procedures {
        procedures.set(entry.zone_id, entry.procedure);
    }

    let (id, created_at) = (session.id, session.created_at);
    let result = with_simulation(session, move |sim| {
        sim.set_procedures(procedures)
            .map(|()| session_info(id, created_at, sim))
    })
    .await;

    match result {
        Ok(Ok(info)) => {
            debug!(session_id = %id, procedures = info.procedures, "Procedures updated");
            HttpResponse::Ok().json(SessionResponse::new(info))
        }
        Ok(Err(e)) => simulation_error(&e),
        Err(response) => response,
    }
}

/// POST /api/v1/sessions/{session_id}/sculpt/{action} - activate, deactivate or reset
pub async fn sculpt_action(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (session_id, action) = path.into_inner();
    if !matches!(action.as_str(), "activate" | "deactivate" | "reset") {
        return error_response(
            StatusCode::NOT_FOUND,
            "UNKNOWN_ACTION",
            format!("Unknown sculpt action '{}'", action),
        );
    }

    let session = match find_session(&state, &session_id) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let (id, created_at) = (session.id, session.created_at);
    let result = with_simulation(session, move |sim| {
        match action.as_str() {
            "activate" => sim.activate_sculpt()?,
            "deactivate" => sim.deactivate_sculpt(),
            _ => sim.reset_sculpt(),
        }
        Ok::<_, SimulationError>(session_info(id, created_at, sim))
    })
    .await;

    match result {
        Ok(Ok(info)) => HttpResponse::Ok().json(SessionResponse::new(info)),
        Ok(Err(e)) => simulation_error(&e),
        Err(response) => response,
    }
}

/// POST /api/v1/sessions/{session_id}/strokes - Apply one brush gesture
pub async fn apply_stroke(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Stroke>,
) -> HttpResponse {
    let session = match find_session(&state, &path) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let stroke = body.into_inner();
    let (id, created_at) = (session.id, session.created_at);
    let result = with_simulation(session, move |sim| {
        if sim.sculpt_state() != SculptState::Active {
            return None;
        }
        sim.stroke(&stroke);
        Some(session_info(id, created_at, sim))
    })
    .await;

    match result {
        Ok(Some(info)) => HttpResponse::Ok().json(SessionResponse::new(info)),
        Ok(None) => error_response(
            StatusCode::CONFLICT,
            "SCULPT_INACTIVE",
            "Activate sculpting before applying strokes",
        ),
        Err(response) => response,
    }
}

/// POST /api/v1/sessions/{session_id}/undo - Revert the last stroke
pub async fn undo(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let session = match find_session(&state, &path) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let (id, created_at) = (session.id, session.created_at);
    let result = with_simulation(session, move |sim| {
        let undone = sim.undo();
        (undone, session_info(id, created_at, sim))
    })
    .await;

    match result {
        Ok((undone, info)) => HttpResponse::Ok().json(UndoResponse { success: true, undone, data: info }),
        Err(response) => response,
    }
}

/// Composite and encode on the blocking pool
async fn render_session(state: &AppState, id: &str) -> Result<(Vec<u8>, u32, u32, u64), HttpResponse> {
    let session = find_session(state, id)?;
    let start = Instant::now();

    let encoded = with_simulation(session, |sim| {
        let rendered = sim.render();
        let (width, height) = rendered.dimensions();
        encode_png(&rendered).map(|png| (png, width, height))
    })
    .await?;

    let (png, width, height) = encoded.map_err(|e| {
        error!(error = %e, "PNG encoding failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "ENCODING_FAILED", e.to_string())
    })?;

    let elapsed = start.elapsed().as_millis() as u64;
    info!(
        session_id = %id,
        width = width,
        height = height,
        bytes = png.len(),
        render_time_ms = elapsed,
        "Render complete"
    );
    Ok((png, width, height, elapsed))
}

/// GET /api/v1/sessions/{session_id}/render - Composite as a PNG data URL
pub async fn render(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match render_session(&state, &path).await {
        Ok((png, width, height, render_time_ms)) => HttpResponse::Ok().json(RenderResponse {
            success: true,
            image: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&png)
            ),
            metadata: RenderMetadata { render_time_ms, width, height },
        }),
        Err(response) => response,
    }
}

/// GET /api/v1/sessions/{session_id}/render.png - Composite as raw PNG
pub async fn render_png(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match render_session(&state, &path).await {
        Ok((png, ..)) => HttpResponse::Ok()
            .content_type("image/png")
            .body(Bytes::from(png)),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::config::Settings;
    use crate::domain::ZoneTable;
    use crate::landmarks::{synthetic_landmarks, UnavailableDetector};
    use actix_web::{test, App};
    use image::Rgba;
    use serde_json::{json, Value};

    fn app_state(settings: Settings) -> web::Data<AppState> {
        let adapter = LandmarkAdapter::new(Arc::new(UnavailableDetector));
        web::Data::new(AppState::new(settings, Arc::new(ZoneTable::builtin()), Arc::new(adapter)))
    }

    fn photo_base64(width: u32, height: u32) -> String {
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, 128, 255]));
        base64::engine::general_purpose::STANDARD.encode(encode_png(&image).unwrap())
    }

    #[actix_web::test]
    async fn test_session_lifecycle() {
        let app = test::init_service(App::new().app_data(app_state(Settings::default())).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": format!("data:image/png;base64,{}", photo_base64(48, 48)) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["width"], 48);
        assert_eq!(body["data"]["has_landmarks"], false);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/procedures", id))
            .set_json(json!({ "procedures": [
                { "zone_id": "chin", "procedure": { "type": "filler", "intensity": 60 } },
                { "zone_id": "forehead", "procedure": { "type": "skinbooster", "intensity": 250 } }
            ]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["procedures"], 2);

        let stroke = json!({ "tool": "push", "brush_size": 6.0, "strength": 1.0,
                             "points": [{ "x": 20.0, "y": 20.0 }, { "x": 24.0, "y": 21.0 }] });
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/strokes", id))
            .set_json(&stroke)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/sculpt/activate", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["sculpt"], "active");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/strokes", id))
            .set_json(&stroke)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["history"], 1);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/undo", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["undone"], true);
        assert_eq!(body["data"]["history"], 0);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/render", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(body["metadata"]["height"], 48);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/render.png", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
        let png = test::read_body(resp).await;
        assert_eq!(image::load_from_memory(&png).unwrap().width(), 48);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/sessions/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_rejects_bad_input() {
        let app = test::init_service(App::new().app_data(app_state(Settings::default())).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": "not base64!" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_IMAGE");

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(16, 16) }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/procedures", id))
            .set_json(json!({ "procedures": [
                { "zone_id": "earlobe", "procedure": { "type": "botox", "intensity": 10 } }
            ]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "UNKNOWN_ZONE");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/sculpt/explode", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/v1/sessions/not-a-uuid/render")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_client_faces_validated() {
        let mut settings = Settings::default();
        settings.detector.backend = DetectorBackend::Client;
        let app = test::init_service(App::new().app_data(app_state(settings)).configure(configure_routes)).await;

        let face = synthetic_landmarks();
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(32, 32), "faces": [face] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["has_landmarks"], true);

        // Two faces are ambiguous: the session still opens, without landmarks
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(32, 32), "faces": [face.clone(), face] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["has_landmarks"], false);
        assert!(body["warning"].as_str().unwrap().contains("exactly one face"));
    }

    #[actix_web::test]
    async fn test_oversized_photo_rejected() {
        let mut settings = Settings::default();
        settings.sessions.max_image_dimension = 32;
        let app = test::init_service(App::new().app_data(app_state(settings)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(48, 16) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_IMAGE");

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(32, 32) }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/photo", id))
            .set_json(json!({ "image": photo_base64(16, 40) }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["width"], 32);
    }

    #[actix_web::test]
    async fn test_replace_photo_keeps_procedures() {
        let mut settings = Settings::default();
        settings.detector.backend = DetectorBackend::Client;
        let app = test::init_service(App::new().app_data(app_state(settings)).configure(configure_routes)).await;

        let face = synthetic_landmarks();
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(32, 32), "faces": [face] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.get("warning").is_none());
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/procedures", id))
            .set_json(json!({ "procedures": [
                { "zone_id": "lips", "procedure": { "type": "filler", "intensity": 40 } }
            ]}))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/sculpt/activate", id))
            .to_request();
        test::call_service(&app, req).await;

        // No faces this time: the new photo runs on zone geometry
        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/photo", id))
            .set_json(json!({ "image": photo_base64(40, 24) }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["width"], 40);
        assert_eq!(body["data"]["height"], 24);
        assert_eq!(body["data"]["has_landmarks"], false);
        assert_eq!(body["data"]["procedures"], 1);
        assert_eq!(body["data"]["sculpt"], "inactive");
        assert!(body["warning"].is_string());

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/sessions/{}/photo", id))
            .set_json(json!({ "image": photo_base64(24, 24), "faces": [face] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["has_landmarks"], true);
        assert!(body.get("warning").is_none());
    }

    #[actix_web::test]
    async fn test_summary_waits_off_the_request_thread() {
        let state = app_state(Settings::default());
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(json!({ "image": photo_base64(16, 16) }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let session = state.sessions.get(&Uuid::parse_str(&id).unwrap()).unwrap();

        // Simulate long engine work holding the session lock
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let busy = std::thread::spawn(move || {
            let _sim = session.simulation();
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let ticks = std::sync::atomic::AtomicUsize::new(0);
        let summary = async {
            let req = test::TestRequest::get()
                .uri(&format!("/api/v1/sessions/{}", id))
                .to_request();
            let resp = test::call_service(&app, req).await;
            (resp.status(), ticks.load(std::sync::atomic::Ordering::SeqCst))
        };
        let ticker = async {
            for _ in 0..5 {
                actix_rt::time::sleep(std::time::Duration::from_millis(20)).await;
                ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        };
        let ((status, ticks_seen), _) = tokio::join!(summary, ticker);
        busy.join().unwrap();

        assert_eq!(status, StatusCode::OK);
        // The runtime kept running other tasks while the lock was held
        assert!(ticks_seen > 0);
    }

    #[actix_web::test]
    async fn test_health_and_zones() {
        let app = test::init_service(App::new().app_data(app_state(Settings::default())).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["detector"]["name"], "unavailable");

        let req = test::TestRequest::get().uri("/api/v1/zones").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 16);
        assert_eq!(body["data"][0]["id"], "forehead");
    }
}
