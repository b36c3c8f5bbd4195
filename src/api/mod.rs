//! API module - HTTP routes and handlers

pub mod error;
pub mod handlers;
pub mod store;

use actix_web::web;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/zones", web::get().to(handlers::zones::list_zones))
            .service(
                web::scope("/sessions")
                    .route("", web::post().to(handlers::sessions::create_session))
                    .route("/{session_id}", web::get().to(handlers::sessions::get_session))
                    .route("/{session_id}", web::delete().to(handlers::sessions::delete_session))
                    .route("/{session_id}/photo", web::put().to(handlers::sessions::replace_photo))
                    .route("/{session_id}/procedures", web::put().to(handlers::sessions::update_procedures))
                    .route("/{session_id}/sculpt/{action}", web::post().to(handlers::sessions::sculpt_action))
                    .route("/{session_id}/strokes", web::post().to(handlers::sessions::apply_stroke))
                    .route("/{session_id}/undo", web::post().to(handlers::sessions::undo))
                    // More specific render route first
                    .route("/{session_id}/render.png", web::get().to(handlers::sessions::render_png))
                    .route("/{session_id}/render", web::get().to(handlers::sessions::render))
            )
    )
    .route("/health", web::get().to(handlers::health::health_check));
}
