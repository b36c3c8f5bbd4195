//! R-Face-Sim
//!
//! HTTP preview service over the simulation engine using Rust + Actix-Web.
//! Photos live in in-memory sessions; every render composites
//! warp, sculpt and skin finish.

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use r_face_sim::api;
use r_face_sim::config::{DetectorBackend, Settings};
use r_face_sim::domain::ZoneTable;
use r_face_sim::landmarks::{FaceMeshDetector, LandmarkAdapter, PrecomputedDetector, UnavailableDetector};
use r_face_sim::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("r_face_sim=info".parse()?)
                .add_directive("actix_web=info".parse()?),
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting R-Face-Sim v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let zones = match &settings.zones.path {
        Some(path) => ZoneTable::load(path)
            .with_context(|| format!("Failed to load zone table from {}", path.display()))?,
        None => ZoneTable::builtin(),
    };
    info!("Loaded {} facial zones", zones.len());

    let detector: Arc<dyn FaceMeshDetector> = match settings.detector.backend {
        DetectorBackend::None => Arc::new(UnavailableDetector),
        DetectorBackend::Client => Arc::new(PrecomputedDetector::new()),
    };
    let landmarks = Arc::new(LandmarkAdapter::new(detector));

    // Load the detector in the background; sessions render without
    // landmarks until it is ready
    let loader = Arc::clone(&landmarks);
    actix_rt::spawn(async move {
        if let Err(e) = loader.initialize().await {
            warn!(error = %e, "Landmark detection unavailable, running in degraded mode");
        }
    });

    let workers = settings.server.workers.unwrap_or_else(num_cpus::get);
    let json_limit = settings.server.max_payload_bytes;
    let app_state = web::Data::new(AppState::new(settings, Arc::new(zones), landmarks));

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "r-face-sim"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION"))),
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
