//! R-Face-Sim
//!
//! Facial procedure preview engine: landmark-driven moving-least-squares
//! warping, brush sculpting over a persistent displacement map, and a skin
//! finish pass, composited in that order.

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod landmarks;

pub use config::Settings;
pub use domain::{ControlPoints, Point, Procedure, ProcedureSet, ProcedureType, ZoneTable};
pub use engine::{BrushTool, MlsWarper, SculptEngine, Simulation, Stroke};
pub use error::{SimulationError, SimulationResult};
pub use landmarks::{DetectionToken, LandmarkAdapter, LandmarkSet};

use crate::api::store::SessionStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub zones: Arc<ZoneTable>,
    pub landmarks: Arc<LandmarkAdapter>,
    pub sessions: SessionStore,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(settings: Settings, zones: Arc<ZoneTable>, landmarks: Arc<LandmarkAdapter>) -> Self {
        let sessions = SessionStore::new(settings.sessions.max_sessions);
        AppState {
            settings,
            zones,
            landmarks,
            sessions,
            started_at: Utc::now(),
        }
    }
}
