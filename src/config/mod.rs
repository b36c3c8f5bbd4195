//! Configuration module for the simulation service

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub zones: ZoneSettings,
    pub warp: WarpSettings,
    pub sculpt: SculptSettings,
    pub sessions: SessionSettings,
    pub detector: DetectorSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Upper bound for uploaded photos, in bytes
    pub max_payload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Zone table source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// JSON zone table; the built-in table is used when unset
    pub path: Option<PathBuf>,
}

/// MLS transform family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpMode {
    /// Rotation + uniform scale + translation
    #[default]
    Similarity,
    /// Rotation + translation
    Rigid,
}

/// MLS warp tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarpSettings {
    /// Inverse-distance weighting exponent
    pub alpha: f64,
    /// Coarse grid cell size in pixels (1 = exact per-pixel solve)
    pub grid_cell_size: u32,
    pub mode: WarpMode,
    /// Minimum taper band around the control points, in pixels
    pub min_support: f64,
}

impl Default for WarpSettings {
    fn default() -> Self {
        WarpSettings {
            alpha: 2.0,
            grid_cell_size: 8,
            mode: WarpMode::Similarity,
            min_support: 4.0,
        }
    }
}

/// Sculpt engine limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SculptSettings {
    pub max_history: usize,
}

impl Default for SculptSettings {
    fn default() -> Self {
        SculptSettings { max_history: 30 }
    }
}

/// In-memory session store limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_sessions: usize,
    /// Longest accepted photo side, in pixels
    pub max_image_dimension: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            max_sessions: 64,
            max_image_dimension: 4096,
        }
    }
}

/// Landmark detector backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// No detector: every session runs in degraded mode
    #[default]
    None,
    /// Landmarks are computed by the client and uploaded with the photo
    Client,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub backend: DetectorBackend,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with FACESIM_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // FACESIM_WARP__GRID_CELL_SIZE, FACESIM_SERVER__PORT, etc.
            .add_source(
                Environment::with_prefix("FACESIM")
                    .separator("__")
                    .try_parsing(true)
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.warp.alpha, 2.0);
        assert_eq!(settings.warp.grid_cell_size, 8);
        assert_eq!(settings.sculpt.max_history, 30);
        assert_eq!(settings.sessions.max_image_dimension, 4096);
        assert_eq!(settings.detector.backend, DetectorBackend::None);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                "[warp]\ngrid_cell_size = 4\nmode = \"rigid\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.warp.grid_cell_size, 4);
        assert_eq!(settings.warp.mode, WarpMode::Rigid);
        assert_eq!(settings.warp.alpha, 2.0);
        assert_eq!(settings.sessions.max_sessions, 64);
    }
}
