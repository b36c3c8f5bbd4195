//! Crate-level error taxonomy

use thiserror::Error;

/// Errors surfaced by the simulation engine.
///
/// Intensity overflow and empty control sets are not errors: the former is
/// clamped in [`crate::domain::Intensity`], the latter renders as identity.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Landmark detection unavailable: {0}")]
    DetectionUnavailable(String),
    #[error("Displacement map is {map_width}x{map_height} but image is {image_width}x{image_height}")]
    DisplacementMapSizeMismatch {
        map_width: u32,
        map_height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
