//! Landmark adapter
//!
//! Wraps an external face-mesh detector behind a validated, immutable
//! [`LandmarkSet`] and an explicit load lifecycle:
//! - [`FaceMeshDetector`] is the pluggable detector contract
//! - [`LandmarkAdapter`] owns initialization, cancellation and single-face validation
//! - [`mesh`] names the landmark index groups facial zones anchor to

mod adapter;
mod detector;
pub mod mesh;
mod set;

pub use adapter::{DetectionToken, DetectorState, LandmarkAdapter};
pub use detector::{DetectorError, FaceMeshDetector, PrecomputedDetector, UnavailableDetector};
pub use set::{Landmark, LandmarkSet};

use thiserror::Error;

use crate::error::SimulationError;

/// Landmark adapter errors
#[derive(Debug, Error)]
pub enum LandmarkError {
    #[error("No face found in image")]
    NoFace,
    #[error("Expected exactly one face, found {0}")]
    MultipleFaces(usize),
    #[error("Expected {expected} landmarks, got {got}")]
    InvalidPointCount { expected: usize, got: usize },
    #[error("Landmark {0} has a non-finite coordinate")]
    NonFiniteCoordinate(usize),
    #[error("Detector is not ready (state: {0})")]
    NotReady(DetectorState),
    #[error("Detector is already loading")]
    AlreadyLoading,
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),
}

impl LandmarkError {
    /// Zero or ambiguous faces: the caller keeps its previous landmarks
    pub fn is_not_found(&self) -> bool {
        matches!(self, LandmarkError::NoFace | LandmarkError::MultipleFaces(_))
    }
}

impl From<LandmarkError> for SimulationError {
    fn from(err: LandmarkError) -> Self {
        SimulationError::DetectionUnavailable(err.to_string())
    }
}

/// Deterministic full-size point cloud for tests
#[cfg(test)]
pub(crate) fn synthetic_landmarks() -> Vec<Landmark> {
    (0..mesh::FACE_MESH_POINTS)
        .map(|i| {
            let col = (i % 26) as f32;
            let row = (i / 26) as f32;
            Landmark::new(0.1 + col * 0.03, 0.1 + row * 0.04)
        })
        .collect()
}
