//! Face-mesh detector contract and the built-in backends

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::Landmark;

/// Detector backend errors
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Initialization failed: {0}")]
    Initialization(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Pluggable face-mesh detection backend.
///
/// `initialize` is called once and may be slow (model download, GPU setup).
/// After it succeeds, `detect` must be pure: the same image yields the same
/// faces. Each returned face is the raw landmark list for that face; the
/// adapter validates count and layout.
#[async_trait]
pub trait FaceMeshDetector: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<(), DetectorError>;

    fn detect(&self, image: &RgbaImage) -> Result<Vec<Vec<Landmark>>, DetectorError>;

    /// Whether inference runs on an accelerator
    fn uses_acceleration(&self) -> bool {
        false
    }
}

/// Backend used when no detector is deployed.
///
/// Initialization always fails, which puts the engine in degraded mode
/// (zone-geometry-only warps).
#[derive(Debug, Default)]
pub struct UnavailableDetector;

#[async_trait]
impl FaceMeshDetector for UnavailableDetector {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn initialize(&self) -> Result<(), DetectorError> {
        Err(DetectorError::Initialization(
            "no landmark detector configured".to_string(),
        ))
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<Vec<Landmark>>, DetectorError> {
        Err(DetectorError::Inference("no landmark detector configured".to_string()))
    }
}

/// Backend for hosts that run the detector client-side.
///
/// The host uploads the faces it found together with the photo; `detect`
/// hands them back for validation.
#[derive(Debug, Default)]
pub struct PrecomputedDetector {
    faces: RwLock<Vec<Vec<Landmark>>>,
}

impl PrecomputedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the faces reported for the current photo
    pub fn set_faces(&self, faces: Vec<Vec<Landmark>>) {
        debug!(faces = faces.len(), "Precomputed landmarks updated");
        *self.faces.write() = faces;
    }
}

#[async_trait]
impl FaceMeshDetector for PrecomputedDetector {
    fn name(&self) -> &str {
        "precomputed"
    }

    async fn initialize(&self) -> Result<(), DetectorError> {
        Ok(())
    }

    fn detect(&self, _image: &RgbaImage) -> Result<Vec<Vec<Landmark>>, DetectorError> {
        Ok(self.faces.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_detector_fails_init() {
        let detector = UnavailableDetector;
        let result = tokio_test::block_on(detector.initialize());
        assert!(matches!(result, Err(DetectorError::Initialization(_))));
    }

    #[test]
    fn test_precomputed_detector_returns_faces() {
        let detector = PrecomputedDetector::new();
        let image = RgbaImage::new(4, 4);
        assert!(detector.detect(&image).unwrap().is_empty());

        detector.set_faces(vec![vec![Landmark::new(0.5, 0.5)]]);
        let faces = detector.detect(&image).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0][0], Landmark::new(0.5, 0.5));
    }
}
