//! Detector lifecycle and single-face validation

use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{DetectorError, FaceMeshDetector, Landmark, LandmarkError, LandmarkSet};

/// Load state of the wrapped detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorState::Uninitialized => write!(f, "uninitialized"),
            DetectorState::Loading => write!(f, "loading"),
            DetectorState::Ready => write!(f, "ready"),
            DetectorState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Abandons one in-flight [`LandmarkAdapter::detect_async`].
///
/// Each photo load gets its own token; cancelling it never touches
/// detections started for other photos. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct DetectionToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl DetectionToken {
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        DetectionToken { cancelled: Arc::new(cancelled) }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    async fn cancelled(&self) {
        let mut flag = self.cancelled.subscribe();
        let _ = flag.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for DetectionToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns a detector and exposes validated landmark sets.
///
/// `cancel_loading` abandons a pending initialization. In-flight detections
/// are abandoned through the [`DetectionToken`] passed to `detect_async`.
pub struct LandmarkAdapter {
    detector: Arc<dyn FaceMeshDetector>,
    state: RwLock<DetectorState>,
    load_epoch: watch::Sender<u64>,
}

impl LandmarkAdapter {
    pub fn new(detector: Arc<dyn FaceMeshDetector>) -> Self {
        let (load_epoch, _) = watch::channel(0);
        LandmarkAdapter {
            detector,
            state: RwLock::new(DetectorState::Uninitialized),
            load_epoch,
        }
    }

    /// Current state. Never blocks on a pending load.
    pub fn state(&self) -> DetectorState {
        self.state.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.read() == DetectorState::Ready
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Load the detector.
    ///
    /// Idempotent once `Ready`. A `Failed` detector may be retried by calling
    /// again. Resolves with `Cancelled` (state back to `Uninitialized`) if
    /// [`cancel_loading`](Self::cancel_loading) fires first.
    #[instrument(skip(self), fields(detector = self.detector.name()))]
    pub async fn initialize(&self) -> Result<(), LandmarkError> {
        {
            let mut state = self.state.write();
            match *state {
                DetectorState::Ready => return Ok(()),
                DetectorState::Loading => return Err(LandmarkError::AlreadyLoading),
                _ => *state = DetectorState::Loading,
            }
        }

        let mut cancelled = self.load_epoch.subscribe();

        let outcome = tokio::select! {
            result = self.detector.initialize() => Some(result),
            _ = cancelled.changed() => None,
        };

        match outcome {
            Some(Ok(())) => {
                *self.state.write() = DetectorState::Ready;
                info!(
                    accelerated = self.detector.uses_acceleration(),
                    "Landmark detector ready"
                );
                Ok(())
            }
            Some(Err(e)) => {
                warn!(error = %e, "Landmark detector failed to initialize, running without landmarks");
                *self.state.write() = DetectorState::Failed(e.to_string());
                Err(LandmarkError::Detector(e))
            }
            None => {
                debug!("Landmark detector load cancelled");
                *self.state.write() = DetectorState::Uninitialized;
                Err(LandmarkError::Cancelled)
            }
        }
    }

    /// Abandon a pending [`initialize`](Self::initialize)
    pub fn cancel_loading(&self) {
        self.load_epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Synchronous detection on a ready detector
    pub fn detect(&self, image: &RgbaImage) -> Result<LandmarkSet, LandmarkError> {
        if !self.is_ready() {
            return Err(LandmarkError::NotReady(self.state()));
        }
        let faces = self.detector.detect(image)?;
        select_single_face(faces)
    }

    /// Detection on the blocking pool.
    ///
    /// Returns `Cancelled` as soon as `token` is cancelled; the detector call
    /// itself is left to finish and its result is dropped.
    pub async fn detect_async(
        &self,
        image: Arc<RgbaImage>,
        token: &DetectionToken,
    ) -> Result<LandmarkSet, LandmarkError> {
        if !self.is_ready() {
            return Err(LandmarkError::NotReady(self.state()));
        }
        if token.is_cancelled() {
            return Err(LandmarkError::Cancelled);
        }

        let detector = Arc::clone(&self.detector);
        let task = tokio::task::spawn_blocking(move || detector.detect(&image));

        tokio::select! {
            joined = task => {
                let faces = joined
                    .map_err(|e| DetectorError::Inference(format!("Detection task failed: {}", e)))??;
                if token.is_cancelled() {
                    return Err(LandmarkError::Cancelled);
                }
                select_single_face(faces)
            }
            _ = token.cancelled() => {
                debug!("Landmark detection abandoned after image change");
                Err(LandmarkError::Cancelled)
            }
        }
    }
}

fn select_single_face(mut faces: Vec<Vec<Landmark>>) -> Result<LandmarkSet, LandmarkError> {
    match faces.len() {
        0 => Err(LandmarkError::NoFace),
        1 => {
            let face = faces.pop().ok_or(LandmarkError::NoFace)?;
            LandmarkSet::new(face)
        }
        n => {
            debug!(faces = n, "Ambiguous detection, rejecting");
            Err(LandmarkError::MultipleFaces(n))
        }
    }
}
