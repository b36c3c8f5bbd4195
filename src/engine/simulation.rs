//! Simulation session
//!
//! Owns one photo and everything derived from it. Procedure edits re-resolve
//! control points and recompute the warp; sculpt state survives re-warps and
//! is dropped only by an explicit reset or a new photo. Rendering always
//! composites Original → Warp → Sculpt → Skin.

use std::borrow::Cow;
use std::sync::Arc;

use image::RgbaImage;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::mls::MlsWarper;
use super::resolver::resolve;
use super::sculpt::{BrushTool, SculptEngine, SculptState};
use super::skin::apply_skin_effects;
use crate::config::Settings;
use crate::domain::{Point, Procedure, ProcedureSet, ZoneTable};
use crate::error::{SimulationError, SimulationResult};
use crate::landmarks::LandmarkSet;

fn default_strength() -> f32 {
    0.5
}

/// A pointer gesture: one history entry regardless of point count
#[derive(Debug, Clone, Deserialize)]
pub struct Stroke {
    pub tool: BrushTool,
    pub brush_size: f32,
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Pointer positions in image pixel space
    pub points: Vec<Point>,
}

pub struct Simulation {
    original: RgbaImage,
    landmarks: Option<LandmarkSet>,
    zones: Arc<ZoneTable>,
    procedures: ProcedureSet,
    warper: MlsWarper,
    /// `None` while the warp is the identity
    warped: Option<RgbaImage>,
    sculpt: SculptEngine,
    last_pointer: Option<Point>,
    /// Bumped on every photo load; tags asynchronous landmark results
    photo_generation: u64,
    max_image_dimension: u32,
}

/// Reject empty photos and photos with a side longer than `max_dimension`
pub fn check_dimensions(width: u32, height: u32, max_dimension: u32) -> SimulationResult<()> {
    if width == 0 || height == 0 {
        return Err(SimulationError::InvalidImage("image has no pixels".to_string()));
    }
    if width > max_dimension || height > max_dimension {
        return Err(SimulationError::InvalidImage(format!(
            "image is {}x{}, the longest accepted side is {}",
            width, height, max_dimension
        )));
    }
    Ok(())
}

impl Simulation {
    pub fn new(
        original: RgbaImage,
        landmarks: Option<LandmarkSet>,
        zones: Arc<ZoneTable>,
        settings: &Settings,
    ) -> SimulationResult<Self> {
        let max_image_dimension = settings.sessions.max_image_dimension;
        check_dimensions(original.width(), original.height(), max_image_dimension)?;
        info!(
            width = original.width(),
            height = original.height(),
            landmarks = landmarks.is_some(),
            "Simulation created"
        );
        Ok(Simulation {
            original,
            landmarks,
            zones,
            procedures: ProcedureSet::new(),
            warper: MlsWarper::new(&settings.warp),
            warped: None,
            sculpt: SculptEngine::new(settings.sculpt.max_history),
            last_pointer: None,
            photo_generation: 0,
            max_image_dimension,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }

    pub fn original(&self) -> &RgbaImage {
        &self.original
    }

    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        self.landmarks.as_ref()
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn procedures(&self) -> &ProcedureSet {
        &self.procedures
    }

    pub fn photo_generation(&self) -> u64 {
        self.photo_generation
    }

    pub fn sculpt_state(&self) -> SculptState {
        self.sculpt.state()
    }

    pub fn sculpt(&self) -> &SculptEngine {
        &self.sculpt
    }

    /// Warp output, or the original when no geometry is active
    pub fn warped(&self) -> &RgbaImage {
        self.warped.as_ref().unwrap_or(&self.original)
    }

    /// Replace the photo. Sculpt state is discarded; procedures are kept
    /// and re-applied to the new photo.
    ///
    /// Returns the new photo generation. Landmarks detected for an earlier
    /// photo are refused by [`set_landmarks`](Self::set_landmarks) from here on.
    pub fn load_photo(&mut self, image: RgbaImage, landmarks: Option<LandmarkSet>) -> SimulationResult<u64> {
        check_dimensions(image.width(), image.height(), self.max_image_dimension)?;
        self.original = image;
        self.landmarks = landmarks;
        self.photo_generation += 1;
        self.sculpt.discard();
        self.last_pointer = None;
        self.rewarp();
        info!(
            width = self.original.width(),
            height = self.original.height(),
            landmarks = self.landmarks.is_some(),
            generation = self.photo_generation,
            "Photo loaded"
        );
        Ok(self.photo_generation)
    }

    /// Landmarks arrived after the photo (asynchronous detection).
    ///
    /// Returns `false` and changes nothing when `generation` names a photo
    /// that has since been replaced.
    pub fn set_landmarks(&mut self, generation: u64, landmarks: Option<LandmarkSet>) -> bool {
        if generation != self.photo_generation {
            debug!(
                generation = generation,
                current = self.photo_generation,
                "Discarding landmarks for a replaced photo"
            );
            return false;
        }
        self.landmarks = landmarks;
        self.rewarp();
        true
    }

    pub fn set_procedure(&mut self, zone_id: &str, procedure: Procedure) -> SimulationResult<()> {
        if self.zones.get(zone_id).is_none() {
            return Err(SimulationError::ZoneNotFound(zone_id.to_string()));
        }
        self.procedures.set(zone_id, procedure);
        self.rewarp();
        Ok(())
    }

    pub fn remove_procedure(&mut self, zone_id: &str) -> Option<Procedure> {
        let removed = self.procedures.remove(zone_id);
        if removed.is_some() {
            self.rewarp();
        }
        removed
    }

    /// Replace every assignment at once; rejected as a whole if any zone is
    /// unknown
    pub fn set_procedures(&mut self, procedures: ProcedureSet) -> SimulationResult<()> {
        if let Some((zone_id, _)) = procedures.iter().find(|(id, _)| self.zones.get(id).is_none()) {
            return Err(SimulationError::ZoneNotFound(zone_id.to_string()));
        }
        self.procedures = procedures;
        self.rewarp();
        Ok(())
    }

    pub fn clear_procedures(&mut self) {
        self.procedures.clear();
        self.rewarp();
    }

    #[instrument(skip(self), fields(procedures = self.procedures.len()))]
    fn rewarp(&mut self) {
        let (width, height) = self.original.dimensions();
        let controls = resolve(&self.procedures, &self.zones, self.landmarks.as_ref(), width, height);

        self.warped = match self.warper.warp_controls(&self.original, &controls) {
            Cow::Borrowed(_) => None,
            Cow::Owned(image) => Some(image),
        };

        if self.sculpt.is_active() {
            let base = self.warped().clone();
            self.sculpt.set_source(base);
        }
        debug!(pairs = controls.len(), identity = self.warped.is_none(), "Warp recomputed");
    }

    /// Start sculpting over the current warp result
    pub fn activate_sculpt(&mut self) -> SimulationResult<()> {
        let (width, height) = self.dimensions();
        let base = self.warped().clone();
        self.last_pointer = None;
        self.sculpt.activate(width, height, base)
    }

    pub fn deactivate_sculpt(&mut self) {
        self.last_pointer = None;
        self.sculpt.deactivate();
    }

    pub fn reset_sculpt(&mut self) {
        self.sculpt.reset();
    }

    /// Snapshot for undo and forget the previous pointer position
    pub fn begin_stroke(&mut self) {
        self.sculpt.save_to_history();
        self.last_pointer = None;
    }

    /// One brush dab; motion is measured from the previous dab of the
    /// current stroke
    pub fn brush(&mut self, x: f64, y: f64, tool: BrushTool, brush_size: f32, strength: f32) {
        let at = Point::new(x, y);
        let motion = self.last_pointer.map(|prev| at - prev).unwrap_or_default();
        self.sculpt.apply_brush(
            x as f32,
            y as f32,
            motion.x as f32,
            motion.y as f32,
            tool,
            brush_size,
            strength,
        );
        self.last_pointer = Some(at);
    }

    /// Apply a whole gesture as one undoable edit
    pub fn stroke(&mut self, stroke: &Stroke) {
        if stroke.points.is_empty() || !self.sculpt.is_active() {
            return;
        }
        self.begin_stroke();
        for point in &stroke.points {
            self.brush(point.x, point.y, stroke.tool, stroke.brush_size, stroke.strength);
        }
        self.last_pointer = None;
        debug!(tool = ?stroke.tool, points = stroke.points.len(), "Stroke applied");
    }

    pub fn undo(&mut self) -> bool {
        self.sculpt.undo()
    }

    /// Composite the current state into a new buffer
    #[instrument(skip(self))]
    pub fn render(&mut self) -> RgbaImage {
        let base = self.warped.as_ref().unwrap_or(&self.original);
        let sculpted = self.sculpt.composite(base);
        apply_skin_effects(&sculpted, &self.procedures, &self.zones).into_owned()
    }
}
