//! Brush sculpting over a persistent displacement field
//!
//! The displacement map stores one `(dx, dy)` pair per pixel in a single
//! contiguous buffer. Rendering reverse-samples the input at
//! `(x - dx, y - dy)`, so a positive offset moves content forward along it.

use std::borrow::Cow;
use std::collections::VecDeque;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::sampling::reverse_map;
use crate::error::SimulationError;

const PUSH_GAIN: f32 = 0.8;
const RADIAL_GAIN: f32 = 3.0;
const SMOOTH_RATE: f32 = 0.3;

/// Brush behaviours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushTool {
    /// Drag content along the pointer motion
    Push,
    /// Magnify around the brush center
    Inflate,
    /// Shrink toward the brush center
    Deflate,
    /// Relax existing displacement toward zero
    Smooth,
}

/// Smooth radial brush weight, zero at and beyond `radius`
pub fn brush_falloff(dist: f32, radius: f32) -> f32 {
    if radius <= 0.0 || dist >= radius {
        return 0.0;
    }
    let ratio = dist / radius;
    (-3.0 * ratio * ratio).exp() * (1.0 - ratio)
}

/// Dense per-pixel displacement field
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DisplacementMap {
    pub fn new(width: u32, height: u32) -> Self {
        DisplacementMap {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * 2],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 2
    }

    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        let i = self.index(x, y);
        (self.data[i], self.data[i + 1])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Fail when the map does not cover an image of the given size
    pub fn check_size(&self, width: u32, height: u32) -> Result<(), SimulationError> {
        if (self.width, self.height) == (width, height) {
            Ok(())
        } else {
            Err(SimulationError::DisplacementMapSizeMismatch {
                map_width: self.width,
                map_height: self.height,
                image_width: width,
                image_height: height,
            })
        }
    }
}

/// Reverse-sample `image` through a displacement map.
///
/// Pixels with zero displacement are copied verbatim.
pub fn apply_displacement(image: &RgbaImage, map: &DisplacementMap) -> RgbaImage {
    reverse_map(image, |x, y| {
        let (dx, dy) = map.get(x, y);
        if dx == 0.0 && dy == 0.0 {
            None
        } else {
            Some((x as f64 - dx as f64, y as f64 - dy as f64))
        }
    })
}

/// Editing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SculptState {
    Inactive,
    Active,
}

/// Owns the displacement map, its undo history and the image it deforms
pub struct SculptEngine {
    state: SculptState,
    map: Option<DisplacementMap>,
    history: VecDeque<Vec<f32>>,
    max_history: usize,
    source: Option<RgbaImage>,
}

impl SculptEngine {
    pub fn new(max_history: usize) -> Self {
        SculptEngine {
            state: SculptState::Inactive,
            map: None,
            history: VecDeque::with_capacity(max_history),
            max_history,
            source: None,
        }
    }

    pub fn state(&self) -> SculptState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SculptState::Active
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn displacement_map(&self) -> Option<&DisplacementMap> {
        self.map.as_ref()
    }

    /// Start an editing session over `source`.
    ///
    /// The map is zeroed (reusing the allocation when the size matches) and
    /// history is cleared, so edits from a previous session never carry over.
    pub fn activate(&mut self, width: u32, height: u32, source: RgbaImage) -> Result<(), SimulationError> {
        if source.dimensions() != (width, height) {
            return Err(SimulationError::InvalidImage(format!(
                "source is {}x{}, expected {}x{}",
                source.width(),
                source.height(),
                width,
                height
            )));
        }

        match self.map.as_mut() {
            Some(map) if map.dimensions() == (width, height) => map.clear(),
            _ => self.map = Some(DisplacementMap::new(width, height)),
        }
        self.history.clear();
        self.source = Some(source);
        self.state = SculptState::Active;

        info!(width = width, height = height, "Sculpt session activated");
        Ok(())
    }

    /// Leave editing mode; the map is kept
    pub fn deactivate(&mut self) {
        self.state = SculptState::Inactive;
        debug!("Sculpt session deactivated");
    }

    /// Discard all sculpting: zero the map and drop history
    pub fn reset(&mut self) {
        if let Some(map) = self.map.as_mut() {
            map.clear();
        }
        self.history.clear();
        debug!("Sculpt displacement reset");
    }

    /// Drop the map, history and source entirely (new photo)
    pub fn discard(&mut self) {
        self.map = None;
        self.history.clear();
        self.source = None;
        self.state = SculptState::Inactive;
    }

    /// Replace the image being sculpted (after a re-warp) without touching
    /// the displacement map
    pub fn set_source(&mut self, source: RgbaImage) {
        let (width, height) = source.dimensions();
        self.ensure_size(width, height);
        self.source = Some(source);
    }

    /// Reallocate on size mismatch. This is a caller bug: fatal in debug
    /// builds, recovered with a fresh map in release.
    fn ensure_size(&mut self, width: u32, height: u32) {
        let Some(map) = self.map.as_ref() else {
            return;
        };
        if let Err(e) = map.check_size(width, height) {
            debug_assert!(false, "{}", e);
            warn!(error = %e, "Reallocating displacement map");
            self.map = Some(DisplacementMap::new(width, height));
            self.history.clear();
        }
    }

    /// Snapshot the map; call once before each discrete stroke
    pub fn save_to_history(&mut self) {
        let Some(map) = self.map.as_ref() else {
            return;
        };
        self.history.push_back(map.data.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Restore the most recent snapshot; `false` when there is none
    pub fn undo(&mut self) -> bool {
        let (Some(map), Some(snapshot)) = (self.map.as_mut(), self.history.back()) else {
            return false;
        };
        if snapshot.len() != map.data.len() {
            self.history.clear();
            return false;
        }
        if let Some(snapshot) = self.history.pop_back() {
            map.data = snapshot;
        }
        true
    }

    /// Apply one brush dab centered at `(cx, cy)`.
    ///
    /// `(dx, dy)` is the pointer motion since the previous dab (used by
    /// `Push`). `strength` is clamped to `[0, 1]`. Only pixels strictly
    /// closer than `brush_size` to the center are modified. Ignored when
    /// the engine is inactive.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_brush(
        &mut self,
        cx: f32,
        cy: f32,
        dx: f32,
        dy: f32,
        tool: BrushTool,
        brush_size: f32,
        strength: f32,
    ) {
        if self.state != SculptState::Active {
            debug!("Brush ignored while sculpting is inactive");
            return;
        }
        let Some(map) = self.map.as_mut() else {
            return;
        };
        if !(brush_size > 0.0) || !cx.is_finite() || !cy.is_finite() {
            return;
        }
        let strength = if strength.is_finite() { strength.clamp(0.0, 1.0) } else { 0.0 };
        let (dx, dy) = if dx.is_finite() && dy.is_finite() { (dx, dy) } else { (0.0, 0.0) };

        let (width, height) = (map.width as i64, map.height as i64);
        let x_min = ((cx - brush_size).floor() as i64).max(0);
        let x_max = ((cx + brush_size).ceil() as i64).min(width - 1);
        let y_min = ((cy - brush_size).floor() as i64).max(0);
        let y_max = ((cy + brush_size).ceil() as i64).min(height - 1);

        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let rx = x as f32 - cx;
                let ry = y as f32 - cy;
                let dist = (rx * rx + ry * ry).sqrt();
                let falloff = brush_falloff(dist, brush_size) * strength;
                if falloff <= 0.0 {
                    continue;
                }

                let i = map.index(x as u32, y as u32);
                match tool {
                    BrushTool::Push => {
                        map.data[i] += dx * falloff * PUSH_GAIN;
                        map.data[i + 1] += dy * falloff * PUSH_GAIN;
                    }
                    BrushTool::Inflate | BrushTool::Deflate => {
                        if dist <= f32::EPSILON {
                            continue;
                        }
                        let sign = if tool == BrushTool::Inflate { 1.0 } else { -1.0 };
                        let scale = sign * falloff * RADIAL_GAIN / dist;
                        map.data[i] += rx * scale;
                        map.data[i + 1] += ry * scale;
                    }
                    BrushTool::Smooth => {
                        let keep = 1.0 - falloff * SMOOTH_RATE;
                        map.data[i] *= keep;
                        map.data[i + 1] *= keep;
                    }
                }
            }
        }
    }

    /// Render the sculpted source; `None` unless active
    #[instrument(skip(self))]
    pub fn render(&self) -> Option<RgbaImage> {
        if self.state != SculptState::Active {
            return None;
        }
        let (map, source) = (self.map.as_ref()?, self.source.as_ref()?);
        if map.check_size(source.width(), source.height()).is_err() {
            return None;
        }
        Some(apply_displacement(source, map))
    }

    /// Layer the current displacement over an arbitrary input.
    ///
    /// Used by compositing, which applies sculpt edits whether or not the
    /// engine is currently in editing mode. Returns the input borrowed when
    /// there is nothing to apply.
    pub fn composite<'a>(&mut self, input: &'a RgbaImage) -> Cow<'a, RgbaImage> {
        let (width, height) = input.dimensions();
        self.ensure_size(width, height);
        match self.map.as_ref() {
            Some(map) if !map.is_zero() => Cow::Owned(apply_displacement(input, map)),
            _ => Cow::Borrowed(input),
        }
    }
}

impl Default for SculptEngine {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const TOOLS: [BrushTool; 4] = [BrushTool::Push, BrushTool::Inflate, BrushTool::Deflate, BrushTool::Smooth];

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 3) as u8, (y * 3) as u8, 90, 255]))
    }

    fn active_engine(size: u32) -> SculptEngine {
        let mut engine = SculptEngine::new(30);
        engine.activate(size, size, gradient(size, size)).unwrap();
        engine
    }

    #[test]
    fn test_falloff_shape() {
        assert_eq!(brush_falloff(0.0, 10.0), 1.0);
        assert_eq!(brush_falloff(10.0, 10.0), 0.0);
        assert_eq!(brush_falloff(12.0, 10.0), 0.0);
        assert!(brush_falloff(2.0, 10.0) > brush_falloff(5.0, 10.0));
        assert_eq!(brush_falloff(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_activate_zeroes_and_reuses() {
        let mut engine = active_engine(32);
        engine.apply_brush(16.0, 16.0, 4.0, 0.0, BrushTool::Push, 8.0, 1.0);
        engine.save_to_history();
        assert!(!engine.displacement_map().unwrap().is_zero());

        engine.deactivate();
        assert!(!engine.displacement_map().unwrap().is_zero());

        engine.activate(32, 32, gradient(32, 32)).unwrap();
        assert!(engine.displacement_map().unwrap().is_zero());
        assert_eq!(engine.history_len(), 0);
    }

    #[test]
    fn test_activate_rejects_wrong_source_size() {
        let mut engine = SculptEngine::new(30);
        assert!(engine.activate(10, 10, gradient(8, 8)).is_err());
        assert!(!engine.is_active());
    }

    #[test]
    fn test_brush_locality() {
        for tool in TOOLS {
            let mut engine = active_engine(64);
            // Seed a non-zero field so Smooth has something to relax
            engine.apply_brush(30.0, 30.0, 3.0, -2.0, BrushTool::Push, 40.0, 1.0);
            let before = engine.displacement_map().unwrap().clone();

            let (cx, cy, radius) = (32.0f32, 28.0f32, 9.5f32);
            engine.apply_brush(cx, cy, 2.0, 1.0, tool, radius, 0.8);
            let after = engine.displacement_map().unwrap();

            for y in 0..64u32 {
                for x in 0..64u32 {
                    let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                    if dist >= radius {
                        assert_eq!(after.get(x, y), before.get(x, y), "{:?} at ({}, {})", tool, x, y);
                    }
                }
            }
            assert_ne!(*after, before, "{:?} changed nothing", tool);
        }
    }

    #[test]
    fn test_tool_directions() {
        let mut engine = active_engine(64);
        engine.apply_brush(32.0, 32.0, 5.0, 0.0, BrushTool::Push, 10.0, 1.0);
        let (dx, dy) = engine.displacement_map().unwrap().get(32, 32);
        assert!((dx - 4.0).abs() < 1e-5);
        assert_eq!(dy, 0.0);

        engine.reset();
        engine.apply_brush(32.0, 32.0, 0.0, 0.0, BrushTool::Inflate, 10.0, 1.0);
        let (dx, _) = engine.displacement_map().unwrap().get(36, 32);
        assert!(dx > 0.0);
        assert_eq!(engine.displacement_map().unwrap().get(32, 32), (0.0, 0.0));

        engine.reset();
        engine.apply_brush(32.0, 32.0, 0.0, 0.0, BrushTool::Deflate, 10.0, 1.0);
        let (dx, _) = engine.displacement_map().unwrap().get(36, 32);
        assert!(dx < 0.0);
    }

    #[test]
    fn test_smooth_relaxes_toward_zero() {
        let mut engine = active_engine(64);
        engine.apply_brush(32.0, 32.0, 5.0, 5.0, BrushTool::Push, 20.0, 1.0);
        let (before, _) = engine.displacement_map().unwrap().get(33, 32);
        engine.apply_brush(32.0, 32.0, 0.0, 0.0, BrushTool::Smooth, 20.0, 1.0);
        let (after, _) = engine.displacement_map().unwrap().get(33, 32);
        assert!(after.abs() < before.abs());
        assert!(after.signum() == before.signum());
    }

    #[test]
    fn test_undo_restores_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut engine = active_engine(48);

        for _ in 0..20 {
            let tool = TOOLS[rng.gen_range(0..TOOLS.len())];
            let cx = rng.gen_range(-5.0..53.0);
            let cy = rng.gen_range(-5.0..53.0);
            let size = rng.gen_range(1.0..20.0);

            let before = engine.displacement_map().unwrap().clone();
            engine.save_to_history();
            engine.apply_brush(cx, cy, rng.gen_range(-4.0..4.0), rng.gen_range(-4.0..4.0), tool, size, rng.gen());
            assert!(engine.undo());
            assert_eq!(engine.displacement_map().unwrap().as_slice(), before.as_slice());

            // Leave the stroke applied for the next round
            engine.apply_brush(cx, cy, 1.0, 1.0, tool, size, 0.5);
        }
    }

    #[test]
    fn test_undo_empty_is_noop() {
        let mut engine = active_engine(16);
        assert!(!engine.undo());
        let mut inactive = SculptEngine::new(30);
        assert!(!inactive.undo());
    }

    #[test]
    fn test_history_bounded() {
        let mut engine = SculptEngine::new(30);
        engine.activate(8, 8, gradient(8, 8)).unwrap();
        for _ in 0..engine.max_history() + 5 {
            engine.save_to_history();
            assert!(engine.history_len() <= engine.max_history());
        }
        assert_eq!(engine.history_len(), 30);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut engine = SculptEngine::new(2);
        engine.activate(16, 16, gradient(16, 16)).unwrap();
        for i in 0..3 {
            engine.save_to_history();
            engine.apply_brush(8.0, 8.0, 1.0 + i as f32, 0.0, BrushTool::Push, 4.0, 1.0);
        }
        assert!(engine.undo());
        assert!(engine.undo());
        assert!(!engine.undo());
        // The zero snapshot was evicted
        assert!(!engine.displacement_map().unwrap().is_zero());
    }

    #[test]
    fn test_render_requires_activation() {
        let engine = SculptEngine::new(30);
        assert!(engine.render().is_none());

        let mut engine = active_engine(32);
        assert_eq!(engine.render().unwrap(), gradient(32, 32));

        engine.deactivate();
        assert!(engine.render().is_none());
    }

    #[test]
    fn test_render_samples_displaced_source() {
        let mut engine = active_engine(64);
        engine.apply_brush(32.0, 32.0, 5.0, 0.0, BrushTool::Push, 10.0, 1.0);
        let rendered = engine.render().unwrap();
        let source = gradient(64, 64);
        // dx = 4 at the center: pixel (32, 32) shows source (28, 32)
        assert_eq!(rendered.get_pixel(32, 32), source.get_pixel(28, 32));
        assert_eq!(rendered.get_pixel(0, 0), source.get_pixel(0, 0));
    }

    #[test]
    fn test_set_source_keeps_displacement() {
        let mut engine = active_engine(32);
        engine.apply_brush(16.0, 16.0, 3.0, 0.0, BrushTool::Push, 6.0, 1.0);
        let map = engine.displacement_map().unwrap().clone();
        engine.set_source(RgbaImage::from_pixel(32, 32, Rgba([1, 2, 3, 255])));
        assert_eq!(engine.displacement_map().unwrap(), &map);
    }

    #[test]
    fn test_composite_borrowed_when_zero() {
        let mut engine = active_engine(16);
        let input = gradient(16, 16);
        assert!(matches!(engine.composite(&input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_check_size() {
        let map = DisplacementMap::new(4, 3);
        assert!(map.check_size(4, 3).is_ok());
        assert!(matches!(
            map.check_size(3, 4),
            Err(SimulationError::DisplacementMapSizeMismatch { map_width: 4, .. })
        ));
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_size_mismatch_reallocates_in_release() {
        let mut engine = active_engine(16);
        engine.apply_brush(8.0, 8.0, 3.0, 0.0, BrushTool::Push, 4.0, 1.0);
        engine.save_to_history();
        engine.set_source(gradient(20, 10));
        assert_eq!(engine.displacement_map().unwrap().dimensions(), (20, 10));
        assert!(engine.displacement_map().unwrap().is_zero());
        assert_eq!(engine.history_len(), 0);
    }
}
