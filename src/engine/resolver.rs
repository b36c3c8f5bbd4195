//! Warp strategy resolution
//!
//! Turns active procedures into MLS control pairs. Each zone contributes a
//! bounded set of pairs:
//! - one centroid anchor
//! - up to [`MAX_LANDMARK_ANCHORS`] landmark anchors, or [`RING_SAMPLES`]
//!   ellipse samples when the zone is elliptical or landmarks are missing
//! - [`RING_SAMPLES`] stationary pins on an outer ring that keep the
//!   deformation local to the zone

use std::f64::consts::TAU;

use tracing::{debug, warn};

use crate::domain::{ControlPoints, Ellipse, FacialZone, Point, Procedure, ProcedureSet, ProcedureType, RegionType, ZoneTable};
use crate::landmarks::LandmarkSet;

pub const RING_SAMPLES: usize = 8;
pub const MAX_LANDMARK_ANCHORS: usize = 12;
/// Landmark-anchored zones with fewer in-zone landmarks use the ellipse
pub const MIN_LANDMARK_ANCHORS: usize = 3;
/// Pin ring radius relative to the zone ellipse
pub const PIN_RING_SCALE: f64 = 1.25;

const VOLUMIZE_GAIN: f64 = 0.12;
const FLATTEN_GAIN: f64 = 0.10;
const LIFT_GAIN: f64 = 0.10;
const SLIM_GAIN: f64 = 0.10;

/// Geometric deformation family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpStrategy {
    /// Push anchors radially away from the centroid
    Volumize,
    /// Pull anchors toward the centroid
    Flatten,
    /// Raise anchors, lower ones more than upper ones
    Lift,
    /// Pull anchors horizontally toward the centroid
    Slim,
}

impl WarpStrategy {
    /// Strategy for a procedure type; `None` for skin-only treatments
    pub fn for_procedure(kind: ProcedureType) -> Option<WarpStrategy> {
        match kind {
            ProcedureType::Filler => Some(WarpStrategy::Volumize),
            ProcedureType::Botox => Some(WarpStrategy::Flatten),
            ProcedureType::ThreadLift => Some(WarpStrategy::Lift),
            ProcedureType::Contouring => Some(WarpStrategy::Slim),
            ProcedureType::Skinbooster => None,
        }
    }

    /// Destination of `anchor` at intensity fraction `t`
    pub fn displace(&self, anchor: Point, centroid: Point, ellipse: &Ellipse, t: f64) -> Point {
        match self {
            WarpStrategy::Volumize => anchor + (anchor - centroid) * (VOLUMIZE_GAIN * t),
            WarpStrategy::Flatten => centroid + (anchor - centroid) * (1.0 - FLATTEN_GAIN * t),
            WarpStrategy::Lift => {
                let relative = ((anchor.y - centroid.y) / ellipse.ry).clamp(-1.0, 1.0);
                let weight = 0.5 + 0.5 * relative;
                Point::new(anchor.x, anchor.y - LIFT_GAIN * t * ellipse.ry * weight)
            }
            WarpStrategy::Slim => Point::new(
                centroid.x + (anchor.x - centroid.x) * (1.0 - SLIM_GAIN * t),
                anchor.y,
            ),
        }
    }
}

/// Where a zone's anchors come from
#[derive(Debug, Clone, PartialEq)]
enum Anchors {
    Ellipse,
    Landmarks(Vec<Point>),
}

/// Resolve every active procedure into control pairs for a
/// `width` x `height` image.
///
/// With `landmarks = None` every zone falls back to ellipse anchors.
pub fn resolve(
    procedures: &ProcedureSet,
    zones: &ZoneTable,
    landmarks: Option<&LandmarkSet>,
    width: u32,
    height: u32,
) -> ControlPoints {
    let mut controls = ControlPoints::new();

    for (zone_id, procedure) in procedures.active() {
        let Some(zone) = zones.get(zone_id) else {
            warn!(zone_id = %zone_id, "Procedure assigned to unknown zone, skipping");
            continue;
        };
        controls.extend(resolve_zone(zone, procedure, landmarks, width, height));
    }

    debug!(
        procedures = procedures.len(),
        pairs = controls.len(),
        landmarks = landmarks.is_some(),
        "Resolved warp control points"
    );

    controls
}

/// Control pairs for a single zone
pub fn resolve_zone(
    zone: &FacialZone,
    procedure: &Procedure,
    landmarks: Option<&LandmarkSet>,
    width: u32,
    height: u32,
) -> ControlPoints {
    let t = procedure.intensity.fraction();
    let Some(strategy) = WarpStrategy::for_procedure(procedure.kind) else {
        return ControlPoints::new();
    };
    if t <= 0.0 {
        return ControlPoints::new();
    }

    let ellipse = zone.ellipse(width, height);
    let anchors = select_anchors(zone, &ellipse, landmarks, width, height);

    let mut controls = ControlPoints::with_capacity(1 + MAX_LANDMARK_ANCHORS + RING_SAMPLES);

    let (centroid, points) = match anchors {
        Anchors::Ellipse => {
            let points = (0..RING_SAMPLES)
                .map(|i| ellipse.boundary_point(TAU * i as f64 / RING_SAMPLES as f64, 1.0))
                .collect::<Vec<_>>();
            (ellipse.center, points)
        }
        Anchors::Landmarks(points) => {
            let n = points.len() as f64;
            let sum = points.iter().fold(Point::default(), |acc, p| acc + *p);
            (sum * (1.0 / n), points)
        }
    };

    controls.push(centroid, strategy.displace(centroid, centroid, &ellipse, t));
    for anchor in points {
        controls.push(anchor, strategy.displace(anchor, centroid, &ellipse, t));
    }
    for i in 0..RING_SAMPLES {
        let angle = TAU * (i as f64 + 0.5) / RING_SAMPLES as f64;
        controls.pin(ellipse.boundary_point(angle, PIN_RING_SCALE));
    }

    controls
}

fn select_anchors(
    zone: &FacialZone,
    ellipse: &Ellipse,
    landmarks: Option<&LandmarkSet>,
    width: u32,
    height: u32,
) -> Anchors {
    if zone.region != RegionType::Landmark {
        return Anchors::Ellipse;
    }
    let Some(landmarks) = landmarks else {
        debug!(zone = %zone.id, "No landmarks, using zone geometry");
        return Anchors::Ellipse;
    };

    let inside: Vec<Point> = zone
        .landmarks
        .iter()
        .filter_map(|&i| landmarks.to_pixel(i, width, height))
        .filter(|p| ellipse.contains(p.x, p.y))
        .collect();

    if inside.len() < MIN_LANDMARK_ANCHORS {
        debug!(
            zone = %zone.id,
            found = inside.len(),
            "Too few landmarks inside zone, using zone geometry"
        );
        return Anchors::Ellipse;
    }

    // Evenly thin out long outlines
    let stride = inside.len().div_ceil(MAX_LANDMARK_ANCHORS);
    Anchors::Landmarks(inside.into_iter().step_by(stride).collect())
}
