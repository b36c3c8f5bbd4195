//! Validated, immutable landmark sets

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::mesh::FACE_MESH_POINTS;
use super::LandmarkError;
use crate::domain::Point;

/// A single landmark in normalized image coordinates.
///
/// `z` is carried through from detectors that provide depth but is never
/// used geometrically.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Landmark { x, y, z: 0.0 }
    }
}

/// Fixed-length face mesh produced once per photo.
///
/// Cloning is cheap; every clone shares the same read-only points.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Arc<[Landmark]>,
}

impl LandmarkSet {
    /// Validate raw detector output.
    ///
    /// The point count must match the mesh exactly and every coordinate must
    /// be finite. Coordinates that drift slightly outside the frame are
    /// clamped into `[0, 1]`.
    pub fn new(points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() != FACE_MESH_POINTS {
            return Err(LandmarkError::InvalidPointCount {
                expected: FACE_MESH_POINTS,
                got: points.len(),
            });
        }

        if let Some(index) = points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(LandmarkError::NonFiniteCoordinate(index));
        }

        let points: Vec<Landmark> = points
            .into_iter()
            .map(|p| Landmark {
                x: p.x.clamp(0.0, 1.0),
                y: p.y.clamp(0.0, 1.0),
                z: if p.z.is_finite() { p.z } else { 0.0 },
            })
            .collect();

        Ok(LandmarkSet { points: points.into() })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.points.iter()
    }

    /// Landmark `index` scaled into pixel space
    pub fn to_pixel(&self, index: usize, width: u32, height: u32) -> Option<Point> {
        self.get(index).map(|l| {
            Point::new(l.x as f64 * width as f64, l.y as f64 * height as f64)
        })
    }
}
