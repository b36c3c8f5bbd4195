//! Facial zone table
//!
//! Zones are static configuration: a built-in table covering the common
//! treatment areas, optionally replaced by a JSON file at startup.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::geometry::{Point, Rect};
use crate::landmarks::mesh;

/// Zone table errors
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("Duplicate zone id: {0}")]
    DuplicateId(String),
    #[error("Zone {0} has a non-positive radius")]
    InvalidRadius(String),
    #[error("Zone {id} references landmark {index} outside the face mesh")]
    InvalidLandmark { id: String, index: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a zone picks its warp anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    /// Anchors sampled on the zone ellipse
    #[default]
    Region,
    /// Anchors taken from named face-mesh landmarks inside the ellipse
    Landmark,
}

/// Point in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

/// Ellipse radii in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRadius {
    pub x: f64,
    pub y: f64,
}

/// A named facial region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialZone {
    pub id: String,
    pub name: String,
    pub center: NormalizedPoint,
    pub radius: NormalizedRadius,
    #[serde(default)]
    pub region: RegionType,
    /// Face-mesh indices outlining the zone (landmark-anchored zones only)
    #[serde(default)]
    pub landmarks: Vec<usize>,
}

impl FacialZone {
    /// Zone ellipse scaled into pixel space
    pub fn ellipse(&self, width: u32, height: u32) -> Ellipse {
        Ellipse {
            center: Point::new(self.center.x * width as f64, self.center.y * height as f64),
            rx: self.radius.x * width as f64,
            ry: self.radius.y * height as f64,
        }
    }
}

/// Axis-aligned ellipse in pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center: Point,
    pub rx: f64,
    pub ry: f64,
}

impl Ellipse {
    /// `1.0` on the boundary, `< 1.0` inside
    pub fn normalized_distance(&self, x: f64, y: f64) -> f64 {
        let nx = (x - self.center.x) / self.rx;
        let ny = (y - self.center.y) / self.ry;
        (nx * nx + ny * ny).sqrt()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.normalized_distance(x, y) <= 1.0
    }

    /// Point at `angle` (radians) on the ellipse scaled by `scale`
    pub fn boundary_point(&self, angle: f64, scale: f64) -> Point {
        Point::new(
            self.center.x + self.rx * scale * angle.cos(),
            self.center.y + self.ry * scale * angle.sin(),
        )
    }

    pub fn bounding_box(&self, scale: f64) -> Rect {
        Rect {
            min_x: self.center.x - self.rx * scale,
            min_y: self.center.y - self.ry * scale,
            max_x: self.center.x + self.rx * scale,
            max_y: self.center.y + self.ry * scale,
        }
    }
}

/// Read-only zone lookup, in declaration order
#[derive(Debug, Clone)]
pub struct ZoneTable {
    zones: Vec<FacialZone>,
    index: HashMap<String, usize>,
}

static BUILTIN_ZONES: Lazy<Vec<FacialZone>> = Lazy::new(|| {
    use RegionType::{Landmark, Region};

    let zone = |id: &str, name: &str, c: (f64, f64), r: (f64, f64), region, lm: &[usize]| FacialZone {
        id: id.to_string(),
        name: name.to_string(),
        center: NormalizedPoint { x: c.0, y: c.1 },
        radius: NormalizedRadius { x: r.0, y: r.1 },
        region,
        landmarks: lm.to_vec(),
    };

    vec![
        zone("forehead", "Forehead", (0.50, 0.22), (0.16, 0.06), Landmark, mesh::FOREHEAD),
        zone("glabella", "Glabella", (0.50, 0.31), (0.04, 0.03), Region, &[]),
        zone("crows_feet_left", "Crow's feet (left)", (0.31, 0.38), (0.04, 0.04), Region, &[]),
        zone("crows_feet_right", "Crow's feet (right)", (0.69, 0.38), (0.04, 0.04), Region, &[]),
        zone("under_eye_left", "Under-eye (left)", (0.38, 0.42), (0.06, 0.025), Landmark, mesh::UNDER_EYE_LEFT),
        zone("under_eye_right", "Under-eye (right)", (0.62, 0.42), (0.06, 0.025), Landmark, mesh::UNDER_EYE_RIGHT),
        zone("cheek_left", "Cheek (left)", (0.34, 0.50), (0.08, 0.07), Landmark, mesh::CHEEK_LEFT),
        zone("cheek_right", "Cheek (right)", (0.66, 0.50), (0.08, 0.07), Landmark, mesh::CHEEK_RIGHT),
        zone("nasolabial_left", "Nasolabial fold (left)", (0.41, 0.58), (0.035, 0.07), Landmark, mesh::NASOLABIAL_LEFT),
        zone("nasolabial_right", "Nasolabial fold (right)", (0.59, 0.58), (0.035, 0.07), Landmark, mesh::NASOLABIAL_RIGHT),
        zone("lips", "Lips", (0.50, 0.66), (0.08, 0.04), Landmark, mesh::LIPS_OUTER),
        zone("marionette_left", "Marionette line (left)", (0.42, 0.72), (0.03, 0.05), Region, &[]),
        zone("marionette_right", "Marionette line (right)", (0.58, 0.72), (0.03, 0.05), Region, &[]),
        zone("chin", "Chin", (0.50, 0.80), (0.07, 0.05), Landmark, mesh::CHIN),
        zone("jawline_left", "Jawline (left)", (0.32, 0.70), (0.05, 0.10), Landmark, mesh::JAWLINE_LEFT),
        zone("jawline_right", "Jawline (right)", (0.68, 0.70), (0.05, 0.10), Landmark, mesh::JAWLINE_RIGHT),
    ]
});

impl ZoneTable {
    /// Built-in table
    pub fn builtin() -> Self {
        // The built-in table is validated by tests
        Self::index_unchecked(BUILTIN_ZONES.clone())
    }

    /// Build a table, rejecting duplicate ids, degenerate radii and
    /// out-of-mesh landmark indices
    pub fn from_zones(zones: Vec<FacialZone>) -> Result<Self, ZoneError> {
        let mut seen = HashMap::with_capacity(zones.len());
        for zone in &zones {
            if seen.insert(zone.id.as_str(), ()).is_some() {
                return Err(ZoneError::DuplicateId(zone.id.clone()));
            }
            if !(zone.radius.x > 0.0 && zone.radius.y > 0.0) {
                return Err(ZoneError::InvalidRadius(zone.id.clone()));
            }
            if let Some(&index) = zone.landmarks.iter().find(|&&i| i >= mesh::FACE_MESH_POINTS) {
                return Err(ZoneError::InvalidLandmark { id: zone.id.clone(), index });
            }
        }
        Ok(Self::index_unchecked(zones))
    }

    /// Load a JSON array of zones
    pub fn load(path: &Path) -> Result<Self, ZoneError> {
        let content = std::fs::read_to_string(path)?;
        let zones: Vec<FacialZone> = serde_json::from_str(&content)?;
        let table = Self::from_zones(zones)?;
        info!(path = %path.display(), zones = table.len(), "Loaded zone table");
        Ok(table)
    }

    fn index_unchecked(zones: Vec<FacialZone>) -> Self {
        let index = zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.id.clone(), i))
            .collect();
        ZoneTable { zones, index }
    }

    pub fn get(&self, id: &str) -> Option<&FacialZone> {
        self.index.get(id).map(|&i| &self.zones[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacialZone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::builtin()
    }
}
