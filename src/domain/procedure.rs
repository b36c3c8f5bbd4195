//! Procedures assigned to facial zones

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Treatment applied to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureType {
    /// Dermal filler: adds volume
    Filler,
    /// Neurotoxin: relaxes and flattens
    Botox,
    /// Thread lift: raises tissue
    ThreadLift,
    /// Contouring: slims toward the zone axis
    Contouring,
    /// Skin quality treatment: no geometric change
    Skinbooster,
}

impl std::fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcedureType::Filler => write!(f, "filler"),
            ProcedureType::Botox => write!(f, "botox"),
            ProcedureType::ThreadLift => write!(f, "thread_lift"),
            ProcedureType::Contouring => write!(f, "contouring"),
            ProcedureType::Skinbooster => write!(f, "skinbooster"),
        }
    }
}

/// Post-process skin parameters at full intensity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinProfile {
    /// Gaussian blur sigma in pixels
    pub blur_sigma: f32,
    /// Blend factor of the blurred layer (0..1)
    pub smoothing: f32,
    /// Additive brightness in 8-bit levels
    pub brightness: f32,
}

impl ProcedureType {
    /// Skin finish associated with the procedure, if any
    pub fn skin_profile(&self) -> Option<SkinProfile> {
        match self {
            ProcedureType::Skinbooster => Some(SkinProfile {
                blur_sigma: 2.5,
                smoothing: 0.6,
                brightness: 12.0,
            }),
            ProcedureType::Botox => Some(SkinProfile {
                blur_sigma: 1.5,
                smoothing: 0.35,
                brightness: 0.0,
            }),
            ProcedureType::Filler => Some(SkinProfile {
                blur_sigma: 1.0,
                smoothing: 0.15,
                brightness: 5.0,
            }),
            ProcedureType::ThreadLift | ProcedureType::Contouring => None,
        }
    }
}

/// Procedure strength in `[0, 100]`.
///
/// Out-of-range input is clamped, never rejected; non-finite input becomes 0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Intensity(f64);

impl Intensity {
    pub const MAX: f64 = 100.0;

    pub fn new(raw: f64) -> Self {
        if !raw.is_finite() {
            warn!(raw = raw, "Non-finite procedure intensity, using 0");
            return Intensity(0.0);
        }
        let clamped = raw.clamp(0.0, Self::MAX);
        if clamped != raw {
            warn!(raw = raw, clamped = clamped, "Procedure intensity out of range, clamped");
        }
        Intensity(clamped)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Intensity as a `[0, 1]` factor
    pub fn fraction(&self) -> f64 {
        self.0 / Self::MAX
    }
}

impl<'de> Deserialize<'de> for Intensity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Intensity::new)
    }
}

/// Product metadata; informational only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    /// Units (toxins) or millilitres (fillers)
    #[serde(default)]
    pub amount: Option<f64>,
}

/// A procedure assigned to one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(rename = "type")]
    pub kind: ProcedureType,
    pub intensity: Intensity,
    #[serde(default)]
    pub product: Option<ProductInfo>,
}

impl Procedure {
    pub fn new(kind: ProcedureType, intensity: f64) -> Self {
        Procedure {
            kind,
            intensity: Intensity::new(intensity),
            product: None,
        }
    }

    pub fn with_product(mut self, product: ProductInfo) -> Self {
        self.product = Some(product);
        self
    }

    pub fn is_active(&self) -> bool {
        self.intensity.value() > 0.0
    }
}

/// Zone id → procedure assignments, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureSet {
    entries: Vec<(String, Procedure)>,
}

impl ProcedureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign or replace the procedure for a zone
    pub fn set(&mut self, zone_id: impl Into<String>, procedure: Procedure) {
        let zone_id = zone_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == zone_id) {
            Some(entry) => entry.1 = procedure,
            None => self.entries.push((zone_id, procedure)),
        }
    }

    pub fn remove(&mut self, zone_id: &str) -> Option<Procedure> {
        let pos = self.entries.iter().position(|(id, _)| id == zone_id)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, zone_id: &str) -> Option<&Procedure> {
        self.entries
            .iter()
            .find(|(id, _)| id == zone_id)
            .map(|(_, p)| p)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Procedure)> {
        self.entries.iter().map(|(id, p)| (id.as_str(), p))
    }

    /// Procedures with non-zero intensity
    pub fn active(&self) -> impl Iterator<Item = (&str, &Procedure)> {
        self.iter().filter(|(_, p)| p.is_active())
    }
}

impl FromIterator<(String, Procedure)> for ProcedureSet {
    fn from_iter<I: IntoIterator<Item = (String, Procedure)>>(iter: I) -> Self {
        let mut set = ProcedureSet::new();
        for (zone_id, procedure) in iter {
            set.set(zone_id, procedure);
        }
        set
    }
}
