//! Face simulation engine
//!
//! - Warp strategy resolution from procedures to control points
//! - Moving-least-squares image warping
//! - Brush sculpting over a persistent displacement map
//! - Skin finish and final compositing

pub mod mls;
pub mod resolver;
pub mod sampling;
pub mod sculpt;
pub mod simulation;
pub mod skin;

pub use mls::{DeformationGrid, MlsWarper};
pub use resolver::{resolve, resolve_zone, WarpStrategy};
pub use sculpt::{apply_displacement, BrushTool, DisplacementMap, SculptEngine, SculptState};
pub use simulation::{check_dimensions, Simulation, Stroke};
pub use skin::apply_skin_effects;
