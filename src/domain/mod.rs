//! Domain types and models

mod geometry;
mod procedure;
mod zone;

pub use geometry::{ControlPoints, Point, Rect};
pub use procedure::{Intensity, Procedure, ProcedureSet, ProcedureType, ProductInfo, SkinProfile};
pub use zone::{
    Ellipse, FacialZone, NormalizedPoint, NormalizedRadius, RegionType, ZoneError, ZoneTable,
};
