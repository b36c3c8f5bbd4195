//! Moving Least Squares image warping
//!
//! Reverse-mapped MLS deformation (Schaefer et al. 2006). For each
//! destination pixel `v` a locally weighted similarity (or rigid) transform
//! is fitted from the destination control points `to` back to the source
//! points `from`, with weights `1 / |v - to_i|^alpha`. The fitted transform
//! passes exactly through every control pair.
//!
//! The transform is solved on a coarse grid and bilinearly interpolated
//! inside each cell. Deformation is confined to the control points'
//! bounding box plus a taper band, so pixels outside it are copied
//! untouched.

use std::borrow::Cow;

use image::RgbaImage;
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use super::sampling::reverse_map;
use crate::config::{WarpMode, WarpSettings};
use crate::domain::{ControlPoints, Point, Rect};

/// Squared distance under which a pixel is treated as sitting on a control point
const SNAP_EPSILON: f64 = 1e-10;

/// Stateless MLS warp engine
#[derive(Debug, Clone)]
pub struct MlsWarper {
    alpha: f64,
    cell: u32,
    mode: WarpMode,
    min_support: f64,
}

impl MlsWarper {
    pub fn new(settings: &WarpSettings) -> Self {
        if settings.grid_cell_size == 0 || !(settings.alpha > 0.0) {
            warn!(
                grid_cell_size = settings.grid_cell_size,
                alpha = settings.alpha,
                "Invalid warp tuning, falling back to sane minimums"
            );
        }
        MlsWarper {
            alpha: if settings.alpha > 0.0 { settings.alpha } else { 2.0 },
            cell: settings.grid_cell_size.max(1),
            mode: settings.mode,
            min_support: settings.min_support.max(1.0),
        }
    }

    pub fn grid_cell_size(&self) -> u32 {
        self.cell
    }

    /// Warp `image` so that content at `from[i]` lands on `to[i]`.
    ///
    /// Empty control sets return the input borrowed, without allocating.
    /// Extra points in the longer slice are ignored.
    pub fn warp<'a>(&self, image: &'a RgbaImage, from: &[Point], to: &[Point]) -> Cow<'a, RgbaImage> {
        if from.len() != to.len() {
            warn!(from = from.len(), to = to.len(), "Control point arrays differ in length, truncating");
        }
        let n = from.len().min(to.len());
        let controls = ControlPoints {
            from: from[..n].to_vec(),
            to: to[..n].to_vec(),
        };
        self.warp_controls(image, &controls)
    }

    #[instrument(skip(self, image, controls), fields(pairs = controls.len()))]
    pub fn warp_controls<'a>(&self, image: &'a RgbaImage, controls: &ControlPoints) -> Cow<'a, RgbaImage> {
        let (width, height) = image.dimensions();
        if controls.is_empty() || width == 0 || height == 0 {
            return Cow::Borrowed(image);
        }

        let field = self.deformation(width, height, controls);
        debug!(
            width = width,
            height = height,
            cell = self.cell,
            support = ?field.support.rect,
            "Rendering MLS warp"
        );

        Cow::Owned(reverse_map(image, |x, y| field.source_of(x, y)))
    }

    /// Solve the deformation grid for an image of the given size
    pub fn deformation(&self, width: u32, height: u32, controls: &ControlPoints) -> DeformationGrid {
        let solver = MlsSolver {
            p: &controls.to,
            q: &controls.from,
            alpha: self.alpha,
            mode: self.mode,
        };
        let support = Support::around(controls, self.min_support);
        DeformationGrid::solve(width, height, self.cell, &solver, support)
    }
}

impl Default for MlsWarper {
    fn default() -> Self {
        Self::new(&WarpSettings::default())
    }
}

/// Region the warp may touch: control bounding box + taper band
#[derive(Debug, Clone, Copy)]
struct Support {
    rect: Rect,
    band: f64,
}

impl Support {
    fn around(controls: &ControlPoints, min_support: f64) -> Support {
        let band = min_support.max(2.0 * controls.max_displacement());
        let rect = Rect::bounding(controls.from.iter().chain(controls.to.iter()))
            .unwrap_or(Rect { min_x: 0.0, min_y: 0.0, max_x: 0.0, max_y: 0.0 })
            .expand(band);
        Support { rect, band }
    }

    /// 1 inside the core, smoothly down to 0 at the outer edge
    fn taper(&self, x: f64, y: f64) -> f64 {
        let t = (self.rect.inset_distance(x, y) / self.band).min(1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

/// Weighted least-squares fit from destination points `p` to source points `q`
struct MlsSolver<'a> {
    p: &'a [Point],
    q: &'a [Point],
    alpha: f64,
    mode: WarpMode,
}

impl MlsSolver<'_> {
    /// Source location for destination point `v`
    fn source_of(&self, v: Point) -> Point {
        let mut weights = Vec::with_capacity(self.p.len());
        let mut w_sum = 0.0;
        let mut p_star = Point::default();
        let mut q_star = Point::default();

        for (p, q) in self.p.iter().zip(self.q) {
            let d2 = p.distance_squared(&v);
            if d2 < SNAP_EPSILON {
                return *q;
            }
            let w = 1.0 / d2.powf(self.alpha / 2.0);
            weights.push(w);
            w_sum += w;
            p_star = p_star + *p * w;
            q_star = q_star + *q * w;
        }

        p_star = p_star * (1.0 / w_sum);
        q_star = q_star * (1.0 / w_sum);

        // Similarity fit as a complex ratio: q̂ ≈ (a + ib) p̂
        let mut mu = 0.0;
        let mut a = 0.0;
        let mut b = 0.0;
        for ((p, q), w) in self.p.iter().zip(self.q).zip(&weights) {
            let ph = *p - p_star;
            let qh = *q - q_star;
            mu += w * (ph.x * ph.x + ph.y * ph.y);
            a += w * (ph.x * qh.x + ph.y * qh.y);
            b += w * (ph.x * qh.y - ph.y * qh.x);
        }

        let u = v - p_star;
        if mu < 1e-12 {
            return u + q_star;
        }

        let (mut a, mut b) = (a / mu, b / mu);
        if self.mode == WarpMode::Rigid {
            let norm = (a * a + b * b).sqrt();
            (a, b) = if norm > 1e-12 { (a / norm, b / norm) } else { (1.0, 0.0) };
        }

        Point::new(a * u.x - b * u.y + q_star.x, b * u.x + a * u.y + q_star.y)
    }
}

/// Per-node source offsets on a coarse grid
pub struct DeformationGrid {
    width: u32,
    height: u32,
    cell: u32,
    cols: usize,
    rows: usize,
    /// Row-major `(dx, dy)` where source = node + offset
    offsets: Vec<(f64, f64)>,
    support: Support,
}

impl DeformationGrid {
    fn node_count(extent: u32, cell: u32) -> usize {
        if extent <= 1 {
            1
        } else {
            ((extent - 1) as usize).div_ceil(cell as usize) + 1
        }
    }

    fn node_coord(index: usize, cell: u32, extent: u32) -> u32 {
        ((index as u64 * cell as u64).min(extent.saturating_sub(1) as u64)) as u32
    }

    fn solve(width: u32, height: u32, cell: u32, solver: &MlsSolver<'_>, support: Support) -> Self {
        let cols = Self::node_count(width, cell);
        let rows = Self::node_count(height, cell);

        let offsets: Vec<(f64, f64)> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                let ny = Self::node_coord(row, cell, height) as f64;
                (0..cols).map(move |col| {
                    let nx = Self::node_coord(col, cell, width) as f64;
                    let taper = support.taper(nx, ny);
                    if taper <= 0.0 {
                        return (0.0, 0.0);
                    }
                    let src = solver.source_of(Point::new(nx, ny));
                    ((src.x - nx) * taper, (src.y - ny) * taper)
                })
            })
            .collect();

        DeformationGrid { width, height, cell, cols, rows, offsets, support }
    }

    fn offset_at(&self, col: usize, row: usize) -> (f64, f64) {
        self.offsets[row * self.cols + col]
    }

    /// Locate `coord` within the node lattice: (lower node, fraction)
    fn locate(&self, coord: u32, nodes: usize, extent: u32) -> (usize, usize, f64) {
        if nodes < 2 {
            return (0, 0, 0.0);
        }
        let i = ((coord / self.cell) as usize).min(nodes - 2);
        let c0 = Self::node_coord(i, self.cell, extent);
        let c1 = Self::node_coord(i + 1, self.cell, extent);
        let t = if c1 > c0 {
            (coord - c0) as f64 / (c1 - c0) as f64
        } else {
            0.0
        };
        (i, i + 1, t)
    }

    /// Interpolated source offset at pixel `(x, y)`; zero outside the support
    pub fn offset(&self, x: u32, y: u32) -> (f64, f64) {
        if !self.support.rect.contains(x as f64, y as f64) {
            return (0.0, 0.0);
        }

        let (c0, c1, tx) = self.locate(x, self.cols, self.width);
        let (r0, r1, ty) = self.locate(y, self.rows, self.height);

        let o00 = self.offset_at(c0, r0);
        let o10 = self.offset_at(c1, r0);
        let o01 = self.offset_at(c0, r1);
        let o11 = self.offset_at(c1, r1);

        let lerp = |a: f64, b: f64, c: f64, d: f64| {
            a * (1.0 - tx) * (1.0 - ty) + b * tx * (1.0 - ty) + c * (1.0 - tx) * ty + d * tx * ty
        };

        (
            lerp(o00.0, o10.0, o01.0, o11.0),
            lerp(o00.1, o10.1, o01.1, o11.1),
        )
    }

    /// Source coordinate for destination pixel, `None` when untouched
    pub fn source_of(&self, x: u32, y: u32) -> Option<(f64, f64)> {
        let (dx, dy) = self.offset(x, y);
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        Some((x as f64 + dx, y as f64 + dy))
    }

    /// Pixel-space box outside which the warp is identity
    pub fn support_rect(&self) -> Rect {
        self.support.rect
    }
}
