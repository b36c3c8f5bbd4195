//! Pixel-space geometry shared by the resolver and the warp engine

use serde::{Deserialize, Serialize};

/// A point in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle in pixel space (inclusive min, exclusive max)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    /// Smallest rectangle covering every point, or `None` for an empty input
    pub fn bounding<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Rect> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            rect.min_x = rect.min_x.min(p.x);
            rect.min_y = rect.min_y.min(p.y);
            rect.max_x = rect.max_x.max(p.x);
            rect.max_y = rect.max_y.max(p.y);
        }
        Some(rect)
    }

    pub fn expand(&self, margin: f64) -> Rect {
        Rect {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Distance from an interior point to the nearest edge (0 outside)
    pub fn inset_distance(&self, x: f64, y: f64) -> f64 {
        if !self.contains(x, y) {
            return 0.0;
        }
        (x - self.min_x)
            .min(self.max_x - x)
            .min(y - self.min_y)
            .min(self.max_y - y)
    }
}

/// Paired source/destination control points driving a warp.
///
/// `from[i]` is where content is taken from, `to[i]` is where it lands.
/// Both vectors always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPoints {
    pub from: Vec<Point>,
    pub to: Vec<Point>,
}

impl ControlPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ControlPoints {
            from: Vec::with_capacity(capacity),
            to: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, from: Point, to: Point) {
        self.from.push(from);
        self.to.push(to);
    }

    /// Stationary pair: pins content in place
    pub fn pin(&mut self, at: Point) {
        self.push(at, at);
    }

    pub fn extend(&mut self, other: ControlPoints) {
        self.from.extend(other.from);
        self.to.extend(other.to);
    }

    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Point, &Point)> {
        self.from.iter().zip(self.to.iter())
    }

    /// Largest distance any pair moves content
    pub fn max_displacement(&self) -> f64 {
        self.pairs()
            .map(|(from, to)| from.distance(to))
            .fold(0.0, f64::max)
    }
}
