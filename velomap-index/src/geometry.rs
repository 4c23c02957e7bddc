//! Fixed-point points and rectangles.
//!
//! Coordinates are 32-bit signed fixed-point values. Areas and margins are
//! computed in `i128` so that rectangles spanning the full `i32` range never
//! overflow during split and choose-subtree arithmetic.

use serde::{Deserialize, Serialize};

/// Degrees are stored as `degrees * FIXED_POINT_SCALE`, truncated.
pub const FIXED_POINT_SCALE: f64 = 10_000_000.0;

/// A single geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts longitude/latitude degrees into fixed-point coordinates.
    ///
    /// Values outside the representable range saturate at `i32::MIN`/`i32::MAX`.
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            x: (lon * FIXED_POINT_SCALE) as i32,
            y: (lat * FIXED_POINT_SCALE) as i32,
        }
    }

    /// Returns the coordinates back in degrees.
    pub fn to_degrees(&self) -> (f64, f64) {
        (
            self.x as f64 / FIXED_POINT_SCALE,
            self.y as f64 / FIXED_POINT_SCALE,
        )
    }

    /// The degenerate rectangle covering only this point.
    pub fn rect(&self) -> Rect {
        Rect {
            x0: self.x,
            y0: self.y,
            x1: self.x,
            y1: self.y,
        }
    }
}

/// An axis-aligned bounding box with `x0 <= x1` and `y0 <= y1`.
///
/// # Examples
///
/// ```rust
/// use velomap_index::{Point, Rect};
///
/// let viewport = Rect::new(0, 0, 100, 100);
/// assert!(viewport.contains_point(&Point::new(50, 50)));
/// assert!(viewport.intersects(&Rect::new(90, 90, 200, 200)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rect({}, {}, {}, {})", self.x0, self.y0, self.x1, self.y1)
    }
}

impl Rect {
    /// Creates a rectangle from two opposite corners, in any order.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Tightest rectangle enclosing every rectangle of `rects`, `None` if empty.
    pub fn bounding<I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = Rect>,
    {
        rects.into_iter().reduce(|acc, r| acc.union(&r))
    }

    /// Tightest rectangle enclosing `points`, `None` if empty.
    pub fn bounding_points<'a, I>(points: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        Self::bounding(points.into_iter().map(Point::rect))
    }

    pub fn width(&self) -> i64 {
        self.x1 as i64 - self.x0 as i64
    }

    pub fn height(&self) -> i64 {
        self.y1 as i64 - self.y0 as i64
    }

    pub fn area(&self) -> i128 {
        self.width() as i128 * self.height() as i128
    }

    /// Half the perimeter.
    pub fn margin(&self) -> i128 {
        self.width() as i128 + self.height() as i128
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// Closed-interval intersection: touching edges count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && self.x1 >= other.x0 && self.y0 <= other.y1 && self.y1 >= other.y0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn expand(&mut self, other: &Rect) {
        *self = self.union(other);
    }

    /// Area that must be added to cover `other`.
    pub fn enlargement(&self, other: &Rect) -> i128 {
        self.union(other).area() - self.area()
    }
}
