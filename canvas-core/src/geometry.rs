//! Canvas-space geometry primitives.

use serde::{Deserialize, Serialize};

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X position.
    pub x: f32,
    /// Y position.
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Midpoint between two points.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Point> for tiny_skia::Point {
    fn from(p: Point) -> Self {
        tiny_skia::Point::from_xy(p.x, p.y)
    }
}

impl From<tiny_skia::Point> for Point {
    fn from(p: tiny_skia::Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// Axis-aligned rectangle in canvas coordinates.
///
/// An empty rectangle (zero or negative extent) never intersects anything.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Bounds {
    /// Create bounds from position and size.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create bounds from edge coordinates.
    #[must_use]
    pub fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    /// The empty rectangle.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Smallest bounds containing all points, or `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut l, mut t, mut r, mut b) = (first.x, first.y, first.x, first.y);
        for p in iter {
            l = l.min(p.x);
            t = t.min(p.y);
            r = r.max(p.x);
            b = b.max(p.y);
        }
        Some(Self::from_ltrb(l, t, r, b))
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Whether the rectangle has no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Check whether a point lies inside (right/bottom edges exclusive).
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Whether two rectangles overlap with positive area.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Overlapping region, or `None` if the rectangles are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self::from_ltrb(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        ))
    }

    /// Smallest rectangle containing both. Empty inputs are ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Grow every edge outward by `amount`.
    #[must_use]
    pub fn inflate(&self, amount: f32) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    /// Shift by an offset.
    #[must_use]
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Convert to a tiny-skia rectangle.
    #[must_use]
    pub fn to_skia(&self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }

    /// Integer pixel rectangle covering these bounds, clipped to `width`x`height`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<tiny_skia::IntRect> {
        let clipped = self.intersection(&Self::new(0.0, 0.0, width as f32, height as f32))?;
        let left = clipped.x.floor().max(0.0) as u32;
        let top = clipped.y.floor().max(0.0) as u32;
        let right = (clipped.right().ceil() as u32).min(width);
        let bottom = (clipped.bottom().ceil() as u32).min(height);
        tiny_skia::IntRect::from_ltrb(left as i32, top as i32, right as i32, bottom as i32)
    }
}

/// Integer canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CanvasSize {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Full-canvas bounds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Whether either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where existing content is pinned when the canvas is resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Content keeps its top-left corner.
    #[default]
    TopLeft,
    /// Content is centered in the new canvas.
    Center,
    /// Content keeps its bottom-right corner.
    BottomRight,
}

impl Anchor {
    /// Offset applied to content when going from `from` to `to`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn offset(self, from: CanvasSize, to: CanvasSize) -> (f32, f32) {
        let dw = to.width as f32 - from.width as f32;
        let dh = to.height as f32 - from.height as f32;
        match self {
            Self::TopLeft => (0.0, 0.0),
            Self::Center => ((dw / 2.0).round(), (dh / 2.0).round()),
            Self::BottomRight => (dw, dh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_intersects() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(5.0, 5.0, 10.0, 10.0);
        let c = Bounds::new(10.0, 0.0, 5.0, 5.0);
        assert!(a.intersects(&b));
        // Touching edges do not overlap
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&Bounds::empty()));
    }

    #[test]
    fn test_bounds_union_ignores_empty() {
        let a = Bounds::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(a.union(&Bounds::empty()), a);
        assert_eq!(Bounds::empty().union(&a), a);
        let u = a.union(&Bounds::new(10.0, 10.0, 1.0, 1.0));
        assert_eq!(u, Bounds::from_ltrb(1.0, 2.0, 11.0, 11.0));
    }

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points([Point::new(3.0, 1.0), Point::new(-1.0, 5.0)])
            .expect("non-empty");
        assert_eq!(b, Bounds::from_ltrb(-1.0, 1.0, 3.0, 5.0));
        assert!(Bounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_pixel_rect_clips_to_canvas() {
        let b = Bounds::new(-5.0, -5.0, 20.5, 10.0);
        let r = b.to_pixel_rect(10, 10).expect("overlaps");
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (0, 0, 10, 5));
        assert!(Bounds::new(20.0, 20.0, 5.0, 5.0).to_pixel_rect(10, 10).is_none());
    }

    #[test]
    fn test_anchor_offsets() {
        let from = CanvasSize::new(100, 100);
        let to = CanvasSize::new(200, 50);
        assert_eq!(Anchor::TopLeft.offset(from, to), (0.0, 0.0));
        assert_eq!(Anchor::Center.offset(from, to), (50.0, -25.0));
        assert_eq!(Anchor::BottomRight.offset(from, to), (100.0, -50.0));
    }
}
