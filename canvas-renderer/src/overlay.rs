//! Marching-ants selection outline.
//!
//! Flattening the selection into a screen-space polyline and measuring it is
//! the expensive part, so the measured outline is cached and keyed by the
//! selection and the view transform. Each animation tick only walks the
//! cached lengths with a new dash phase.

use canvas_core::{Color, Point, SelectionShape};
use tiny_skia::{LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Segments used to approximate an ellipse.
const ELLIPSE_SEGMENTS: usize = 64;

/// What the overlay outlines.
#[derive(Debug, Clone, PartialEq)]
pub enum OutlineSource {
    /// The committed selection at a revision.
    Committed(u64),
    /// A selection still being dragged.
    Preview(SelectionShape),
}

/// A flattened outline with cumulative lengths.
#[derive(Debug, Clone)]
pub struct OutlineMetrics {
    points: Vec<Point>,
    cumulative: Vec<f32>,
}

impl OutlineMetrics {
    /// Flatten a shape into screen space. The outline is closed.
    #[must_use]
    pub fn measure(shape: &SelectionShape, transform: Transform) -> Self {
        let mut points: Vec<tiny_skia::Point> = outline(shape)
            .into_iter()
            .map(|p| tiny_skia::Point::from_xy(p.x, p.y))
            .collect();
        transform.map_points(&mut points);
        let mut points: Vec<Point> = points.into_iter().map(|p| Point::new(p.x, p.y)).collect();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += points[i - 1].distance(*p);
            }
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    /// Perimeter in screen pixels.
    #[must_use]
    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Point at a distance along the outline.
    fn at(&self, distance: f32) -> Point {
        let i = self
            .cumulative
            .partition_point(|d| *d < distance)
            .clamp(1, self.points.len().saturating_sub(1).max(1));
        let (Some(a), Some(b)) = (self.points.get(i - 1), self.points.get(i)) else {
            return self.points.first().copied().unwrap_or_default();
        };
        let span = self.cumulative[i] - self.cumulative[i - 1];
        if span <= f32::EPSILON {
            return *a;
        }
        let t = (distance - self.cumulative[i - 1]) / span;
        Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
    }

    /// Dashes of length `dash` separated by gaps of `dash`, shifted by
    /// `phase`. Each dash is a polyline that keeps the corners it spans.
    #[must_use]
    pub fn dashes(&self, dash: f32, phase: f32) -> Vec<Vec<Point>> {
        let length = self.length();
        if length <= 0.0 || dash <= 0.0 {
            return Vec::new();
        }
        let period = dash * 2.0;
        let mut start = phase.rem_euclid(period) - period;
        let mut out = Vec::new();
        while start < length {
            let (from, to) = (start.max(0.0), (start + dash).min(length));
            if to > from {
                out.push(self.span(from, to));
            }
            start += period;
        }
        out
    }

    fn span(&self, from: f32, to: f32) -> Vec<Point> {
        let mut points = vec![self.at(from)];
        points.extend(
            self.cumulative
                .iter()
                .zip(&self.points)
                .filter(|(d, _)| **d > from && **d < to)
                .map(|(_, p)| *p),
        );
        points.push(self.at(to));
        points
    }

    fn polyline(&self) -> Option<tiny_skia::Path> {
        let mut pb = PathBuilder::new();
        let (first, rest) = self.points.split_first()?;
        pb.move_to(first.x, first.y);
        for p in rest {
            pb.line_to(p.x, p.y);
        }
        pb.finish()
    }
}

fn outline(shape: &SelectionShape) -> Vec<Point> {
    match shape {
        SelectionShape::Rect(b) => vec![
            Point::new(b.x, b.y),
            Point::new(b.right(), b.y),
            Point::new(b.right(), b.bottom()),
            Point::new(b.x, b.bottom()),
        ],
        SelectionShape::Ellipse(b) => {
            let (rx, ry) = (b.width / 2.0, b.height / 2.0);
            let (cx, cy) = (b.x + rx, b.y + ry);
            (0..ELLIPSE_SEGMENTS)
                .map(|i| {
                    #[allow(clippy::cast_precision_loss)]
                    let a = i as f32 / ELLIPSE_SEGMENTS as f32 * std::f32::consts::TAU;
                    Point::new(cx + rx * a.cos(), cy + ry * a.sin())
                })
                .collect()
        }
        SelectionShape::Lasso(points) => points.clone(),
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    /// Outlines measured.
    pub measured: u64,
    /// Frames served from the cached measurement.
    pub reused: u64,
}

/// Dashed-outline renderer with a one-entry metrics cache.
#[derive(Debug, Default)]
pub struct SelectionOverlay {
    cached: Option<(OutlineSource, [u32; 6], OutlineMetrics)>,
    stats: OverlayStats,
}

fn transform_key(t: Transform) -> [u32; 6] {
    [t.sx, t.ky, t.kx, t.sy, t.tx, t.ty].map(f32::to_bits)
}

impl SelectionOverlay {
    /// Create an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache statistics.
    #[must_use]
    pub const fn stats(&self) -> OverlayStats {
        self.stats
    }

    /// Forget the cached outline.
    pub fn clear(&mut self) {
        self.cached = None;
    }

    /// Measured outline for a source, reusing the cache when nothing changed.
    pub fn metrics(
        &mut self,
        source: &OutlineSource,
        shape: &SelectionShape,
        transform: Transform,
    ) -> &OutlineMetrics {
        let key = transform_key(transform);
        let hit = matches!(&self.cached, Some((s, k, _)) if s == source && *k == key);
        if hit {
            self.stats.reused += 1;
        } else {
            self.stats.measured += 1;
            self.cached = None;
            tracing::trace!(?source, "measuring selection outline");
        }
        let (_, _, metrics) = self.cached.get_or_insert_with(|| {
            (source.clone(), key, OutlineMetrics::measure(shape, transform))
        });
        metrics
    }

    /// Draw the outline: a solid dark line with light dashes shifted by `phase`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        target: &mut Pixmap,
        source: &OutlineSource,
        shape: &SelectionShape,
        transform: Transform,
        dash: f32,
        phase: f32,
        colors: (Color, Color),
    ) {
        let metrics = self.metrics(source, shape, transform);
        let stroke = Stroke {
            width: 1.0,
            line_cap: LineCap::Butt,
            ..Stroke::default()
        };
        let mut paint = Paint {
            anti_alias: false,
            ..Paint::default()
        };
        if let Some(path) = metrics.polyline() {
            paint.set_color(colors.0.to_skia());
            target.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
        let mut pb = PathBuilder::new();
        for segment in metrics.dashes(dash, phase) {
            let Some((first, rest)) = segment.split_first() else {
                continue;
            };
            pb.move_to(first.x, first.y);
            for p in rest {
                pb.line_to(p.x, p.y);
            }
        }
        if let Some(path) = pb.finish() {
            paint.set_color(colors.1.to_skia());
            target.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::Bounds;

    fn square() -> SelectionShape {
        SelectionShape::Rect(Bounds::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_rect_perimeter() {
        let m = OutlineMetrics::measure(&square(), Transform::from_scale(2.0, 2.0));
        assert!((m.length() - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_dashes_cover_half_the_outline() {
        let m = OutlineMetrics::measure(&square(), Transform::identity());
        for phase in [0.0, 1.5, 3.0, 7.0] {
            let covered: f32 = m
                .dashes(4.0, phase)
                .iter()
                .flat_map(|d| d.windows(2).map(|w| w[0].distance(w[1])))
                .sum();
            assert!((covered - 20.0).abs() < 0.5, "phase {phase}: {covered}");
        }
    }

    #[test]
    fn test_cache_survives_animation_ticks() {
        let mut overlay = SelectionOverlay::new();
        let mut target = Pixmap::new(32, 32).expect("target");
        let source = OutlineSource::Committed(3);
        for tick in 0..5u8 {
            overlay.draw(
                &mut target,
                &source,
                &square(),
                Transform::identity(),
                4.0,
                f32::from(tick),
                (Color::BLACK, Color::WHITE),
            );
        }
        assert_eq!(overlay.stats().measured, 1);
        assert_eq!(overlay.stats().reused, 4);
    }

    #[test]
    fn test_cache_invalidated_by_revision_and_transform() {
        let mut overlay = SelectionOverlay::new();
        overlay.metrics(&OutlineSource::Committed(1), &square(), Transform::identity());
        overlay.metrics(&OutlineSource::Committed(2), &square(), Transform::identity());
        overlay.metrics(
            &OutlineSource::Committed(2),
            &square(),
            Transform::from_translate(5.0, 0.0),
        );
        assert_eq!(overlay.stats().measured, 3);
    }
}
