//! Strokes: sampled pointer paths with the brush captured at draw time.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tiny_skia::{Path, PathBuilder};

use crate::{BlendMode, Bounds, Color, Point};

/// A single input sample.
///
/// Serialized as `[x, y]` or `[x, y, pressure]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<f32>", try_from = "Vec<f32>")]
pub struct StrokePoint {
    /// X position in canvas coordinates.
    pub x: f32,
    /// Y position in canvas coordinates.
    pub y: f32,
    /// Stylus pressure in [0, 1], if the device reports it.
    pub pressure: Option<f32>,
}

impl StrokePoint {
    /// A sample without pressure.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            pressure: None,
        }
    }

    /// A sample with pressure (clamped to [0, 1]).
    #[must_use]
    pub fn with_pressure(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure: Some(pressure.clamp(0.0, 1.0)),
        }
    }

    /// Position of the sample.
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Pressure, defaulting to full pressure.
    #[must_use]
    pub fn pressure_or_full(&self) -> f32 {
        self.pressure.unwrap_or(1.0)
    }
}

impl From<StrokePoint> for Vec<f32> {
    fn from(p: StrokePoint) -> Self {
        match p.pressure {
            Some(pressure) => vec![p.x, p.y, pressure],
            None => vec![p.x, p.y],
        }
    }
}

impl TryFrom<Vec<f32>> for StrokePoint {
    type Error = String;

    fn try_from(v: Vec<f32>) -> Result<Self, Self::Error> {
        if v.iter().any(|c| !c.is_finite()) {
            return Err("stroke point contains a non-finite value".to_string());
        }
        match v.as_slice() {
            [x, y] => Ok(Self::new(*x, *y)),
            [x, y, p] => Ok(Self::with_pressure(*x, *y, *p)),
            _ => Err(format!("stroke point must have 2 or 3 components, got {}", v.len())),
        }
    }
}

/// Brush parameters captured when a stroke starts.
///
/// Hardness and opacity are clamped to [0, 1] on every write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BrushRecord", into = "BrushRecord")]
pub struct BrushParams {
    size: f32,
    hardness: f32,
    opacity: f32,
    color: Color,
    blend_mode: BlendMode,
}

/// Wire form of [`BrushParams`]; deserialization funnels through the clamping constructor.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrushRecord {
    size: f32,
    hardness: f32,
    opacity: f32,
    color: Color,
    blend_mode: BlendMode,
}

impl From<BrushRecord> for BrushParams {
    fn from(r: BrushRecord) -> Self {
        Self::new(r.size, r.hardness, r.opacity, r.color, r.blend_mode)
    }
}

impl From<BrushParams> for BrushRecord {
    fn from(b: BrushParams) -> Self {
        Self {
            size: b.size,
            hardness: b.hardness,
            opacity: b.opacity,
            color: b.color,
            blend_mode: b.blend_mode,
        }
    }
}

impl BrushParams {
    /// Smallest brush diameter accepted.
    pub const MIN_SIZE: f32 = 0.5;

    /// Create brush parameters, clamping every value into range.
    #[must_use]
    pub fn new(size: f32, hardness: f32, opacity: f32, color: Color, blend_mode: BlendMode) -> Self {
        let mut params = Self {
            size: Self::MIN_SIZE,
            hardness: 1.0,
            opacity: 1.0,
            color,
            blend_mode,
        };
        params.set_size(size);
        params.set_hardness(hardness);
        params.set_opacity(opacity);
        params
    }

    /// A round eraser of the given size.
    #[must_use]
    pub fn eraser(size: f32, hardness: f32) -> Self {
        Self::new(size, hardness, 1.0, Color::BLACK, BlendMode::Erase)
    }

    /// Diameter in canvas pixels.
    #[must_use]
    pub const fn size(&self) -> f32 {
        self.size
    }

    /// Edge hardness in [0, 1]; 1 is a crisp edge.
    #[must_use]
    pub const fn hardness(&self) -> f32 {
        self.hardness
    }

    /// Opacity in [0, 1].
    #[must_use]
    pub const fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Paint color.
    #[must_use]
    pub const fn color(&self) -> Color {
        self.color
    }

    /// Blend mode used when the stroke is drawn onto its layer.
    #[must_use]
    pub const fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Set the diameter. Non-finite values are ignored.
    pub fn set_size(&mut self, size: f32) {
        if size.is_finite() {
            self.size = size.max(Self::MIN_SIZE);
        }
    }

    /// Set hardness, clamped to [0, 1].
    pub fn set_hardness(&mut self, hardness: f32) {
        self.hardness = clamp_unit(hardness, self.hardness);
    }

    /// Set opacity, clamped to [0, 1].
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = clamp_unit(opacity, self.opacity);
    }

    /// Set the color.
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Set the blend mode.
    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    /// Gaussian sigma of the soft edge, `size * (1 - hardness) * k`.
    ///
    /// Returns 0 for a fully hard brush so callers can skip the blur pass.
    #[must_use]
    pub fn blur_sigma(&self, coefficient: f32) -> f32 {
        if self.hardness >= 1.0 {
            0.0
        } else {
            self.size * (1.0 - self.hardness) * coefficient
        }
    }
}

impl Default for BrushParams {
    fn default() -> Self {
        Self::new(8.0, 1.0, 1.0, Color::BLACK, BlendMode::Normal)
    }
}

/// Clamp into [0, 1], keeping `fallback` for NaN.
pub(crate) fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A committed stroke. Immutable except for its lazily built smoothed path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stroke {
    points: Vec<StrokePoint>,
    brush: BrushParams,
    #[serde(skip)]
    smoothed: OnceLock<Option<Path>>,
}

impl PartialEq for Stroke {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points && self.brush == other.brush
    }
}

impl Stroke {
    /// Create a stroke from samples and brush parameters.
    #[must_use]
    pub fn new(points: Vec<StrokePoint>, brush: BrushParams) -> Self {
        Self {
            points,
            brush,
            smoothed: OnceLock::new(),
        }
    }

    /// Input samples in order.
    #[must_use]
    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    /// Brush captured at draw time.
    #[must_use]
    pub const fn brush(&self) -> &BrushParams {
        &self.brush
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the stroke has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether any sample carries pressure.
    #[must_use]
    pub fn has_pressure(&self) -> bool {
        self.points.iter().any(|p| p.pressure.is_some())
    }

    /// Whether all samples sit on the same spot, so the stroke renders as a dot.
    #[must_use]
    pub fn is_dot(&self) -> bool {
        match self.points.first() {
            Some(first) => self
                .points
                .iter()
                .all(|p| p.position().distance(first.position()) < 1e-3),
            None => false,
        }
    }

    /// Whether the stroke removes pixels rather than painting them.
    #[must_use]
    pub fn is_clearing(&self) -> bool {
        self.brush.blend_mode.is_clearing()
    }

    /// Centerline through successive sample midpoints, built on first use.
    ///
    /// Interior samples become quadratic control points with the midpoints of
    /// neighbouring samples as endpoints, so the curve passes smoothly through
    /// the sampled region instead of forming a polyline.
    pub fn smoothed_path(&self) -> Option<&Path> {
        self.smoothed
            .get_or_init(|| build_smoothed_path(&self.points))
            .as_ref()
    }

    /// Whether the smoothed path has already been computed.
    #[must_use]
    pub fn has_cached_path(&self) -> bool {
        self.smoothed.get().is_some()
    }

    /// Area touched when rendered, including soft-edge falloff and antialiasing.
    #[must_use]
    pub fn bounds(&self, blur_coefficient: f32) -> Bounds {
        let Some(core) = Bounds::from_points(self.points.iter().map(StrokePoint::position)) else {
            return Bounds::empty();
        };
        let sigma = self.brush.blur_sigma(blur_coefficient);
        core.inflate(self.brush.size / 2.0 + sigma * 3.0 + 1.0)
    }

    /// Copy shifted by an offset, used when the canvas is re-anchored.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| StrokePoint {
                x: p.x + dx,
                y: p.y + dy,
                pressure: p.pressure,
            })
            .collect();
        Self::new(points, self.brush)
    }
}

/// Build the midpoint-quadratic centerline for a list of samples.
pub(crate) fn build_smoothed_path(points: &[StrokePoint]) -> Option<Path> {
    let mut pb = PathBuilder::new();
    match points {
        [] => return None,
        [only] => {
            pb.move_to(only.x, only.y);
            pb.line_to(only.x, only.y);
        }
        [a, b] => {
            pb.move_to(a.x, a.y);
            pb.line_to(b.x, b.y);
        }
        [first, .., last] => {
            pb.move_to(first.x, first.y);
            let m = first.position().midpoint(points[1].position());
            pb.line_to(m.x, m.y);
            for pair in points[1..].windows(2) {
                let ctrl = pair[0].position();
                let end = ctrl.midpoint(pair[1].position());
                pb.quad_to(ctrl.x, ctrl.y, end.x, end.y);
            }
            pb.line_to(last.x, last.y);
        }
    }
    pb.finish()
}
