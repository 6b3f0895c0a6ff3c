//! Viewport state: pan, zoom, rotation and mirroring of the canvas on screen.

use serde::{Deserialize, Serialize};
use tiny_skia::Transform;

use crate::{Bounds, CanvasSize, Point};

/// Smallest allowed zoom factor.
pub const MIN_ZOOM: f32 = 0.05;
/// Largest allowed zoom factor.
pub const MAX_ZOOM: f32 = 64.0;

/// Snapshot of the view parameters, suitable for persisting or comparing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// Zoom factor (1.0 = 100%).
    pub zoom: f32,
    /// Pan offset X in screen pixels.
    pub pan_x: f32,
    /// Pan offset Y in screen pixels.
    pub pan_y: f32,
    /// Rotation in degrees, normalized to [0, 360).
    pub rotation: f32,
    /// Horizontal mirror.
    pub mirrored: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            rotation: 0.0,
            mirrored: false,
        }
    }
}

/// Owns the viewport transform and the size of the widget hosting the canvas.
///
/// The canvas-to-screen transform is applied in a fixed order: pan
/// translation, then rotation and mirroring about the center of the zoomed
/// canvas, then zoom.
#[derive(Debug, Clone)]
pub struct CanvasController {
    canvas: CanvasSize,
    view_width: f32,
    view_height: f32,
    state: ViewState,
    revision: u64,
}

impl CanvasController {
    /// Create a controller for a canvas shown in a `view_width` x `view_height` widget.
    #[must_use]
    pub fn new(canvas: CanvasSize, view_width: f32, view_height: f32) -> Self {
        Self {
            canvas,
            view_width,
            view_height,
            state: ViewState::default(),
            revision: 0,
        }
    }

    /// Current view parameters.
    #[must_use]
    pub const fn state(&self) -> ViewState {
        self.state
    }

    /// Restore view parameters, clamping zoom and normalizing rotation.
    pub fn set_state(&mut self, state: ViewState) {
        self.state = ViewState {
            zoom: clamp_zoom(state.zoom),
            rotation: normalize_degrees(state.rotation),
            ..state
        };
        self.touch();
    }

    /// Monotonic counter bumped on every view change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Canvas dimensions.
    #[must_use]
    pub const fn canvas_size(&self) -> CanvasSize {
        self.canvas
    }

    /// Update the canvas dimensions (after a resize).
    pub fn set_canvas_size(&mut self, size: CanvasSize) {
        if self.canvas != size {
            self.canvas = size;
            self.touch();
        }
    }

    /// Hosting widget size in screen pixels.
    #[must_use]
    pub const fn view_size(&self) -> (f32, f32) {
        (self.view_width, self.view_height)
    }

    /// Resize the hosting widget.
    pub fn set_view_size(&mut self, width: f32, height: f32) {
        self.view_width = width.max(0.0);
        self.view_height = height.max(0.0);
        self.touch();
    }

    /// Current zoom factor.
    #[must_use]
    pub const fn zoom(&self) -> f32 {
        self.state.zoom
    }

    /// Set zoom, keeping the pan offset. Clamped to [`MIN_ZOOM`, `MAX_ZOOM`].
    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = clamp_zoom(zoom);
        if (zoom - self.state.zoom).abs() > f32::EPSILON {
            self.state.zoom = zoom;
            self.touch();
        }
    }

    /// Zoom while keeping the canvas point under `focal` (screen space) fixed.
    pub fn zoom_at(&mut self, focal: Point, zoom: f32) {
        let anchor = self.screen_to_canvas(focal);
        self.set_zoom(zoom);
        let moved = self.canvas_to_screen(anchor);
        self.pan_by(focal.x - moved.x, focal.y - moved.y);
    }

    /// Current pan offset in screen pixels.
    #[must_use]
    pub const fn pan(&self) -> (f32, f32) {
        (self.state.pan_x, self.state.pan_y)
    }

    /// Shift the pan offset.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        if !(dx.is_finite() && dy.is_finite()) || (dx == 0.0 && dy == 0.0) {
            return;
        }
        self.state.pan_x += dx;
        self.state.pan_y += dy;
        self.touch();
    }

    /// Set the pan offset.
    pub fn set_pan(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.state.pan_x = x;
            self.state.pan_y = y;
            self.touch();
        }
    }

    /// Rotation in degrees.
    #[must_use]
    pub const fn rotation(&self) -> f32 {
        self.state.rotation
    }

    /// Set rotation in degrees; normalized to [0, 360).
    pub fn set_rotation(&mut self, degrees: f32) {
        if degrees.is_finite() {
            self.state.rotation = normalize_degrees(degrees);
            self.touch();
        }
    }

    /// Rotate by a delta in degrees.
    pub fn rotate_by(&mut self, degrees: f32) {
        self.set_rotation(self.state.rotation + degrees);
    }

    /// Whether the view is mirrored horizontally.
    #[must_use]
    pub const fn is_mirrored(&self) -> bool {
        self.state.mirrored
    }

    /// Set horizontal mirroring.
    pub fn set_mirrored(&mut self, mirrored: bool) {
        if self.state.mirrored != mirrored {
            self.state.mirrored = mirrored;
            self.touch();
        }
    }

    /// Flip the horizontal mirror.
    pub fn toggle_mirror(&mut self) {
        self.set_mirrored(!self.state.mirrored);
    }

    /// Zoom and center so the whole canvas fits in the view.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit_to_view(&mut self) {
        if self.canvas.is_empty() || self.view_width <= 0.0 || self.view_height <= 0.0 {
            return;
        }
        let cw = self.canvas.width as f32;
        let ch = self.canvas.height as f32;
        let zoom = clamp_zoom((self.view_width / cw).min(self.view_height / ch));
        self.state.zoom = zoom;
        self.state.pan_x = (self.view_width - cw * zoom) / 2.0;
        self.state.pan_y = (self.view_height - ch * zoom) / 2.0;
        self.touch();
    }

    /// Reset to 100% zoom, no pan, no rotation, no mirror.
    pub fn reset(&mut self) {
        self.state = ViewState::default();
        self.touch();
    }

    /// Canvas-to-screen transform.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn transform(&self) -> Transform {
        let s = self.state;
        let cx = self.canvas.width as f32 * s.zoom / 2.0;
        let cy = self.canvas.height as f32 * s.zoom / 2.0;
        let mirror = if s.mirrored { -1.0 } else { 1.0 };
        Transform::from_translate(s.pan_x, s.pan_y)
            .pre_translate(cx, cy)
            .pre_concat(Transform::from_rotate(s.rotation))
            .pre_scale(mirror, 1.0)
            .pre_translate(-cx, -cy)
            .pre_scale(s.zoom, s.zoom)
    }

    /// Map a screen point to canvas coordinates.
    #[must_use]
    pub fn screen_to_canvas(&self, p: Point) -> Point {
        let Some(inverse) = self.transform().invert() else {
            return p;
        };
        map_point(inverse, p)
    }

    /// Map a canvas point to screen coordinates.
    #[must_use]
    pub fn canvas_to_screen(&self, p: Point) -> Point {
        map_point(self.transform(), p)
    }

    /// Visible region in canvas coordinates (axis-aligned hull when rotated).
    #[must_use]
    pub fn viewport_bounds(&self) -> Bounds {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(self.view_width, 0.0),
            Point::new(self.view_width, self.view_height),
            Point::new(0.0, self.view_height),
        ];
        Bounds::from_points(corners.map(|c| self.screen_to_canvas(c))).unwrap_or_default()
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new(CanvasSize::new(512, 512), 800.0, 600.0)
    }
}

fn map_point(t: Transform, p: Point) -> Point {
    let mut pts = [tiny_skia::Point::from_xy(p.x, p.y)];
    t.map_points(&mut pts);
    pts[0].into()
}

fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

fn normalize_degrees(degrees: f32) -> f32 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}
