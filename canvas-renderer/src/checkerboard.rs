//! Transparency checkerboard.
//!
//! The tile is built once per [`CheckerSpec`] and shared by every pipeline in
//! the process. Frames only reference it through a repeating pattern shader.

use std::sync::{Arc, Mutex, PoisonError};

use canvas_core::Color;
use tiny_skia::{FilterQuality, Paint, Pattern, Pixmap, Rect, SpreadMode, Transform};

use crate::error::{RenderError, RenderResult};

/// Cell size and colors of a checkerboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckerSpec {
    /// Cell edge in screen pixels.
    pub cell: u32,
    /// Color of the top-left cell.
    pub light: Color,
    /// Color of the other cells.
    pub dark: Color,
}

impl Default for CheckerSpec {
    fn default() -> Self {
        Self {
            cell: 8,
            light: Color::rgb(255, 255, 255),
            dark: Color::rgb(204, 204, 204),
        }
    }
}

/// Build a 2x2-cell tile.
///
/// # Errors
///
/// Returns [`RenderError::Surface`] for a zero or oversized cell.
pub fn build_tile(spec: CheckerSpec) -> RenderResult<Pixmap> {
    let edge = spec.cell.saturating_mul(2);
    let mut tile = Pixmap::new(edge, edge).ok_or_else(|| RenderError::surface(edge, edge))?;
    tile.fill(spec.light.to_skia());
    let mut paint = Paint::default();
    paint.set_color(spec.dark.to_skia());
    #[allow(clippy::cast_precision_loss)]
    let cell = spec.cell as f32;
    for (x, y) in [(cell, 0.0), (0.0, cell)] {
        if let Some(rect) = Rect::from_xywh(x, y, cell, cell) {
            tile.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
    Ok(tile)
}

static TILES: Mutex<Vec<(CheckerSpec, Arc<Pixmap>)>> = Mutex::new(Vec::new());

/// Process-wide tile for a spec, built on first use.
///
/// # Errors
///
/// See [`build_tile`].
pub fn pattern(spec: CheckerSpec) -> RenderResult<Arc<Pixmap>> {
    let mut tiles = TILES.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((_, tile)) = tiles.iter().find(|(s, _)| *s == spec) {
        return Ok(Arc::clone(tile));
    }
    let tile = Arc::new(build_tile(spec)?);
    tracing::debug!(cell = spec.cell, "checkerboard tile built");
    tiles.push((spec, Arc::clone(&tile)));
    Ok(tile)
}

/// Number of tiles currently shared.
#[must_use]
pub fn cached_tiles() -> usize {
    TILES.lock().unwrap_or_else(PoisonError::into_inner).len()
}

/// Drop every shared tile. Call at application shutdown.
///
/// Tiles already handed out stay valid.
pub fn teardown() {
    let dropped = {
        let mut tiles = TILES.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tiles).len()
    };
    if dropped > 0 {
        tracing::debug!(dropped, "checkerboard tiles torn down");
    }
}

/// Fill the canvas rectangle under `view` with the checkerboard.
///
/// Cells stay aligned to the screen, so zooming does not resize them.
pub fn fill(target: &mut Pixmap, tile: &Pixmap, canvas: Rect, view: Transform) {
    let screen_aligned = view.invert().unwrap_or_default();
    let paint = Paint {
        shader: Pattern::new(
            tile.as_ref(),
            SpreadMode::Repeat,
            FilterQuality::Nearest,
            1.0,
            screen_aligned,
        ),
        ..Paint::default()
    };
    target.fill_rect(canvas, &paint, view, None);
}
