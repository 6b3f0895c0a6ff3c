//! Per-frame rendering of an editor into a host surface.
//!
//! A frame is built from two surfaces with exactly one render hint each:
//!
//! ```text
//! Canvas  (cacheable)  surround, checkerboard, culled layer composite, live stroke
//! Overlay (volatile)   marching ants, tool cursor
//! ```
//!
//! The canvas surface is repainted only after a [`Channel::Render`]
//! notification, a viewport change or a resize. The overlay is drawn fresh
//! on top of a copy of it every frame, so hover and animation never touch
//! the layer caches.

use std::time::Duration;

use canvas_core::{
    Background, CanvasEditor, Change, ChangeNotifier, Channel, Color, RenderStats, RenderView,
    SelectionShape,
};
use tiny_skia::{Paint, Pixmap, Transform};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::checkerboard::{self, CheckerSpec};
use crate::cursor::draw_cursor;
use crate::error::{RenderError, RenderResult};
use crate::overlay::{OutlineSource, SelectionOverlay};

/// Appearance of rendered frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Transparency checkerboard.
    pub checker: CheckerSpec,
    /// Fill outside the canvas.
    pub surround: Color,
    /// Length of one marching-ants dash in screen pixels.
    pub dash_length: f32,
    /// Ants travel speed in screen pixels per second.
    pub ants_speed: f32,
    /// Outline base color and dash color.
    pub ant_colors: (Color, Color),
    /// Cursor stroke color.
    pub cursor_color: Color,
    /// Cursor stroke width.
    pub cursor_width: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checker: CheckerSpec::default(),
            surround: Color::rgb(64, 64, 64),
            dash_length: 4.0,
            ants_speed: 16.0,
            ant_colors: (Color::BLACK, Color::WHITE),
            cursor_color: Color::rgb(32, 32, 32),
            cursor_width: 1.0,
        }
    }
}

/// Drawables composed into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Layer content and its backdrop.
    Canvas,
    /// Per-frame decorations.
    Overlay,
}

/// How a surface may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceHint {
    /// Kept between frames until invalidated.
    Cacheable,
    /// Redrawn every frame, never cached.
    Volatile,
}

impl Surface {
    /// Every surface, bottom first.
    pub const ALL: [Self; 2] = [Self::Canvas, Self::Overlay];

    /// The single hint for this surface.
    #[must_use]
    pub const fn hint(self) -> SurfaceHint {
        match self {
            Self::Canvas => SurfaceHint::Cacheable,
            Self::Overlay => SurfaceHint::Volatile,
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Layer counters; zero when the canvas surface was reused.
    pub layers: RenderStats,
    /// Whether the canvas surface was repainted.
    pub canvas_repainted: bool,
    /// Whether a selection outline was drawn.
    pub outline_drawn: bool,
    /// Whether the outline came from the cached measurement.
    pub outline_reused: bool,
}

/// Frame renderer for one editor view.
pub struct RenderPipeline {
    config: PipelineConfig,
    render_rx: broadcast::Receiver<Change>,
    dirty: bool,
    canvas: Option<Pixmap>,
    painted: Option<(u64, u32, u32)>,
    overlay: SelectionOverlay,
    repaints: u64,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("config", &self.config)
            .field("dirty", &self.dirty)
            .field("painted", &self.painted)
            .field("repaints", &self.repaints)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    /// Create a pipeline listening for render invalidations on `notifier`.
    #[must_use]
    pub fn new(config: PipelineConfig, notifier: &ChangeNotifier) -> Self {
        Self {
            config,
            render_rx: notifier.subscribe(Channel::Render),
            dirty: true,
            canvas: None,
            painted: None,
            overlay: SelectionOverlay::new(),
            repaints: 0,
        }
    }

    /// Create a pipeline for an editor with default appearance.
    #[must_use]
    pub fn for_editor(editor: &CanvasEditor) -> Self {
        Self::new(PipelineConfig::default(), editor.notifier())
    }

    /// Appearance settings.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Change appearance; forces a canvas repaint.
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
        self.invalidate();
    }

    /// Force the next frame to repaint the canvas surface.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Number of canvas repaints so far.
    #[must_use]
    pub const fn repaints(&self) -> u64 {
        self.repaints
    }

    /// Selection outline cache.
    #[must_use]
    pub const fn overlay(&self) -> &SelectionOverlay {
        &self.overlay
    }

    /// Render one frame into `target`, whose size becomes the view size.
    ///
    /// `elapsed` drives the marching-ants animation.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] if the canvas surface cannot be
    /// allocated.
    pub fn render_frame(
        &mut self,
        editor: &mut CanvasEditor,
        target: &mut Pixmap,
        elapsed: Duration,
    ) -> RenderResult<FrameStats> {
        let (width, height) = (target.width(), target.height());
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (width as f32, height as f32);
        let (vw, vh) = editor.viewport().view_size();
        if (vw - w).abs() > f32::EPSILON || (vh - h).abs() > f32::EPSILON {
            editor.viewport_mut().set_view_size(w, h);
        }

        self.drain_notifications();
        let key = (editor.viewport().revision(), width, height);
        let mut stats = FrameStats::default();
        if self.dirty || self.painted != Some(key) || self.canvas.is_none() {
            stats.layers = self.repaint(editor, width, height)?;
            stats.canvas_repainted = true;
            self.painted = Some(key);
            self.dirty = false;
            self.repaints += 1;
        }
        if let Some(canvas) = &self.canvas {
            target.data_mut().copy_from_slice(canvas.data());
        }
        self.draw_overlay(editor, target, elapsed, &mut stats);
        Ok(stats)
    }

    fn drain_notifications(&mut self) {
        loop {
            match self.render_rx.try_recv() {
                Ok(_) => self.dirty = true,
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::trace!(missed, "render notifications lagged");
                    self.dirty = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    // ---------------------------------------------------------------------
    // Canvas surface
    // ---------------------------------------------------------------------

    fn repaint(
        &mut self,
        editor: &mut CanvasEditor,
        width: u32,
        height: u32,
    ) -> RenderResult<RenderStats> {
        let mut surface = match self.canvas.take() {
            Some(p) if p.width() == width && p.height() == height => p,
            _ => Pixmap::new(width, height).ok_or_else(|| RenderError::surface(width, height))?,
        };
        surface.fill(self.config.surround.to_skia());

        let transform = editor.viewport().transform();
        let viewport = editor.viewport().viewport_bounds();
        if let Some(rect) = editor.viewport().canvas_size().bounds().to_skia() {
            match editor.layers().background() {
                Background::Checkerboard => {
                    let tile = checkerboard::pattern(self.config.checker)?;
                    checkerboard::fill(&mut surface, &tile, rect, transform);
                }
                Background::Transparent => {
                    let clear = Paint {
                        blend_mode: tiny_skia::BlendMode::Clear,
                        ..Paint::default()
                    };
                    surface.fill_rect(rect, &clear, transform, None);
                }
            }
        }

        let live = editor.live_stroke();
        let mut view = RenderView::new(transform, viewport);
        if let Some((layer, stroke)) = &live {
            view = view.with_live(*layer, stroke);
        }
        let stats = editor.layers_mut().render_into(&mut surface, &view);
        tracing::trace!(width, height, drawn = stats.layers_drawn, "canvas surface repainted");
        self.canvas = Some(surface);
        Ok(stats)
    }

    // ---------------------------------------------------------------------
    // Overlay surface
    // ---------------------------------------------------------------------

    fn draw_overlay(
        &mut self,
        editor: &CanvasEditor,
        target: &mut Pixmap,
        elapsed: Duration,
        stats: &mut FrameStats,
    ) {
        let transform: Transform = editor.viewport().transform();
        if let Some((source, shape)) = outline(editor) {
            let reused = self.overlay.stats().reused;
            let phase = elapsed.as_secs_f32() * self.config.ants_speed;
            self.overlay.draw(
                target,
                &source,
                &shape,
                transform,
                self.config.dash_length,
                phase,
                self.config.ant_colors,
            );
            stats.outline_drawn = true;
            stats.outline_reused = self.overlay.stats().reused > reused;
        }
        if let (Some(at), Some(shape)) = (editor.hover(), editor.cursor()) {
            draw_cursor(
                target,
                shape,
                at,
                editor.viewport().zoom(),
                self.config.cursor_color,
                self.config.cursor_width,
            );
        }
    }
}

/// Outline to show: a drag in progress wins over the committed selection.
/// A select-all has no outline.
fn outline(editor: &CanvasEditor) -> Option<(OutlineSource, SelectionShape)> {
    if let Some(preview) = editor.tools().preview_selection() {
        return Some((OutlineSource::Preview(preview.clone()), preview));
    }
    let selection = editor.selection();
    selection
        .shape()
        .map(|shape| (OutlineSource::Committed(selection.revision()), shape.clone()))
}
