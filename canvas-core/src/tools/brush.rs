//! Paint brush and eraser.

use futures::future::BoxFuture;

use super::{CursorShape, Tool, ToolContext, ToolId, ToolMeta, ToolSettings};
use crate::notify::Channel;
use crate::{stamp, BrushParams, CanvasResult, PointerEvent, PointerPhase, StrokePoint};

/// Pressure levels whose stamps are rendered during warm-up.
const WARM_PRESSURES: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

/// Freehand painting. The eraser variant paints with the clearing blend mode.
#[derive(Debug, Clone)]
pub struct BrushTool {
    settings: ToolSettings,
    eraser: bool,
}

impl BrushTool {
    /// Create a brush or an eraser.
    #[must_use]
    pub const fn new(settings: ToolSettings, eraser: bool) -> Self {
        Self { settings, eraser }
    }

    /// Metadata for the brush (`false`) or eraser (`true`).
    #[must_use]
    pub const fn meta_for(eraser: bool) -> ToolMeta {
        if eraser {
            ToolMeta {
                id: ToolId::ERASER,
                name: "Eraser",
                icon: "eraser",
                shortcut: Some('e'),
            }
        } else {
            ToolMeta {
                id: ToolId::BRUSH,
                name: "Brush",
                icon: "brush",
                shortcut: Some('b'),
            }
        }
    }

    fn brush(&self, ctx: &mut dyn ToolContext) -> BrushParams {
        if self.eraser {
            self.settings.eraser_brush()
        } else {
            self.settings.paint_brush(ctx.colors().primary())
        }
    }

    fn sample(&self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> StrokePoint {
        let p = ctx.viewport().screen_to_canvas(event.position());
        match event.pressure.filter(|_| self.settings.pressure) {
            Some(pressure) => StrokePoint::with_pressure(p.x, p.y, pressure),
            None => StrokePoint::new(p.x, p.y),
        }
    }
}

impl Tool for BrushTool {
    fn meta(&self) -> ToolMeta {
        Self::meta_for(self.eraser)
    }

    fn settings(&self) -> ToolSettings {
        self.settings
    }

    fn set_settings(&mut self, settings: ToolSettings) {
        self.settings = settings.normalized();
    }

    fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> CanvasResult<()> {
        let point = self.sample(event, ctx);
        match event.phase {
            PointerPhase::Down => {
                let brush = self.brush(ctx);
                if ctx.strokes().start_stroke(point, brush) {
                    ctx.notify(Channel::Render);
                }
            }
            PointerPhase::Move => {
                if ctx.strokes().is_drawing() {
                    ctx.strokes().update_stroke(point);
                    ctx.notify(Channel::Render);
                }
            }
            PointerPhase::Up => {
                ctx.strokes().update_stroke(point);
                if let Some(stroke) = ctx.strokes().end_stroke() {
                    if !self.eraser {
                        let color = stroke.brush().color();
                        ctx.colors().push_recent(color);
                    }
                    ctx.commit_stroke(stroke)?;
                }
            }
            PointerPhase::Cancel => self.cancel(ctx),
        }
        Ok(())
    }

    fn cancel(&mut self, ctx: &mut dyn ToolContext) {
        if ctx.strokes().cancel() {
            ctx.notify(Channel::Render);
        }
    }

    fn cursor(&self) -> CursorShape {
        CursorShape::Brush {
            diameter: self.settings.size,
        }
    }

    fn warm_up(&self, blur_coefficient: f32) -> Option<BoxFuture<'static, CanvasResult<()>>> {
        let base = if self.eraser {
            self.settings.eraser_brush()
        } else {
            self.settings.paint_brush(crate::Color::BLACK)
        };
        let cache = stamp::shared();
        if WARM_PRESSURES
            .iter()
            .all(|p| cache.is_warm(&scaled(base, *p), blur_coefficient))
        {
            return None;
        }
        Some(Box::pin(async move {
            for pressure in WARM_PRESSURES {
                cache.warm(&scaled(base, pressure), blur_coefficient)?;
                tokio::task::yield_now().await;
            }
            tracing::trace!(size = base.size(), "brush stamps warmed");
            Ok(())
        }))
    }
}

fn scaled(mut brush: BrushParams, pressure: f32) -> BrushParams {
    brush.set_size(brush.size() * pressure);
    brush
}
