//! Hand tool.

use super::{CursorShape, Tool, ToolContext, ToolId, ToolMeta, ToolSettings};
use crate::notify::Channel;
use crate::{CanvasResult, Point, PointerEvent, PointerPhase};

/// Drags the viewport. Works in screen space so the grab point stays under the pointer.
#[derive(Debug, Clone)]
pub struct PanTool {
    settings: ToolSettings,
    last: Option<Point>,
}

impl PanTool {
    /// Metadata.
    pub const META: ToolMeta = ToolMeta {
        id: ToolId::PAN,
        name: "Hand",
        icon: "hand",
        shortcut: Some('h'),
    };

    /// Create the tool.
    #[must_use]
    pub const fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            last: None,
        }
    }
}

impl Tool for PanTool {
    fn meta(&self) -> ToolMeta {
        Self::META
    }

    fn settings(&self) -> ToolSettings {
        self.settings
    }

    fn set_settings(&mut self, settings: ToolSettings) {
        self.settings = settings.normalized();
    }

    fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> CanvasResult<()> {
        let p = event.position();
        match event.phase {
            PointerPhase::Down => self.last = Some(p),
            PointerPhase::Move | PointerPhase::Up => {
                if let Some(last) = self.last {
                    let (dx, dy) = (p.x - last.x, p.y - last.y);
                    if dx != 0.0 || dy != 0.0 {
                        ctx.viewport().pan_by(dx, dy);
                        ctx.notify(Channel::Render);
                    }
                }
                self.last = (event.phase == PointerPhase::Move).then_some(p);
            }
            PointerPhase::Cancel => self.cancel(ctx),
        }
        Ok(())
    }

    fn cancel(&mut self, _ctx: &mut dyn ToolContext) {
        self.last = None;
    }

    fn cursor(&self) -> CursorShape {
        if self.last.is_some() {
            CursorShape::Grabbing
        } else {
            CursorShape::Grab
        }
    }
}
