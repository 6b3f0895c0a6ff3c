//! Marquee and lasso selection.

use super::{CursorShape, Tool, ToolContext, ToolId, ToolMeta, ToolSettings};
use crate::notify::Channel;
use crate::{Bounds, CanvasResult, Point, PointerEvent, PointerPhase, SelectionShape};

/// Drags shorter than this (screen pixels) count as a click, which selects all.
const CLICK_TOLERANCE: f32 = 2.0;

/// Shape drawn by a [`SelectTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    /// Axis-aligned rectangle.
    Rect,
    /// Ellipse inscribed in the dragged rectangle.
    Ellipse,
    /// Free-form polygon following the pointer.
    Lasso,
}

#[derive(Debug, Clone)]
struct Drag {
    screen_start: Point,
    points: Vec<Point>,
}

/// Selection tool; the selection is committed on pointer release.
///
/// The drag preview is overlay content, so moving the pointer publishes nothing.
#[derive(Debug, Clone)]
pub struct SelectTool {
    kind: SelectKind,
    settings: ToolSettings,
    drag: Option<Drag>,
}

impl SelectTool {
    /// Create a selection tool of one kind.
    #[must_use]
    pub const fn new(kind: SelectKind, settings: ToolSettings) -> Self {
        Self {
            kind,
            settings,
            drag: None,
        }
    }

    /// Metadata per kind.
    #[must_use]
    pub const fn meta_for(kind: SelectKind) -> ToolMeta {
        match kind {
            SelectKind::Rect => ToolMeta {
                id: ToolId::RECT_SELECT,
                name: "Rectangle Select",
                icon: "select-rect",
                shortcut: Some('m'),
            },
            SelectKind::Ellipse => ToolMeta {
                id: ToolId::ELLIPSE_SELECT,
                name: "Ellipse Select",
                icon: "select-ellipse",
                shortcut: None,
            },
            SelectKind::Lasso => ToolMeta {
                id: ToolId::LASSO_SELECT,
                name: "Lasso",
                icon: "lasso",
                shortcut: Some('l'),
            },
        }
    }

    fn shape(&self) -> Option<SelectionShape> {
        let drag = self.drag.as_ref()?;
        let first = *drag.points.first()?;
        let last = *drag.points.last()?;
        let rect = || {
            Bounds::from_ltrb(
                first.x.min(last.x),
                first.y.min(last.y),
                first.x.max(last.x),
                first.y.max(last.y),
            )
        };
        Some(match self.kind {
            SelectKind::Rect => SelectionShape::Rect(rect()),
            SelectKind::Ellipse => SelectionShape::Ellipse(rect()),
            SelectKind::Lasso => SelectionShape::Lasso(drag.points.clone()),
        })
    }

    fn track(&mut self, canvas: Point) {
        let Some(drag) = &mut self.drag else {
            return;
        };
        match self.kind {
            SelectKind::Lasso => {
                if drag.points.last() != Some(&canvas) {
                    drag.points.push(canvas);
                }
            }
            SelectKind::Rect | SelectKind::Ellipse => {
                drag.points.truncate(1);
                drag.points.push(canvas);
            }
        }
    }
}

impl Tool for SelectTool {
    fn meta(&self) -> ToolMeta {
        Self::meta_for(self.kind)
    }

    fn settings(&self) -> ToolSettings {
        self.settings
    }

    fn set_settings(&mut self, settings: ToolSettings) {
        self.settings = settings.normalized();
    }

    fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> CanvasResult<()> {
        let canvas = ctx.viewport().screen_to_canvas(event.position());
        match event.phase {
            PointerPhase::Down => {
                self.drag = Some(Drag {
                    screen_start: event.position(),
                    points: vec![canvas],
                });
            }
            PointerPhase::Move => {
                self.track(canvas);
            }
            PointerPhase::Up => {
                self.track(canvas);
                let shape = self.shape();
                let Some(drag) = self.drag.take() else {
                    return Ok(());
                };
                let changed = if drag.screen_start.distance(event.position()) < CLICK_TOLERANCE
                    && self.kind != SelectKind::Lasso
                {
                    ctx.selection().select_all()
                } else {
                    shape.is_some_and(|s| ctx.selection().set(s))
                };
                if changed {
                    ctx.notify(Channel::Selection);
                }
            }
            PointerPhase::Cancel => self.cancel(ctx),
        }
        Ok(())
    }

    fn cancel(&mut self, _ctx: &mut dyn ToolContext) {
        self.drag = None;
    }

    fn cursor(&self) -> CursorShape {
        CursorShape::Crosshair
    }

    fn preview_selection(&self) -> Option<SelectionShape> {
        self.shape()
    }
}
