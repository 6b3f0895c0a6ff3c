//! Selection geometry with its own undo stack.
//!
//! No selection (`None`) means the whole canvas is selected. Selection edits
//! never enter the document history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tiny_skia::{Path, PathBuilder};

use crate::{Bounds, CanvasSize, Point};

/// A closed selection outline in canvas coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SelectionShape {
    /// Axis-aligned rectangle.
    Rect(Bounds),
    /// Ellipse inscribed in a rectangle.
    Ellipse(Bounds),
    /// Free-form polygon, implicitly closed.
    Lasso(Vec<Point>),
}

impl SelectionShape {
    /// Whether the shape encloses any area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Rect(b) | Self::Ellipse(b) => b.is_empty(),
            Self::Lasso(points) => {
                points.len() < 3
                    || points.iter().any(|p| !p.is_finite())
                    || Bounds::from_points(points.iter().copied()).map_or(true, |b| b.is_empty())
            }
        }
    }

    /// Bounding box.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        match self {
            Self::Rect(b) | Self::Ellipse(b) => *b,
            Self::Lasso(points) => {
                Bounds::from_points(points.iter().copied()).unwrap_or_else(Bounds::empty)
            }
        }
    }

    /// Hit test.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Self::Rect(b) => b.contains(p),
            Self::Ellipse(b) => {
                if b.is_empty() {
                    return false;
                }
                let rx = b.width / 2.0;
                let ry = b.height / 2.0;
                let dx = (p.x - (b.x + rx)) / rx;
                let dy = (p.y - (b.y + ry)) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Self::Lasso(points) => polygon_contains(points, p),
        }
    }

    /// Outline as a closed path.
    #[must_use]
    pub fn to_path(&self) -> Option<Path> {
        match self {
            Self::Rect(b) => b.to_skia().map(PathBuilder::from_rect),
            Self::Ellipse(b) => b.to_skia().and_then(PathBuilder::from_oval),
            Self::Lasso(points) => {
                let (first, rest) = points.split_first()?;
                let mut pb = PathBuilder::new();
                pb.move_to(first.x, first.y);
                for p in rest {
                    pb.line_to(p.x, p.y);
                }
                pb.close();
                pb.finish()
            }
        }
    }

    /// Same shape shifted by an offset.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        match self {
            Self::Rect(b) => Self::Rect(b.translate(dx, dy)),
            Self::Ellipse(b) => Self::Ellipse(b.translate(dx, dy)),
            Self::Lasso(points) => Self::Lasso(
                points
                    .iter()
                    .map(|p| Point::new(p.x + dx, p.y + dy))
                    .collect(),
            ),
        }
    }
}

/// Even-odd ray cast.
fn polygon_contains(points: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = points.len().wrapping_sub(1);
    for (i, a) in points.iter().enumerate() {
        let b = points[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Current selection plus a linear undo/redo stack.
#[derive(Debug, Clone)]
pub struct SelectionManager {
    current: Option<SelectionShape>,
    undo: VecDeque<Option<SelectionShape>>,
    redo: Vec<Option<SelectionShape>>,
    max_depth: usize,
    revision: u64,
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl SelectionManager {
    /// Create with everything selected.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            current: None,
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
            revision: 0,
        }
    }

    /// Active shape; `None` means select-all.
    #[must_use]
    pub const fn shape(&self) -> Option<&SelectionShape> {
        self.current.as_ref()
    }

    /// Whether the whole canvas is selected.
    #[must_use]
    pub const fn is_select_all(&self) -> bool {
        self.current.is_none()
    }

    /// Bumped on every change; used to key derived caches such as overlay dashes.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the selection. Degenerate shapes are ignored.
    ///
    /// Returns whether the selection changed.
    pub fn set(&mut self, shape: SelectionShape) -> bool {
        if shape.is_degenerate() {
            tracing::trace!("ignoring degenerate selection");
            return false;
        }
        self.replace(Some(shape))
    }

    /// Select the whole canvas. Returns whether the selection changed.
    pub fn select_all(&mut self) -> bool {
        self.replace(None)
    }

    fn replace(&mut self, next: Option<SelectionShape>) -> bool {
        if self.current == next {
            return false;
        }
        let previous = std::mem::replace(&mut self.current, next);
        self.undo.push_back(previous);
        if self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
        self.redo.clear();
        self.revision += 1;
        true
    }

    /// Whether [`Self::undo`] would do anything.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether [`Self::redo`] would do anything.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Restore the previous selection. No-op on an empty stack.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, previous);
        self.redo.push(current);
        self.revision += 1;
        true
    }

    /// Re-apply the last undone selection. No-op on an empty redo tail.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, next);
        self.undo.push_back(current);
        self.revision += 1;
        true
    }

    /// Hit test; everything is inside a select-all.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        self.current.as_ref().map_or(true, |s| s.contains(p))
    }

    /// Selected region clipped to the canvas.
    #[must_use]
    pub fn bounds(&self, canvas: CanvasSize) -> Bounds {
        let full = canvas.bounds();
        self.current.as_ref().map_or(full, |s| {
            s.bounds().intersection(&full).unwrap_or_else(Bounds::empty)
        })
    }

    /// Shift the selection, e.g. after a canvas resize. Not recorded for undo.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        if let Some(shape) = &self.current {
            self.current = Some(shape.translated(dx, dy));
            self.revision += 1;
        }
    }

    /// Drop the undo history.
    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
