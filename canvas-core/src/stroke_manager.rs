//! In-progress stroke lifecycle.

use crate::{BrushParams, Stroke, StrokePoint};

/// Drawing state.
#[derive(Debug, Clone, PartialEq)]
enum StrokeState {
    Idle,
    Drawing {
        points: Vec<StrokePoint>,
        brush: BrushParams,
    },
}

/// Builds one stroke at a time from pointer samples.
///
/// `Idle -> Drawing -> Idle`. Starting while already drawing and updating
/// while idle are silently ignored.
#[derive(Debug, Clone)]
pub struct StrokeManager {
    state: StrokeState,
    completed: u64,
}

impl StrokeManager {
    /// Create an idle manager.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: StrokeState::Idle,
            completed: 0,
        }
    }

    /// Whether a stroke is in progress.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    /// Number of strokes finished since creation.
    #[must_use]
    pub const fn completed_count(&self) -> u64 {
        self.completed
    }

    /// Open a new stroke. Returns `false` if one is already open.
    pub fn start_stroke(&mut self, point: StrokePoint, brush: BrushParams) -> bool {
        if self.is_drawing() {
            tracing::trace!("start_stroke ignored: already drawing");
            return false;
        }
        if !point.position().is_finite() {
            return false;
        }
        self.state = StrokeState::Drawing {
            points: vec![point],
            brush,
        };
        true
    }

    /// Append a sample. No-op when idle, for non-finite input, or for an exact repeat.
    pub fn update_stroke(&mut self, point: StrokePoint) {
        let StrokeState::Drawing { points, .. } = &mut self.state else {
            return;
        };
        if !point.position().is_finite() || points.last() == Some(&point) {
            return;
        }
        points.push(point);
    }

    /// Finish the stroke and return to idle.
    pub fn end_stroke(&mut self) -> Option<Stroke> {
        match std::mem::replace(&mut self.state, StrokeState::Idle) {
            StrokeState::Drawing { points, brush } => {
                self.completed += 1;
                tracing::trace!(points = points.len(), "stroke finished");
                Some(Stroke::new(points, brush))
            }
            StrokeState::Idle => None,
        }
    }

    /// Drop the in-progress stroke without committing it.
    pub fn cancel(&mut self) -> bool {
        let was_drawing = self.is_drawing();
        if was_drawing {
            tracing::debug!("in-progress stroke cancelled");
        }
        self.state = StrokeState::Idle;
        was_drawing
    }

    /// Snapshot of the in-progress stroke for live rendering.
    #[must_use]
    pub fn live_stroke(&self) -> Option<Stroke> {
        match &self.state {
            StrokeState::Drawing { points, brush } => Some(Stroke::new(points.clone(), *brush)),
            StrokeState::Idle => None,
        }
    }

    /// Brush of the in-progress stroke.
    #[must_use]
    pub fn live_brush(&self) -> Option<&BrushParams> {
        match &self.state {
            StrokeState::Drawing { brush, .. } => Some(brush),
            StrokeState::Idle => None,
        }
    }

    /// Samples collected so far.
    #[must_use]
    pub fn live_points(&self) -> &[StrokePoint] {
        match &self.state {
            StrokeState::Drawing { points, .. } => points,
            StrokeState::Idle => &[],
        }
    }
}

impl Default for StrokeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut sm = StrokeManager::new();
        assert!(!sm.is_drawing());
        assert!(sm.start_stroke(StrokePoint::new(0.0, 0.0), BrushParams::default()));
        sm.update_stroke(StrokePoint::new(1.0, 1.0));
        sm.update_stroke(StrokePoint::new(2.0, 2.0));
        let stroke = sm.end_stroke().expect("stroke");
        assert_eq!(stroke.len(), 3);
        assert!(!sm.is_drawing());
        assert_eq!(sm.completed_count(), 1);
    }

    #[test]
    fn test_start_while_drawing_ignored() {
        let mut sm = StrokeManager::new();
        sm.start_stroke(StrokePoint::new(0.0, 0.0), BrushParams::default());
        assert!(!sm.start_stroke(StrokePoint::new(9.0, 9.0), BrushParams::default()));
        assert_eq!(sm.live_points(), &[StrokePoint::new(0.0, 0.0)]);
    }

    #[test]
    fn test_update_when_idle_is_noop() {
        let mut sm = StrokeManager::new();
        sm.update_stroke(StrokePoint::new(1.0, 1.0));
        assert!(sm.live_points().is_empty());
        assert!(sm.end_stroke().is_none());
    }

    #[test]
    fn test_cancel_discards() {
        let mut sm = StrokeManager::new();
        sm.start_stroke(StrokePoint::new(0.0, 0.0), BrushParams::default());
        assert!(sm.cancel());
        assert!(sm.end_stroke().is_none());
        assert_eq!(sm.completed_count(), 0);
        assert!(!sm.cancel());
    }

    #[test]
    fn test_rejects_non_finite_and_repeats() {
        let mut sm = StrokeManager::new();
        assert!(!sm.start_stroke(StrokePoint::new(f32::NAN, 0.0), BrushParams::default()));
        sm.start_stroke(StrokePoint::new(0.0, 0.0), BrushParams::default());
        sm.update_stroke(StrokePoint::new(0.0, 0.0));
        sm.update_stroke(StrokePoint::new(f32::INFINITY, 0.0));
        assert_eq!(sm.live_points().len(), 1);
    }
}
