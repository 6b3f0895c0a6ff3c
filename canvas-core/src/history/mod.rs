//! Command-pattern undo/redo.
//!
//! Every structural edit is an [`Action`] with `execute` and `undo`. The
//! history is linear: executing a new action after an undo drops the redo
//! tail, and the oldest entries are evicted past the configured depth.

pub mod actions;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

pub use actions::{
    ActionGroup, AddLayer, AddStroke, ChangeBlendMode, ChangeOpacity, ClearLayer, DeleteLayer,
    DuplicateLayer, FlattenImage, MergeLayers, RenameLayer, ReorderLayer, ResizeCanvas, SetLocked,
    SetVisibility,
};

use crate::notify::{Channel, ChangeNotifier};
use crate::{CanvasResult, HistoryConfig, LayerStack};

/// A reversible edit.
///
/// `execute` may be called again after `undo` (redo) and must reproduce the
/// same state, so actions keep whatever they removed and reinsert it rather
/// than rebuilding it.
pub trait Action: Send + fmt::Debug {
    /// Apply the edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit cannot be applied; the stack is left unchanged.
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()>;

    /// Revert the edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the state the edit produced is no longer present.
    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()>;

    /// Short label for menus ("Merge Layers").
    fn description(&self) -> String;

    /// Distance all canvas content moved when the edit was executed.
    fn content_offset(&self) -> Option<(f32, f32)> {
        None
    }
}

/// Undo/redo as seen by the editor.
pub trait UndoHistory {
    /// Execute an action and record it.
    ///
    /// # Errors
    ///
    /// Propagates the action's error; failed actions are not recorded.
    fn execute(&mut self, action: Box<dyn Action>, stack: &mut dyn LayerStack) -> CanvasResult<()>;

    /// Undo the newest action. Returns `false` if there was nothing to undo.
    ///
    /// # Errors
    ///
    /// Propagates the action's error; the action stays on the undo stack.
    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<bool>;

    /// Redo the last undone action. Returns `false` if the redo tail is empty.
    ///
    /// # Errors
    ///
    /// Propagates the action's error; the action stays on the redo stack.
    fn redo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<bool>;

    /// Whether undo would do anything.
    fn can_undo(&self) -> bool;

    /// Whether redo would do anything.
    fn can_redo(&self) -> bool;

    /// Action [`Self::undo`] would revert.
    fn next_undo(&self) -> Option<&dyn Action>;

    /// Action [`Self::redo`] would apply.
    fn next_redo(&self) -> Option<&dyn Action>;

    /// Drop all entries.
    fn clear(&mut self);
}

/// Bounded linear history.
#[derive(Debug)]
pub struct HistoryManager {
    undo: VecDeque<Box<dyn Action>>,
    redo: Vec<Box<dyn Action>>,
    max_depth: usize,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryManager {
    /// Create an empty history.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: config.max_depth.max(1),
            notifier: None,
        }
    }

    /// Publish availability changes on [`Channel::History`].
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Entries available to undo.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Entries available to redo.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Label of the action [`UndoHistory::undo`] would revert.
    #[must_use]
    pub fn undo_description(&self) -> Option<String> {
        self.undo.back().map(|a| a.description())
    }

    /// Label of the action [`UndoHistory::redo`] would apply.
    #[must_use]
    pub fn redo_description(&self) -> Option<String> {
        self.redo.last().map(|a| a.description())
    }

    fn push_undo(&mut self, action: Box<dyn Action>) {
        self.undo.push_back(action);
        while self.undo.len() > self.max_depth {
            if let Some(evicted) = self.undo.pop_front() {
                tracing::debug!(action = %evicted.description(), "history entry evicted");
            }
        }
    }

    fn changed(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(Channel::History);
        }
    }
}

/// Run one step of an action inside a notification batch.
fn batched<F>(stack: &mut dyn LayerStack, step: F) -> CanvasResult<()>
where
    F: FnOnce(&mut dyn LayerStack) -> CanvasResult<()>,
{
    stack.begin_batch();
    let result = step(&mut *stack);
    stack.flush_warnings();
    stack.end_batch();
    result
}

impl UndoHistory for HistoryManager {
    fn execute(&mut self, mut action: Box<dyn Action>, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        batched(stack, |s| action.execute(s))?;
        tracing::debug!(action = %action.description(), "action executed");
        self.push_undo(action);
        self.redo.clear();
        self.changed();
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<bool> {
        let Some(mut action) = self.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = batched(stack, |s| action.undo(s)) {
            tracing::warn!(action = %action.description(), "undo failed: {err}");
            self.undo.push_back(action);
            return Err(err);
        }
        tracing::debug!(action = %action.description(), "action undone");
        self.redo.push(action);
        self.changed();
        Ok(true)
    }

    fn redo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<bool> {
        let Some(mut action) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(err) = batched(stack, |s| action.execute(s)) {
            tracing::warn!(action = %action.description(), "redo failed: {err}");
            self.redo.push(action);
            return Err(err);
        }
        tracing::debug!(action = %action.description(), "action redone");
        self.push_undo(action);
        self.changed();
        Ok(true)
    }

    fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn next_undo(&self) -> Option<&dyn Action> {
        self.undo.back().map(Box::as_ref)
    }

    fn next_redo(&self) -> Option<&dyn Action> {
        self.redo.last().map(Box::as_ref)
    }

    fn clear(&mut self) {
        if self.undo.is_empty() && self.redo.is_empty() {
            return;
        }
        self.undo.clear();
        self.redo.clear();
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanvasSize, LayerManager, RasterPolicy};

    fn stack() -> LayerManager {
        LayerManager::new(
            CanvasSize::new(32, 32),
            RasterPolicy::default(),
            Arc::new(ChangeNotifier::default()),
        )
    }

    #[test]
    fn test_empty_undo_redo_are_noops() {
        let mut history = HistoryManager::default();
        let mut layers = stack();
        assert!(!history.undo(&mut layers).expect("undo"));
        assert!(!history.redo(&mut layers).expect("redo"));
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut history = HistoryManager::default();
        let mut layers = stack();
        history
            .execute(Box::new(AddLayer::new("A")), &mut layers)
            .expect("add");
        history.undo(&mut layers).expect("undo");
        assert!(history.can_redo());
        history
            .execute(Box::new(AddLayer::new("B")), &mut layers)
            .expect("add");
        assert!(!history.can_redo());
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_depth_evicts_oldest() {
        let mut history = HistoryManager::new(HistoryConfig { max_depth: 2 });
        let mut layers = stack();
        for name in ["A", "B", "C"] {
            history
                .execute(Box::new(AddLayer::new(name)), &mut layers)
                .expect("add");
        }
        assert_eq!(history.undo_len(), 2);
        assert!(history.undo(&mut layers).expect("undo"));
        assert!(history.undo(&mut layers).expect("undo"));
        assert!(!history.undo(&mut layers).expect("exhausted"));
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_failed_action_not_recorded() {
        let mut history = HistoryManager::default();
        let mut layers = stack();
        let result = history.execute(
            Box::new(DeleteLayer::new(crate::LayerId::new())),
            &mut layers,
        );
        assert!(result.is_err());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_history_channel_notified_once_per_step() {
        let notifier = Arc::new(ChangeNotifier::default());
        let mut rx = notifier.subscribe(Channel::History);
        let mut history = HistoryManager::default().with_notifier(Arc::clone(&notifier));
        let mut layers = LayerManager::new(
            CanvasSize::new(8, 8),
            RasterPolicy::default(),
            Arc::clone(&notifier),
        );
        history
            .execute(Box::new(AddLayer::new("A")), &mut layers)
            .expect("add");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_descriptions() {
        let mut history = HistoryManager::default();
        let mut layers = stack();
        history
            .execute(Box::new(AddLayer::new("A")), &mut layers)
            .expect("add");
        assert_eq!(history.undo_description().as_deref(), Some("Add Layer"));
        history.undo(&mut layers).expect("undo");
        assert_eq!(history.redo_description().as_deref(), Some("Add Layer"));
    }
}
