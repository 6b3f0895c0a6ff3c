//! The action catalogue.
//!
//! Actions that remove layers keep the removed `Layer` values and reinsert
//! them on undo, so IDs and content survive any number of undo/redo cycles.

use std::sync::Arc;

use super::Action;
use crate::layer::{Layer, LayerContent};
use crate::layer_manager::{flatten_layers, merge_layers};
use crate::{Anchor, BlendMode, CanvasError, CanvasResult, CanvasSize, LayerId, LayerStack, Stroke};

fn missing(id: LayerId) -> CanvasError {
    CanvasError::LayerNotFound(id)
}

fn not_executed(what: &str) -> CanvasError {
    CanvasError::InvalidOperation(format!("{what} has not been executed"))
}

/// Reinsert `(index, layer)` pairs in ascending index order.
fn reinsert(stack: &mut dyn LayerStack, mut layers: Vec<(usize, Layer)>) -> CanvasResult<()> {
    layers.sort_by_key(|(i, _)| *i);
    for (index, layer) in layers {
        stack.insert_layer(index, layer)?;
    }
    Ok(())
}

fn restore_active(stack: &mut dyn LayerStack, id: Option<LayerId>) {
    if let Some(id) = id {
        // The layer may legitimately be gone (e.g. deleted by this action's undo).
        let _ = stack.set_active_layer(id);
    }
}

// -------------------------------------------------------------------------
// Strokes and content
// -------------------------------------------------------------------------

/// Append a committed stroke to a layer.
#[derive(Debug)]
pub struct AddStroke {
    layer: LayerId,
    stroke: Arc<Stroke>,
}

impl AddStroke {
    /// Create the action.
    #[must_use]
    pub fn new(layer: LayerId, stroke: impl Into<Arc<Stroke>>) -> Self {
        Self {
            layer,
            stroke: stroke.into(),
        }
    }
}

impl Action for AddStroke {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        stack.layer_mut(self.layer)?.add_stroke(Arc::clone(&self.stroke))
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let layer = stack.layer_mut(self.layer)?;
        match layer.strokes().last() {
            Some(last) if Arc::ptr_eq(last, &self.stroke) => {
                layer.pop_stroke();
                Ok(())
            }
            _ => Err(CanvasError::InvalidOperation(
                "stroke is no longer the newest on its layer".to_string(),
            )),
        }
    }

    fn description(&self) -> String {
        "Brush Stroke".to_string()
    }
}

/// Remove every stroke and the base image from a layer.
#[derive(Debug)]
pub struct ClearLayer {
    layer: LayerId,
    removed: Option<LayerContent>,
}

impl ClearLayer {
    /// Create the action.
    #[must_use]
    pub const fn new(layer: LayerId) -> Self {
        Self {
            layer,
            removed: None,
        }
    }
}

impl Action for ClearLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let layer = stack.layer_mut(self.layer)?;
        if layer.is_locked() {
            return Err(CanvasError::LayerLocked(self.layer));
        }
        self.removed = Some(layer.clear_content());
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let content = self.removed.take().ok_or_else(|| not_executed("Clear Layer"))?;
        stack.layer_mut(self.layer)?.restore_content(content);
        Ok(())
    }

    fn description(&self) -> String {
        "Clear Layer".to_string()
    }
}

// -------------------------------------------------------------------------
// Layer structure
// -------------------------------------------------------------------------

/// Add a layer above the active one and make it active.
#[derive(Debug)]
pub struct AddLayer {
    name: String,
    index: Option<usize>,
    layer: Option<Layer>,
    id: Option<LayerId>,
    previous_active: Option<LayerId>,
}

impl AddLayer {
    /// Add an empty layer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            layer: None,
            id: None,
            previous_active: None,
        }
    }

    /// Add a prepared layer, e.g. one holding an imported image.
    #[must_use]
    pub fn with_layer(layer: Layer) -> Self {
        Self {
            name: layer.name().to_string(),
            index: None,
            id: Some(layer.id()),
            layer: Some(layer),
            previous_active: None,
        }
    }

    /// ID of the added layer, once executed.
    #[must_use]
    pub const fn layer_id(&self) -> Option<LayerId> {
        self.id
    }
}

impl Action for AddLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let layer = self
            .layer
            .take()
            .unwrap_or_else(|| stack.new_layer(&self.name));
        let index = *self.index.get_or_insert_with(|| {
            stack
                .active_layer()
                .and_then(|a| stack.index_of(a))
                .map_or(stack.len(), |i| i + 1)
        });
        let id = layer.id();
        self.previous_active = stack.active_layer();
        stack.insert_layer(index.min(stack.len()), layer)?;
        stack.set_active_layer(id)?;
        self.id = Some(id);
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let id = self.id.ok_or_else(|| not_executed("Add Layer"))?;
        let (_, layer) = stack.remove_layer(id)?;
        self.layer = Some(layer);
        restore_active(stack, self.previous_active);
        Ok(())
    }

    fn description(&self) -> String {
        "Add Layer".to_string()
    }
}

/// Remove a layer.
#[derive(Debug)]
pub struct DeleteLayer {
    layer: LayerId,
    removed: Option<(usize, Layer)>,
    was_active: bool,
}

impl DeleteLayer {
    /// Create the action.
    #[must_use]
    pub const fn new(layer: LayerId) -> Self {
        Self {
            layer,
            removed: None,
            was_active: false,
        }
    }
}

impl Action for DeleteLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        self.was_active = stack.active_layer() == Some(self.layer);
        self.removed = Some(stack.remove_layer(self.layer)?);
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let (index, layer) = self.removed.take().ok_or_else(|| not_executed("Delete Layer"))?;
        stack.insert_layer(index, layer)?;
        if self.was_active {
            stack.set_active_layer(self.layer)?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        "Delete Layer".to_string()
    }
}

/// Copy a layer directly above itself.
#[derive(Debug)]
pub struct DuplicateLayer {
    source: LayerId,
    copy: Option<Layer>,
    copy_id: Option<LayerId>,
    previous_active: Option<LayerId>,
}

impl DuplicateLayer {
    /// Create the action.
    #[must_use]
    pub const fn new(source: LayerId) -> Self {
        Self {
            source,
            copy: None,
            copy_id: None,
            previous_active: None,
        }
    }

    /// ID of the copy, once executed.
    #[must_use]
    pub const fn copy_id(&self) -> Option<LayerId> {
        self.copy_id
    }
}

impl Action for DuplicateLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let index = stack.index_of(self.source).ok_or_else(|| missing(self.source))?;
        let copy = match self.copy.take() {
            Some(copy) => copy,
            None => {
                let source = stack.layer(self.source).ok_or_else(|| missing(self.source))?;
                source.duplicate(format!("{} copy", source.name()))
            }
        };
        let id = copy.id();
        self.previous_active = stack.active_layer();
        stack.insert_layer(index + 1, copy)?;
        stack.set_active_layer(id)?;
        self.copy_id = Some(id);
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let id = self.copy_id.ok_or_else(|| not_executed("Duplicate Layer"))?;
        let (_, copy) = stack.remove_layer(id)?;
        self.copy = Some(copy);
        restore_active(stack, self.previous_active);
        Ok(())
    }

    fn description(&self) -> String {
        "Duplicate Layer".to_string()
    }
}

/// Move a layer to another stack position.
#[derive(Debug)]
pub struct ReorderLayer {
    layer: LayerId,
    to: usize,
    from: Option<usize>,
}

impl ReorderLayer {
    /// Create the action.
    #[must_use]
    pub const fn new(layer: LayerId, to: usize) -> Self {
        Self {
            layer,
            to,
            from: None,
        }
    }
}

impl Action for ReorderLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        self.from = Some(stack.move_layer(self.layer, self.to)?);
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let from = self.from.ok_or_else(|| not_executed("Reorder Layer"))?;
        stack.move_layer(self.layer, from)?;
        Ok(())
    }

    fn description(&self) -> String {
        "Reorder Layer".to_string()
    }
}

/// Merge a layer into the one below it, replacing both with a new layer.
#[derive(Debug)]
pub struct MergeLayers {
    upper: LayerId,
    lower: Option<LayerId>,
    originals: Vec<(usize, Layer)>,
    merged: Option<Layer>,
    merged_id: Option<LayerId>,
    previous_active: Option<LayerId>,
}

impl MergeLayers {
    /// Merge `upper` down into the layer directly below it.
    #[must_use]
    pub const fn new(upper: LayerId) -> Self {
        Self {
            upper,
            lower: None,
            originals: Vec::new(),
            merged: None,
            merged_id: None,
            previous_active: None,
        }
    }

    /// ID of the merged layer, once executed.
    #[must_use]
    pub const fn merged_id(&self) -> Option<LayerId> {
        self.merged_id
    }
}

impl Action for MergeLayers {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let upper_index = stack.index_of(self.upper).ok_or_else(|| missing(self.upper))?;
        let lower = match self.lower {
            Some(lower) => lower,
            None => {
                let below = upper_index.checked_sub(1).ok_or_else(|| {
                    CanvasError::InvalidOperation("no layer below to merge into".to_string())
                })?;
                stack.ids()[below]
            }
        };
        for id in [lower, self.upper] {
            if stack.layer(id).ok_or_else(|| missing(id))?.is_locked() {
                return Err(CanvasError::LayerLocked(id));
            }
        }

        self.previous_active = stack.active_layer();
        let (upper_index, mut upper) = stack.remove_layer(self.upper)?;
        let (lower_index, mut lower_layer) = match stack.remove_layer(lower) {
            Ok(removed) => removed,
            Err(err) => {
                stack.insert_layer(upper_index, upper)?;
                return Err(err);
            }
        };
        let merged = match self.merged.take() {
            Some(merged) => Ok(merged),
            None => merge_layers(&mut lower_layer, &mut upper),
        };
        let originals = vec![(lower_index, lower_layer), (upper_index, upper)];
        let merged = match merged {
            Ok(merged) => merged,
            Err(err) => {
                reinsert(stack, originals)?;
                restore_active(stack, self.previous_active);
                return Err(err);
            }
        };

        let merged_id = merged.id();
        stack.insert_layer(lower_index, merged)?;
        stack.set_active_layer(merged_id)?;
        self.lower = Some(lower);
        self.originals = originals;
        self.merged_id = Some(merged_id);
        tracing::debug!(upper = %self.upper, lower = %lower, merged = %merged_id, "layers merged");
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let merged_id = self.merged_id.ok_or_else(|| not_executed("Merge Layers"))?;
        let (_, merged) = stack.remove_layer(merged_id)?;
        self.merged = Some(merged);
        reinsert(stack, std::mem::take(&mut self.originals))?;
        restore_active(stack, self.previous_active);
        Ok(())
    }

    fn description(&self) -> String {
        "Merge Layers".to_string()
    }
}

/// Bake all visible layers into a single layer.
#[derive(Debug, Default)]
pub struct FlattenImage {
    originals: Vec<Layer>,
    original_ids: Vec<LayerId>,
    flat: Option<Layer>,
    flat_id: Option<LayerId>,
    previous_active: Option<LayerId>,
}

impl FlattenImage {
    /// Create the action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ID of the flattened layer, once executed.
    #[must_use]
    pub const fn flat_id(&self) -> Option<LayerId> {
        self.flat_id
    }
}

impl Action for FlattenImage {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        if stack.is_empty() {
            return Err(CanvasError::InvalidOperation("nothing to flatten".to_string()));
        }
        self.previous_active = stack.active_layer();
        let ids = stack.ids();
        let mut layers = Vec::with_capacity(ids.len());
        for id in ids.iter().rev() {
            layers.push(stack.remove_layer(*id)?.1);
        }
        layers.reverse();

        let flat = match self.flat.take() {
            Some(flat) => Ok(flat),
            None => flatten_layers(&mut layers, stack.canvas_size(), stack.policy()),
        };
        let flat = match flat {
            Ok(flat) => flat,
            Err(err) => {
                reinsert(stack, layers.into_iter().enumerate().collect())?;
                restore_active(stack, self.previous_active);
                return Err(err);
            }
        };
        let flat_id = flat.id();
        stack.insert_layer(0, flat)?;
        stack.set_active_layer(flat_id)?;
        self.originals = layers;
        self.original_ids = ids;
        self.flat_id = Some(flat_id);
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let flat_id = self.flat_id.ok_or_else(|| not_executed("Flatten Image"))?;
        let (_, flat) = stack.remove_layer(flat_id)?;
        self.flat = Some(flat);
        let originals = std::mem::take(&mut self.originals);
        reinsert(stack, originals.into_iter().enumerate().collect())?;
        restore_active(stack, self.previous_active);
        debug_assert_eq!(stack.ids(), self.original_ids);
        Ok(())
    }

    fn description(&self) -> String {
        "Flatten Image".to_string()
    }
}

/// Change the canvas size, moving all content by the anchor offset.
#[derive(Debug)]
pub struct ResizeCanvas {
    size: CanvasSize,
    anchor: Anchor,
    previous: Option<CanvasSize>,
    offset: Option<(f32, f32)>,
    before: Vec<(LayerId, LayerContent)>,
    after: Vec<(LayerId, LayerContent)>,
}

impl ResizeCanvas {
    /// Create the action.
    #[must_use]
    pub const fn new(size: CanvasSize, anchor: Anchor) -> Self {
        Self {
            size,
            anchor,
            previous: None,
            offset: None,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    fn snapshot(stack: &dyn LayerStack) -> Vec<(LayerId, LayerContent)> {
        stack
            .ids()
            .into_iter()
            .filter_map(|id| stack.layer(id).map(|l| (id, l.content())))
            .collect()
    }

    fn restore(stack: &mut dyn LayerStack, contents: &[(LayerId, LayerContent)]) -> CanvasResult<()> {
        for (id, content) in contents {
            stack.layer_mut(*id)?.restore_content(content.clone());
        }
        Ok(())
    }
}

impl Action for ResizeCanvas {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        if self.size.is_empty() {
            return Err(CanvasError::InvalidOperation(format!(
                "cannot resize to {}x{}",
                self.size.width, self.size.height
            )));
        }
        let previous = stack.canvas_size();
        let (dx, dy) = self.anchor.offset(previous, self.size);
        self.before = Self::snapshot(stack);
        if self.after.is_empty() {
            for id in stack.ids() {
                stack.layer_mut(id)?.translate(dx, dy);
            }
            self.after = Self::snapshot(stack);
        } else {
            Self::restore(stack, &self.after)?;
        }
        stack.set_canvas_size(self.size);
        self.previous = Some(previous);
        self.offset = Some((dx, dy));
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let previous = self.previous.ok_or_else(|| not_executed("Resize Canvas"))?;
        Self::restore(stack, &self.before)?;
        stack.set_canvas_size(previous);
        Ok(())
    }

    fn description(&self) -> String {
        "Resize Canvas".to_string()
    }

    fn content_offset(&self) -> Option<(f32, f32)> {
        self.offset
    }
}

// -------------------------------------------------------------------------
// Layer properties
// -------------------------------------------------------------------------

macro_rules! property_action {
    (
        $(#[$meta:meta])*
        $name:ident, $ty:ty, $label:literal,
        get: $get:ident,
        set: $set:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            layer: LayerId,
            value: $ty,
            previous: Option<$ty>,
        }

        impl $name {
            /// Create the action.
            #[must_use]
            pub const fn new(layer: LayerId, value: $ty) -> Self {
                Self {
                    layer,
                    value,
                    previous: None,
                }
            }
        }

        impl Action for $name {
            fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
                let layer = stack.layer_mut(self.layer)?;
                self.previous = Some(layer.$get());
                layer.$set(self.value);
                Ok(())
            }

            fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
                let previous = self.previous.ok_or_else(|| not_executed($label))?;
                stack.layer_mut(self.layer)?.$set(previous);
                Ok(())
            }

            fn description(&self) -> String {
                $label.to_string()
            }
        }
    };
}

property_action!(
    /// Set a layer's opacity.
    ChangeOpacity, f32, "Change Opacity",
    get: opacity,
    set: set_opacity
);

property_action!(
    /// Set a layer's blend mode.
    ChangeBlendMode, BlendMode, "Change Blend Mode",
    get: blend_mode,
    set: set_blend_mode
);

property_action!(
    /// Show or hide a layer.
    SetVisibility, bool, "Toggle Visibility",
    get: is_visible,
    set: set_visible
);

property_action!(
    /// Lock or unlock a layer.
    SetLocked, bool, "Toggle Lock",
    get: is_locked,
    set: set_locked
);

/// Rename a layer.
#[derive(Debug)]
pub struct RenameLayer {
    layer: LayerId,
    name: String,
    previous: Option<String>,
}

impl RenameLayer {
    /// Create the action.
    #[must_use]
    pub fn new(layer: LayerId, name: impl Into<String>) -> Self {
        Self {
            layer,
            name: name.into(),
            previous: None,
        }
    }
}

impl Action for RenameLayer {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let layer = stack.layer_mut(self.layer)?;
        self.previous = Some(layer.name().to_string());
        layer.set_name(self.name.clone());
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| not_executed("Rename Layer"))?;
        stack.layer_mut(self.layer)?.set_name(previous);
        Ok(())
    }

    fn description(&self) -> String {
        "Rename Layer".to_string()
    }
}

// -------------------------------------------------------------------------
// Groups
// -------------------------------------------------------------------------

/// Several actions undone and redone as one.
#[derive(Debug)]
pub struct ActionGroup {
    description: String,
    actions: Vec<Box<dyn Action>>,
}

impl ActionGroup {
    /// Create a group. Actions execute in order and undo in reverse.
    #[must_use]
    pub fn new(description: impl Into<String>, actions: Vec<Box<dyn Action>>) -> Self {
        Self {
            description: description.into(),
            actions,
        }
    }
}

impl Action for ActionGroup {
    fn execute(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        for i in 0..self.actions.len() {
            if let Err(err) = self.actions[i].execute(stack) {
                for done in self.actions[..i].iter_mut().rev() {
                    done.undo(stack)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo(&mut self, stack: &mut dyn LayerStack) -> CanvasResult<()> {
        for action in self.actions.iter_mut().rev() {
            action.undo(stack)?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn content_offset(&self) -> Option<(f32, f32)> {
        self.actions
            .iter()
            .filter_map(|a| a.content_offset())
            .reduce(|(ax, ay), (bx, by)| (ax + bx, ay + by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryManager, UndoHistory};
    use crate::notify::ChangeNotifier;
    use crate::{BrushParams, LayerManager, RasterPolicy, StrokePoint};

    fn stack() -> LayerManager {
        LayerManager::new(
            CanvasSize::new(32, 32),
            RasterPolicy::default(),
            Arc::new(ChangeNotifier::default()),
        )
    }

    fn stroke(x: f32) -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(x, 1.0), StrokePoint::new(x + 4.0, 1.0)],
            BrushParams::default(),
        )
    }

    #[test]
    fn test_add_stroke_undo() {
        let mut layers = stack();
        let id = layers.add_layer("A");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(AddStroke::new(id, stroke(1.0))), &mut layers)
            .expect("add");
        assert_eq!(layers.layer(id).expect("layer").stroke_count(), 1);
        history.undo(&mut layers).expect("undo");
        assert_eq!(layers.layer(id).expect("layer").stroke_count(), 0);
        history.redo(&mut layers).expect("redo");
        assert_eq!(layers.layer(id).expect("layer").stroke_count(), 1);
    }

    #[test]
    fn test_clear_layer_restores_content() {
        let mut layers = stack();
        let id = layers.add_layer("A");
        layers.add_stroke(id, stroke(1.0)).expect("stroke");
        layers.add_stroke(id, stroke(8.0)).expect("stroke");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(ClearLayer::new(id)), &mut layers)
            .expect("clear");
        assert!(layers.layer(id).expect("layer").is_empty());
        history.undo(&mut layers).expect("undo");
        let layer = layers.layer(id).expect("layer");
        assert_eq!(layer.stroke_count(), 2);
        assert!(layer.rasterized_count() <= layer.stroke_count());
    }

    #[test]
    fn test_clear_locked_refused() {
        let mut layers = stack();
        let id = layers.add_layer("A");
        layers.layer_mut(id).expect("layer").set_locked(true);
        let mut history = HistoryManager::default();
        assert!(matches!(
            history.execute(Box::new(ClearLayer::new(id)), &mut layers),
            Err(CanvasError::LayerLocked(_))
        ));
    }

    #[test]
    fn test_delete_restores_position_and_active() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let b = layers.add_layer("B");
        let c = layers.add_layer("C");
        layers.set_active_layer(b).expect("active");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(DeleteLayer::new(b)), &mut layers)
            .expect("delete");
        assert_eq!(layers.ids(), vec![a, c]);
        history.undo(&mut layers).expect("undo");
        assert_eq!(layers.ids(), vec![a, b, c]);
        assert_eq!(layers.active_layer(), Some(b));
    }

    #[test]
    fn test_merge_undo_restores_originals() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let b = layers.add_layer("B");
        layers.add_stroke(a, stroke(1.0)).expect("stroke");
        layers.add_stroke(b, stroke(10.0)).expect("stroke");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(MergeLayers::new(b)), &mut layers)
            .expect("merge");
        assert_eq!(layers.len(), 1);
        let merged = layers.ids()[0];
        assert_eq!(layers.layer(merged).expect("merged").stroke_count(), 2);

        history.undo(&mut layers).expect("undo");
        assert_eq!(layers.ids(), vec![a, b]);
        assert!(layers.layer(merged).is_none());

        history.redo(&mut layers).expect("redo");
        assert_eq!(layers.ids(), vec![merged]);
    }

    #[test]
    fn test_merge_bottom_layer_fails() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let mut history = HistoryManager::default();
        assert!(history
            .execute(Box::new(MergeLayers::new(a)), &mut layers)
            .is_err());
        assert_eq!(layers.ids(), vec![a]);
    }

    #[test]
    fn test_flatten_roundtrip() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let b = layers.add_layer("B");
        layers.add_stroke(b, stroke(1.0)).expect("stroke");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(FlattenImage::new()), &mut layers)
            .expect("flatten");
        assert_eq!(layers.len(), 1);
        assert!(layers.layer_at(0).expect("flat").base_image().is_some());
        history.undo(&mut layers).expect("undo");
        assert_eq!(layers.ids(), vec![a, b]);
    }

    #[test]
    fn test_resize_with_anchor() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        layers.add_stroke(a, stroke(1.0)).expect("stroke");
        let mut history = HistoryManager::default();
        history
            .execute(
                Box::new(ResizeCanvas::new(CanvasSize::new(64, 64), Anchor::Center)),
                &mut layers,
            )
            .expect("resize");
        assert_eq!(layers.canvas_size(), CanvasSize::new(64, 64));
        let p = layers.layer(a).expect("layer").strokes()[0].points()[0];
        assert_eq!((p.x, p.y), (17.0, 17.0));
        let offset = history.next_undo().and_then(|a| a.content_offset());
        assert_eq!(offset, Some((16.0, 16.0)));
        history.undo(&mut layers).expect("undo");
        assert_eq!(layers.canvas_size(), CanvasSize::new(32, 32));
        assert!(history.next_undo().is_none());
        assert!(history.next_redo().is_some());
        let p = layers.layer(a).expect("layer").strokes()[0].points()[0];
        assert_eq!((p.x, p.y), (1.0, 1.0));
    }

    #[test]
    fn test_property_actions() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let mut history = HistoryManager::default();
        history
            .execute(Box::new(ChangeOpacity::new(a, 0.25)), &mut layers)
            .expect("opacity");
        history
            .execute(Box::new(RenameLayer::new(a, "Ink")), &mut layers)
            .expect("rename");
        history
            .execute(Box::new(ChangeBlendMode::new(a, BlendMode::Multiply)), &mut layers)
            .expect("blend");
        let layer = layers.layer(a).expect("layer");
        assert_eq!(layer.name(), "Ink");
        assert_eq!(layer.blend_mode(), BlendMode::Multiply);
        for _ in 0..3 {
            history.undo(&mut layers).expect("undo");
        }
        let layer = layers.layer(a).expect("layer");
        assert_eq!(layer.name(), "A");
        assert!((layer.opacity() - 1.0).abs() < f32::EPSILON);
        assert_eq!(layer.blend_mode(), BlendMode::Normal);
    }

    #[test]
    fn test_group_rolls_back_on_failure() {
        let mut layers = stack();
        let a = layers.add_layer("A");
        let group = ActionGroup::new(
            "Bad",
            vec![
                Box::new(ChangeOpacity::new(a, 0.5)),
                Box::new(DeleteLayer::new(LayerId::new())),
            ],
        );
        let mut history = HistoryManager::default();
        assert!(history.execute(Box::new(group), &mut layers).is_err());
        assert!((layers.layer(a).expect("layer").opacity() - 1.0).abs() < f32::EPSILON);
    }
}
