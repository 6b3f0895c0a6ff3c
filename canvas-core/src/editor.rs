//! Editor coordinator.
//!
//! [`CanvasEditor`] owns the document parts but contains no editing logic of
//! its own: input goes to the active tool through [`ToolContext`], structural
//! edits go through [`UndoHistory`] as actions, and rasterization is left to
//! a [`RasterScheduler`].

use std::sync::Arc;

use crate::document::{AssetResolver, CanvasRecord, ImageCodec};
use crate::history::{
    Action, AddLayer, AddStroke, ChangeBlendMode, ChangeOpacity, ClearLayer, DeleteLayer,
    DuplicateLayer, FlattenImage, HistoryManager, MergeLayers, RenameLayer, ReorderLayer,
    ResizeCanvas, SetLocked, SetVisibility, UndoHistory,
};
use crate::layer::BaseImage;
use crate::notify::{Channel, ChangeNotifier};
use crate::scheduler::{FlushReport, RasterScheduler};
use crate::tools::{
    Activation, CursorShape, MemorySettingsStore, SettingsStore, ToolContext, ToolId, ToolManager,
};
use crate::{
    Anchor, BlendMode, CanvasController, CanvasError, CanvasResult, CanvasSize, ColorManager,
    EditorConfig, InputEvent, KeyEvent, LayerId, LayerManager, LayerStack, Point,
    SelectionManager, Stroke, StrokeManager,
};

/// Borrowed view of the editor handed to tools.
struct EditorContext<'a> {
    layers: &'a mut LayerManager,
    history: &'a mut dyn UndoHistory,
    strokes: &'a mut StrokeManager,
    viewport: &'a mut CanvasController,
    selection: &'a mut SelectionManager,
    colors: &'a mut ColorManager,
    notifier: &'a ChangeNotifier,
    blur_coefficient: f32,
}

impl ToolContext for EditorContext<'_> {
    fn strokes(&mut self) -> &mut StrokeManager {
        self.strokes
    }

    fn viewport(&mut self) -> &mut CanvasController {
        self.viewport
    }

    fn selection(&mut self) -> &mut SelectionManager {
        self.selection
    }

    fn colors(&mut self) -> &mut ColorManager {
        self.colors
    }

    fn blur_coefficient(&self) -> f32 {
        self.blur_coefficient
    }

    fn commit_stroke(&mut self, stroke: Stroke) -> CanvasResult<()> {
        let layer = self
            .layers
            .active_layer()
            .ok_or_else(|| CanvasError::InvalidOperation("no active layer".to_string()))?;
        self.history
            .execute(Box::new(AddStroke::new(layer, stroke)), &mut *self.layers)
    }

    fn notify(&self, channel: Channel) {
        self.notifier.notify(channel);
    }
}

/// The editing session for one document.
pub struct CanvasEditor {
    config: EditorConfig,
    layers: LayerManager,
    history: Box<dyn UndoHistory + Send>,
    tools: ToolManager,
    strokes: StrokeManager,
    selection: SelectionManager,
    viewport: CanvasController,
    colors: ColorManager,
    scheduler: RasterScheduler,
    codec: Option<Arc<dyn ImageCodec>>,
    notifier: Arc<ChangeNotifier>,
    hover: Option<Point>,
}

impl std::fmt::Debug for CanvasEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasEditor")
            .field("size", &self.layers.canvas_size())
            .field("layers", &self.layers.len())
            .field("tool", &self.tools.active_tool())
            .field("drawing", &self.strokes.is_drawing())
            .finish_non_exhaustive()
    }
}

impl CanvasEditor {
    /// Assemble an editor from its parts.
    ///
    /// The layer stack and the tool manager must share `notifier`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        config: EditorConfig,
        layers: LayerManager,
        history: Box<dyn UndoHistory + Send>,
        tools: ToolManager,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        let size = layers.canvas_size();
        Self {
            scheduler: RasterScheduler::new(config.raster),
            strokes: StrokeManager::new(),
            selection: SelectionManager::new(config.selection_history_depth),
            viewport: CanvasController::new(size, size.width as f32, size.height as f32),
            colors: ColorManager::new(config.recent_colors),
            codec: None,
            hover: None,
            config,
            layers,
            history,
            tools,
            notifier,
        }
    }

    /// A blank document with one layer, default history and in-memory tool settings.
    #[must_use]
    pub fn blank(size: CanvasSize, config: EditorConfig) -> Self {
        Self::with_settings_store(size, config, Arc::new(MemorySettingsStore::new()))
    }

    /// A blank document whose tool settings persist through `store`.
    #[must_use]
    pub fn with_settings_store(
        size: CanvasSize,
        config: EditorConfig,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        let notifier = Arc::new(ChangeNotifier::new(config.notify_capacity));
        let mut layers = LayerManager::new(size, config.raster, Arc::clone(&notifier));
        layers.add_layer("Background");
        let history = HistoryManager::new(config.history).with_notifier(Arc::clone(&notifier));
        let tools = ToolManager::with_builtin_tools(store, Arc::clone(&notifier));
        Self::new(config, layers, Box::new(history), tools, notifier)
    }

    /// Attach the image codec used for imports and persistence.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    fn context(&mut self) -> (&mut ToolManager, EditorContext<'_>) {
        (
            &mut self.tools,
            EditorContext {
                layers: &mut self.layers,
                history: self.history.as_mut(),
                strokes: &mut self.strokes,
                viewport: &mut self.viewport,
                selection: &mut self.selection,
                colors: &mut self.colors,
                notifier: &self.notifier,
                blur_coefficient: self.config.raster.blur_coefficient,
            },
        )
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Notification hub.
    #[must_use]
    pub const fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Layer stack.
    #[must_use]
    pub const fn layers(&self) -> &LayerManager {
        &self.layers
    }

    /// Layer stack, mutably (rendering refreshes caches).
    pub fn layers_mut(&mut self) -> &mut LayerManager {
        &mut self.layers
    }

    /// Undo history.
    #[must_use]
    pub fn history(&self) -> &dyn UndoHistory {
        self.history.as_ref()
    }

    /// Tool manager.
    #[must_use]
    pub const fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Tool manager, mutably (settings edits).
    pub fn tools_mut(&mut self) -> &mut ToolManager {
        &mut self.tools
    }

    /// Viewport.
    #[must_use]
    pub const fn viewport(&self) -> &CanvasController {
        &self.viewport
    }

    /// Viewport, mutably. Changes publish nothing; hosts repaint on their own schedule.
    pub fn viewport_mut(&mut self) -> &mut CanvasController {
        &mut self.viewport
    }

    /// Selection.
    #[must_use]
    pub const fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    /// Colors.
    #[must_use]
    pub const fn colors(&self) -> &ColorManager {
        &self.colors
    }

    /// Colors, mutably.
    pub fn colors_mut(&mut self) -> &mut ColorManager {
        &mut self.colors
    }

    /// The stroke being drawn and its target layer.
    #[must_use]
    pub fn live_stroke(&self) -> Option<(LayerId, Stroke)> {
        let layer = self.layers.active_layer()?;
        self.strokes.live_stroke().map(|s| (layer, s))
    }

    /// Last hover position in screen space.
    #[must_use]
    pub const fn hover(&self) -> Option<Point> {
        self.hover
    }

    /// Cursor of the active tool.
    #[must_use]
    pub fn cursor(&self) -> Option<CursorShape> {
        self.tools.cursor()
    }

    // ---------------------------------------------------------------------
    // Input
    // ---------------------------------------------------------------------

    /// Route host input.
    ///
    /// Pointer events go to the active tool. Hover only moves the cursor and
    /// publishes nothing, so the layer composite is not redrawn.
    ///
    /// # Errors
    ///
    /// Propagates errors from committing work (e.g. drawing on a locked layer).
    pub fn handle_input(&mut self, event: &InputEvent) -> CanvasResult<()> {
        match event {
            InputEvent::Pointer(pointer) => {
                self.hover = Some(pointer.position());
                let (tools, mut ctx) = self.context();
                tools.handle_pointer(pointer, &mut ctx)
            }
            InputEvent::Key(key) => self.handle_key(key),
            InputEvent::Hover { x, y } => {
                self.hover = Some(Point::new(*x, *y));
                Ok(())
            }
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) -> CanvasResult<()> {
        if !key.pressed {
            return Ok(());
        }
        let m = key.modifiers;
        match key.key.to_ascii_lowercase().as_str() {
            "z" if m.command() && m.shift => self.redo().map(|_| ()),
            "z" if m.command() => self.undo().map(|_| ()),
            "y" if m.command() => self.redo().map(|_| ()),
            "escape" => {
                self.cancel_interaction();
                Ok(())
            }
            "x" if !m.command() => {
                self.colors.swap();
                self.notifier.notify(Channel::Tool);
                Ok(())
            }
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !m.command() && !m.alt => {
                        if let Some(id) = self.tools.tool_for_shortcut(c) {
                            self.activate_tool(id).map(|_| ())
                        } else {
                            Ok(())
                        }
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Drop the in-progress interaction without committing it.
    pub fn cancel_interaction(&mut self) {
        let (tools, mut ctx) = self.context();
        tools.cancel(&mut ctx);
    }

    // ---------------------------------------------------------------------
    // Tools
    // ---------------------------------------------------------------------

    /// Switch tools; see [`ToolManager::activate`].
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] for an unregistered tool.
    pub fn activate_tool(&mut self, id: ToolId) -> CanvasResult<Activation> {
        let (tools, mut ctx) = self.context();
        tools.activate(id, &mut ctx)
    }

    /// Report a finished warm-up.
    pub fn complete_activation(&mut self, ticket: u64) -> bool {
        self.tools.complete_activation(ticket)
    }

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    /// Execute an action through history.
    ///
    /// # Errors
    ///
    /// Propagates the action's error.
    pub fn execute(&mut self, action: Box<dyn Action>) -> CanvasResult<()> {
        self.history.execute(action, &mut self.layers)?;
        let offset = self.history.next_undo().and_then(Action::content_offset);
        self.sync_canvas_size();
        if let Some((dx, dy)) = offset {
            self.shift_selection(dx, dy);
        }
        Ok(())
    }

    /// Undo the newest action. Cancels an in-progress stroke first.
    ///
    /// # Errors
    ///
    /// Propagates the action's error.
    pub fn undo(&mut self) -> CanvasResult<bool> {
        self.cancel_interaction();
        let offset = self.history.next_undo().and_then(Action::content_offset);
        let undone = self.history.undo(&mut self.layers)?;
        self.sync_canvas_size();
        if let (true, Some((dx, dy))) = (undone, offset) {
            self.shift_selection(-dx, -dy);
        }
        Ok(undone)
    }

    /// Redo the last undone action.
    ///
    /// # Errors
    ///
    /// Propagates the action's error.
    pub fn redo(&mut self) -> CanvasResult<bool> {
        self.cancel_interaction();
        let offset = self.history.next_redo().and_then(Action::content_offset);
        let redone = self.history.redo(&mut self.layers)?;
        self.sync_canvas_size();
        if let (true, Some((dx, dy))) = (redone, offset) {
            self.shift_selection(dx, dy);
        }
        Ok(redone)
    }

    /// Keep the selection over the content an action moved.
    fn shift_selection(&mut self, dx: f32, dy: f32) {
        let revision = self.selection.revision();
        self.selection.translate(dx, dy);
        if self.selection.revision() != revision {
            self.notifier.notify(Channel::Selection);
        }
    }

    fn sync_canvas_size(&mut self) {
        let size = self.layers.canvas_size();
        if self.viewport.canvas_size() != size {
            self.viewport.set_canvas_size(size);
        }
    }

    fn execute_then_active(&mut self, action: Box<dyn Action>) -> CanvasResult<LayerId> {
        self.execute(action)?;
        self.layers
            .active_layer()
            .ok_or_else(|| CanvasError::InvalidOperation("no active layer".to_string()))
    }

    // ---------------------------------------------------------------------
    // Structural edits
    // ---------------------------------------------------------------------

    /// Add an empty layer above the active one.
    ///
    /// # Errors
    ///
    /// Propagates stack errors.
    pub fn add_layer(&mut self, name: Option<&str>) -> CanvasResult<LayerId> {
        let name = name.map_or_else(|| self.layers.next_layer_name(), str::to_string);
        let layer = self.layers.new_layer(&name);
        let id = layer.id();
        self.execute(Box::new(AddLayer::with_layer(layer)))?;
        Ok(id)
    }

    /// Decode an image and add it as a new layer.
    ///
    /// Unlike a base image referenced from a saved document, an explicit
    /// import that fails to decode is an error.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] without a codec and
    /// [`CanvasError::Decode`] for undecodable bytes.
    pub fn import_image(&mut self, name: &str, bytes: &[u8]) -> CanvasResult<LayerId> {
        let codec = self
            .codec
            .as_ref()
            .ok_or_else(|| CanvasError::InvalidOperation("no image codec".to_string()))?;
        let pixmap = codec.decode(bytes)?;
        tracing::debug!(width = pixmap.width(), height = pixmap.height(), "image imported");
        let mut layer = self.layers.new_layer(name);
        layer.set_base_image(Some(BaseImage::from_pixmap(pixmap)));
        let id = layer.id();
        self.execute(Box::new(AddLayer::with_layer(layer)))?;
        Ok(id)
    }

    /// Delete a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn delete_layer(&mut self, id: LayerId) -> CanvasResult<()> {
        self.execute(Box::new(DeleteLayer::new(id)))
    }

    /// Duplicate a layer; returns the copy's ID.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn duplicate_layer(&mut self, id: LayerId) -> CanvasResult<LayerId> {
        self.execute_then_active(Box::new(DuplicateLayer::new(id)))
    }

    /// Move a layer to a stack position.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown ID or an out-of-range position.
    pub fn reorder_layer(&mut self, id: LayerId, to: usize) -> CanvasResult<()> {
        self.execute(Box::new(ReorderLayer::new(id, to)))
    }

    /// Merge a layer into the one below it; returns the merged layer's ID.
    ///
    /// # Errors
    ///
    /// Returns an error for the bottom layer or locked layers.
    pub fn merge_down(&mut self, upper: LayerId) -> CanvasResult<LayerId> {
        self.execute_then_active(Box::new(MergeLayers::new(upper)))
    }

    /// Flatten all layers into one; returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if the flattened image cannot be allocated.
    pub fn flatten(&mut self) -> CanvasResult<LayerId> {
        self.execute_then_active(Box::new(FlattenImage::new()))
    }

    /// Resize the canvas, re-anchoring content.
    ///
    /// The selection moves with the content, and moves back on undo.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] for an empty size.
    pub fn resize_canvas(&mut self, size: CanvasSize, anchor: Anchor) -> CanvasResult<()> {
        self.execute(Box::new(ResizeCanvas::new(size, anchor)))
    }

    /// Remove every stroke and the base image from a layer.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or locked layer.
    pub fn clear_layer(&mut self, id: LayerId) -> CanvasResult<()> {
        self.execute(Box::new(ClearLayer::new(id)))
    }

    /// Set layer opacity. An unchanged value records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] for a non-finite opacity and
    /// [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f32) -> CanvasResult<()> {
        if !opacity.is_finite() {
            return Err(CanvasError::InvalidOperation(format!("opacity {opacity} is not finite")));
        }
        let current = self.layer_or_err(id)?.opacity();
        if (current - opacity.clamp(0.0, 1.0)).abs() < f32::EPSILON {
            return Ok(());
        }
        self.execute(Box::new(ChangeOpacity::new(id, opacity)))
    }

    /// Set layer blend mode.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn set_layer_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> CanvasResult<()> {
        if self.layer_or_err(id)?.blend_mode() == mode {
            return Ok(());
        }
        self.execute(Box::new(ChangeBlendMode::new(id, mode)))
    }

    /// Show or hide a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> CanvasResult<()> {
        if self.layer_or_err(id)?.is_visible() == visible {
            return Ok(());
        }
        self.execute(Box::new(SetVisibility::new(id, visible)))
    }

    /// Lock or unlock a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) -> CanvasResult<()> {
        if self.layer_or_err(id)?.is_locked() == locked {
            return Ok(());
        }
        self.execute(Box::new(SetLocked::new(id, locked)))
    }

    /// Rename a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> CanvasResult<()> {
        if self.layer_or_err(id)?.name() == name {
            return Ok(());
        }
        self.execute(Box::new(RenameLayer::new(id, name)))
    }

    /// Make a layer the drawing target. Not recorded in history.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    pub fn set_active_layer(&mut self, id: LayerId) -> CanvasResult<()> {
        self.cancel_interaction();
        self.layers.set_active_layer(id)
    }

    fn layer_or_err(&self, id: LayerId) -> CanvasResult<&crate::Layer> {
        self.layers.layer(id).ok_or(CanvasError::LayerNotFound(id))
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    /// Select the whole canvas.
    pub fn select_all(&mut self) {
        if self.selection.select_all() {
            self.notifier.notify(Channel::Selection);
        }
    }

    /// Step back in the selection's own history.
    pub fn undo_selection(&mut self) -> bool {
        let changed = self.selection.undo();
        if changed {
            self.notifier.notify(Channel::Selection);
        }
        changed
    }

    /// Step forward in the selection's own history.
    pub fn redo_selection(&mut self) -> bool {
        let changed = self.selection.redo();
        if changed {
            self.notifier.notify(Channel::Selection);
        }
        changed
    }

    // ---------------------------------------------------------------------
    // Rasterization
    // ---------------------------------------------------------------------

    /// Rasterize every layer whose idle delay or force threshold is reached.
    pub async fn flush_rasters(&mut self) -> FlushReport {
        self.scheduler.flush_due(&mut self.layers).await
    }

    /// Wait out the idle delay, then flush.
    pub async fn rasterize_when_idle(&mut self) -> FlushReport {
        self.scheduler.wait_idle().await;
        self.flush_rasters().await
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Serialize the document to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if an embedded image cannot be encoded.
    pub fn save(&self) -> CanvasResult<String> {
        self.layers.to_record(self.codec.as_deref())?.to_json()
    }

    /// Replace the document with a saved one.
    ///
    /// History and selection start fresh; the viewport is fitted to the new
    /// canvas. On error the current document is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Serialization`] or [`CanvasError::MalformedDocument`].
    pub fn load(&mut self, json: &str, assets: &dyn AssetResolver) -> CanvasResult<()> {
        let record = CanvasRecord::from_json(json)?;
        let layers = LayerManager::from_record(
            record,
            self.config.raster,
            Arc::clone(&self.notifier),
            assets,
            self.codec.as_deref(),
        )?;
        self.cancel_interaction();
        self.replace_document(layers);
        Ok(())
    }

    /// Start over with a blank canvas holding one layer.
    pub fn new_document(&mut self, size: CanvasSize) {
        self.cancel_interaction();
        let mut layers =
            LayerManager::new(size, self.config.raster, Arc::clone(&self.notifier));
        layers.add_layer("Background");
        self.replace_document(layers);
    }

    fn replace_document(&mut self, layers: LayerManager) {
        self.notifier.begin_batch();
        self.layers = layers;
        self.history.clear();
        self.selection = SelectionManager::new(self.config.selection_history_depth);
        self.viewport.set_canvas_size(self.layers.canvas_size());
        self.viewport.fit_to_view();
        for channel in [
            Channel::Render,
            Channel::ActiveLayer,
            Channel::CanvasSize,
            Channel::Selection,
        ] {
            self.notifier.notify(channel);
        }
        self.notifier.end_batch();
        tracing::info!(
            width = self.layers.canvas_size().width,
            height = self.layers.canvas_size().height,
            layers = self.layers.len(),
            "document opened"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryAssets, NoAssets, RawCodec};
    use crate::{Bounds, KeyModifiers, PointerEvent, PointerPhase, SelectionShape};

    fn editor() -> CanvasEditor {
        CanvasEditor::blank(CanvasSize::new(64, 64), EditorConfig::default())
    }

    fn pointer(phase: PointerPhase, x: f32, y: f32) -> InputEvent {
        InputEvent::Pointer(PointerEvent::new(phase, x, y, 0))
    }

    fn draw(editor: &mut CanvasEditor, from: (f32, f32), to: (f32, f32)) {
        editor
            .handle_input(&pointer(PointerPhase::Down, from.0, from.1))
            .expect("down");
        editor
            .handle_input(&pointer(PointerPhase::Up, to.0, to.1))
            .expect("up");
    }

    fn command(key: &str, shift: bool) -> InputEvent {
        InputEvent::Key(KeyEvent::press(
            key,
            KeyModifiers {
                ctrl: true,
                shift,
                ..KeyModifiers::default()
            },
        ))
    }

    #[test]
    fn test_blank_has_background_layer() {
        let editor = editor();
        assert_eq!(editor.layers().len(), 1);
        assert_eq!(
            editor.layers().active().map(crate::Layer::name),
            Some("Background")
        );
    }

    #[test]
    fn test_brush_stroke_goes_through_history() {
        let mut editor = editor();
        editor.activate_tool(ToolId::BRUSH).expect("brush");
        draw(&mut editor, (5.0, 5.0), (20.0, 20.0));
        let active = editor.layers().active().expect("active");
        assert_eq!(active.stroke_count(), 1);

        editor.handle_input(&command("z", false)).expect("undo");
        assert_eq!(editor.layers().active().expect("active").stroke_count(), 0);
        editor.handle_input(&command("z", true)).expect("redo");
        assert_eq!(editor.layers().active().expect("active").stroke_count(), 1);
    }

    #[test]
    fn test_locked_layer_rejects_stroke() {
        let mut editor = editor();
        let id = editor.layers().active_layer().expect("active");
        editor.set_layer_locked(id, true).expect("lock");
        editor.activate_tool(ToolId::BRUSH).expect("brush");
        editor
            .handle_input(&pointer(PointerPhase::Down, 1.0, 1.0))
            .expect("down");
        let result = editor.handle_input(&pointer(PointerPhase::Up, 2.0, 2.0));
        assert!(matches!(result, Err(CanvasError::LayerLocked(_))));
    }

    #[test]
    fn test_tool_shortcut_and_escape() {
        let mut editor = editor();
        editor.activate_tool(ToolId::BRUSH).expect("brush");
        editor
            .handle_input(&pointer(PointerPhase::Down, 1.0, 1.0))
            .expect("down");
        editor
            .handle_input(&InputEvent::Key(KeyEvent::press(
                "Escape",
                KeyModifiers::default(),
            )))
            .expect("escape");
        assert!(editor.live_stroke().is_none());
        editor
            .handle_input(&InputEvent::Key(KeyEvent::press("h", KeyModifiers::default())))
            .expect("pan shortcut");
        assert_eq!(editor.tools().active_tool(), Some(ToolId::PAN));
    }

    #[test]
    fn test_hover_does_not_repaint() {
        let mut editor = editor();
        let mut render = editor.notifier().subscribe(Channel::Render);
        editor
            .handle_input(&InputEvent::Hover { x: 3.0, y: 4.0 })
            .expect("hover");
        assert_eq!(editor.hover(), Some(Point::new(3.0, 4.0)));
        assert!(render.try_recv().is_err());
    }

    #[test]
    fn test_unchanged_opacity_records_nothing() {
        let mut editor = editor();
        let id = editor.layers().active_layer().expect("active");
        editor.set_layer_opacity(id, 1.0).expect("same");
        assert!(!editor.history().can_undo());
        editor.set_layer_opacity(id, 0.5).expect("change");
        assert!(editor.history().can_undo());
    }

    #[test]
    fn test_non_finite_opacity_rejected() {
        let mut editor = editor();
        let id = editor.layers().active_layer().expect("active");
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                editor.set_layer_opacity(id, bad),
                Err(CanvasError::InvalidOperation(_))
            ));
        }
        assert!(!editor.history().can_undo());
        let opacity = editor.layers().layer(id).expect("layer").opacity();
        assert!((opacity - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_resize_keeps_viewport_in_sync() {
        let mut editor = editor();
        editor
            .resize_canvas(CanvasSize::new(128, 32), Anchor::TopLeft)
            .expect("resize");
        assert_eq!(editor.viewport().canvas_size(), CanvasSize::new(128, 32));
        editor.undo().expect("undo");
        assert_eq!(editor.viewport().canvas_size(), CanvasSize::new(64, 64));
    }

    #[test]
    fn test_resize_undo_moves_selection_back() {
        let mut editor = editor();
        let mut selection = editor.notifier().subscribe(Channel::Selection);
        editor.activate_tool(ToolId::RECT_SELECT).expect("select");
        draw(&mut editor, (10.0, 10.0), (30.0, 30.0));
        let bounds = |editor: &CanvasEditor| editor.selection().shape().map(SelectionShape::bounds);
        let original = bounds(&editor).expect("selection");
        let near = |b: Option<Bounds>, dx: f32, dy: f32| {
            b.is_some_and(|b| {
                (b.x - original.x - dx).abs() < 1e-3 && (b.y - original.y - dy).abs() < 1e-3
            })
        };
        while selection.try_recv().is_ok() {}

        editor
            .resize_canvas(CanvasSize::new(96, 96), Anchor::Center)
            .expect("resize");
        assert!(near(bounds(&editor), 16.0, 16.0));
        assert!(selection.try_recv().is_ok());

        editor.undo().expect("undo");
        assert!(near(bounds(&editor), 0.0, 0.0));
        editor.redo().expect("redo");
        assert!(near(bounds(&editor), 16.0, 16.0));
        editor.undo().expect("undo again");
        assert!(near(bounds(&editor), 0.0, 0.0));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut editor = editor();
        editor.activate_tool(ToolId::BRUSH).expect("brush");
        draw(&mut editor, (5.0, 5.0), (20.0, 20.0));
        let second = editor.add_layer(None).expect("add");
        editor.set_layer_opacity(second, 0.25).expect("opacity");
        let json = editor.save().expect("save");

        let mut other = CanvasEditor::blank(CanvasSize::new(8, 8), EditorConfig::default());
        other.load(&json, &NoAssets).expect("load");
        assert_eq!(other.layers().canvas_size(), CanvasSize::new(64, 64));
        assert_eq!(other.layers().len(), 2);
        assert_eq!(other.layers().layer_at(0).expect("bottom").stroke_count(), 1);
        assert!(!other.history().can_undo());
    }

    #[test]
    fn test_load_failure_keeps_document() {
        let mut editor = editor();
        assert!(editor.load("{\"width\":0}", &MemoryAssets::new()).is_err());
        assert_eq!(editor.layers().len(), 1);
    }

    #[test]
    fn test_import_image_requires_decodable_bytes() {
        let mut editor = editor().with_codec(Arc::new(RawCodec));
        assert!(matches!(
            editor.import_image("Photo", b"nope"),
            Err(CanvasError::Decode(_))
        ));
        let pixmap = tiny_skia::Pixmap::new(4, 4).expect("pixmap");
        let bytes = RawCodec
            .encode(&pixmap, crate::document::ImageFormat::Png)
            .expect("encode");
        let id = editor.import_image("Photo", &bytes).expect("import");
        assert_eq!(editor.layers().active_layer(), Some(id));
        assert!(editor.layers().layer(id).expect("layer").base_image().is_some());
    }

    #[test]
    fn test_merge_and_undo_via_editor() {
        let mut editor = editor();
        let bottom = editor.layers().active_layer().expect("bottom");
        let top = editor.add_layer(Some("Top")).expect("add");
        let merged = editor.merge_down(top).expect("merge");
        assert_eq!(editor.layers().len(), 1);
        assert_ne!(merged, bottom);
        editor.undo().expect("undo");
        assert_eq!(editor.layers().ids(), vec![bottom, top]);
    }
}
