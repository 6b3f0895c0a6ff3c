//! Tools, their registry and the activation lifecycle.
//!
//! ```text
//! Inactive -> ActivatingDeferred -> Active -> DeactivatingFast -> Inactive
//! ```
//!
//! Deactivation is synchronous and cheap: the in-progress stroke is dropped
//! and nothing is awaited. Activation hands back an optional warm-up future
//! (e.g. pre-rendering brush stamps). The tool accepts input while that
//! future is outstanding and may render at reduced fidelity until the host
//! reports completion with [`ToolManager::complete_activation`].

pub mod brush;
pub mod pan;
pub mod select;
pub mod settings;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

pub use brush::BrushTool;
pub use pan::PanTool;
pub use select::{SelectKind, SelectTool};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore, ToolSettings};

use crate::notify::{Channel, ChangeNotifier};
use crate::{
    CanvasController, CanvasResult, ColorManager, PointerEvent, SelectionManager, SelectionShape,
    Stroke, StrokeManager,
};

/// Stable tool identifier, also the settings key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(pub &'static str);

impl ToolId {
    /// Paint brush.
    pub const BRUSH: Self = Self("brush");
    /// Eraser.
    pub const ERASER: Self = Self("eraser");
    /// Hand tool.
    pub const PAN: Self = Self("pan");
    /// Rectangular marquee.
    pub const RECT_SELECT: Self = Self("rect_select");
    /// Elliptical marquee.
    pub const ELLIPSE_SELECT: Self = Self("ellipse_select");
    /// Free-form lasso.
    pub const LASSO_SELECT: Self = Self("lasso_select");

    /// Settings-store key.
    #[must_use]
    pub fn settings_key(self) -> String {
        format!("tool.{}", self.0)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Display metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolMeta {
    /// Identifier.
    pub id: ToolId,
    /// Human-readable name.
    pub name: &'static str,
    /// Icon name resolved by the host.
    pub icon: &'static str,
    /// Keyboard shortcut.
    pub shortcut: Option<char>,
}

/// Cursor the overlay should draw for the active tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorShape {
    /// Brush outline; diameter in canvas pixels.
    Brush {
        /// Outline diameter.
        diameter: f32,
    },
    /// Precision crosshair.
    Crosshair,
    /// Open hand.
    Grab,
    /// Closed hand while dragging.
    Grabbing,
}

/// What a tool may touch while handling input.
///
/// Implemented by the editor over its parts, and by test doubles.
pub trait ToolContext {
    /// Stroke builder.
    fn strokes(&mut self) -> &mut StrokeManager;

    /// Viewport.
    fn viewport(&mut self) -> &mut CanvasController;

    /// Selection.
    fn selection(&mut self) -> &mut SelectionManager;

    /// Colors.
    fn colors(&mut self) -> &mut ColorManager;

    /// Soft-brush coefficient used by the document.
    fn blur_coefficient(&self) -> f32;

    /// Commit a finished stroke to the active layer through history.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active layer or it is locked.
    fn commit_stroke(&mut self, stroke: Stroke) -> CanvasResult<()>;

    /// Publish a change.
    fn notify(&self, channel: Channel);
}

/// A unit of interaction.
pub trait Tool: Send + fmt::Debug {
    /// Display metadata.
    fn meta(&self) -> ToolMeta;

    /// Current settings.
    fn settings(&self) -> ToolSettings;

    /// Replace the settings.
    fn set_settings(&mut self, settings: ToolSettings);

    /// Handle a pointer event. Coordinates are in screen space; tools map
    /// them through [`ToolContext::viewport`].
    ///
    /// # Errors
    ///
    /// Propagates errors from committing work to the document.
    fn on_pointer(&mut self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> CanvasResult<()>;

    /// Drop any in-progress interaction. Must not block.
    fn cancel(&mut self, ctx: &mut dyn ToolContext);

    /// Cursor to draw.
    fn cursor(&self) -> CursorShape;

    /// Work to run after activation without blocking input.
    fn warm_up(&self, _blur_coefficient: f32) -> Option<BoxFuture<'static, CanvasResult<()>>> {
        None
    }

    /// Selection outline being dragged, for the overlay.
    fn preview_selection(&self) -> Option<SelectionShape> {
        None
    }
}

/// Builds a tool from its persisted settings.
pub type ToolFactory = Box<dyn Fn(ToolSettings) -> Box<dyn Tool> + Send + Sync>;

/// Activation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolState {
    /// No tool active.
    #[default]
    Inactive,
    /// Usable; warm-up still running.
    ActivatingDeferred,
    /// Fully ready.
    Active,
    /// Being torn down.
    DeactivatingFast,
}

/// Returned by [`ToolManager::activate`].
pub struct Activation {
    /// Identifies this activation; stale completions are ignored.
    pub ticket: u64,
    /// Future to run off the input path. `None` when the tool has nothing to
    /// prepare or was already the active tool.
    pub warm_up: Option<BoxFuture<'static, CanvasResult<()>>>,
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("ticket", &self.ticket)
            .field("warm_up", &self.warm_up.is_some())
            .finish()
    }
}

struct Registration {
    meta: ToolMeta,
    defaults: ToolSettings,
    factory: ToolFactory,
}

/// Tool registry, active tool and settings persistence.
pub struct ToolManager {
    registry: BTreeMap<ToolId, Registration>,
    instances: HashMap<ToolId, Box<dyn Tool>>,
    active: Option<ToolId>,
    state: ToolState,
    ticket: u64,
    store: Arc<dyn SettingsStore>,
    notifier: Arc<ChangeNotifier>,
}

impl fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolManager")
            .field("tools", &self.registry.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .field("state", &self.state)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl ToolManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            registry: BTreeMap::new(),
            instances: HashMap::new(),
            active: None,
            state: ToolState::Inactive,
            ticket: 0,
            store,
            notifier,
        }
    }

    /// Create with the built-in tools registered.
    #[must_use]
    pub fn with_builtin_tools(store: Arc<dyn SettingsStore>, notifier: Arc<ChangeNotifier>) -> Self {
        let mut manager = Self::new(store, notifier);
        manager.register(BrushTool::meta_for(false), ToolSettings::default(), |s| {
            Box::new(BrushTool::new(s, false))
        });
        manager.register(BrushTool::meta_for(true), ToolSettings::with_size(24.0), |s| {
            Box::new(BrushTool::new(s, true))
        });
        manager.register(PanTool::META, ToolSettings::default(), |s| {
            Box::new(PanTool::new(s))
        });
        for kind in [SelectKind::Rect, SelectKind::Ellipse, SelectKind::Lasso] {
            manager.register(SelectTool::meta_for(kind), ToolSettings::default(), move |s| {
                Box::new(SelectTool::new(kind, s))
            });
        }
        manager
    }

    /// Register a tool. Replaces an earlier registration with the same ID.
    pub fn register<F>(&mut self, meta: ToolMeta, defaults: ToolSettings, factory: F)
    where
        F: Fn(ToolSettings) -> Box<dyn Tool> + Send + Sync + 'static,
    {
        self.instances.remove(&meta.id);
        self.registry.insert(
            meta.id,
            Registration {
                meta,
                defaults,
                factory: Box::new(factory),
            },
        );
    }

    /// Registered tools in ID order.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolMeta> {
        self.registry.values().map(|r| r.meta).collect()
    }

    /// Tool bound to a keyboard shortcut.
    #[must_use]
    pub fn tool_for_shortcut(&self, key: char) -> Option<ToolId> {
        let key = key.to_ascii_lowercase();
        self.registry
            .values()
            .find(|r| r.meta.shortcut == Some(key))
            .map(|r| r.meta.id)
    }

    /// Active tool ID.
    #[must_use]
    pub const fn active_tool(&self) -> Option<ToolId> {
        self.active
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ToolState {
        self.state
    }

    /// Ticket of the latest activation.
    #[must_use]
    pub const fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Whether the active tool accepts input.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.state, ToolState::ActivatingDeferred | ToolState::Active)
    }

    /// Whether the active tool finished warming up.
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.state == ToolState::Active
    }

    fn active_instance(&self) -> Option<&dyn Tool> {
        self.active
            .and_then(|id| self.instances.get(&id))
            .map(AsRef::as_ref)
    }

    /// Cursor of the active tool.
    #[must_use]
    pub fn cursor(&self) -> Option<CursorShape> {
        self.active_instance().map(Tool::cursor)
    }

    /// Selection outline being dragged by the active tool.
    #[must_use]
    pub fn preview_selection(&self) -> Option<SelectionShape> {
        self.active_instance().and_then(Tool::preview_selection)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Switch tools.
    ///
    /// The current tool is deactivated synchronously first. The new tool is
    /// usable as soon as this returns; run the returned warm-up future
    /// elsewhere and report it with [`Self::complete_activation`].
    ///
    /// Activating the tool that is already active changes nothing: the
    /// interaction in progress survives and the current ticket is returned
    /// without a new warm-up.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::InvalidOperation`] for an unregistered ID.
    pub fn activate(&mut self, id: ToolId, ctx: &mut dyn ToolContext) -> CanvasResult<Activation> {
        let unknown = || crate::CanvasError::InvalidOperation(format!("unknown tool {id}"));
        if !self.registry.contains_key(&id) {
            return Err(unknown());
        }
        if self.active == Some(id) {
            tracing::trace!(tool = %id, ticket = self.ticket, "tool already active");
            return Ok(Activation {
                ticket: self.ticket,
                warm_up: None,
            });
        }
        self.deactivate(ctx);
        let blur = ctx.blur_coefficient();
        let warm_up = self.instance(id).ok_or_else(unknown)?.warm_up(blur);
        self.active = Some(id);
        self.ticket += 1;
        self.state = if warm_up.is_some() {
            ToolState::ActivatingDeferred
        } else {
            ToolState::Active
        };
        tracing::debug!(tool = %id, ticket = self.ticket, state = ?self.state, "tool activated");
        self.notifier.notify(Channel::Tool);
        Ok(Activation {
            ticket: self.ticket,
            warm_up,
        })
    }

    /// Mark a deferred activation finished. Stale tickets are ignored.
    pub fn complete_activation(&mut self, ticket: u64) -> bool {
        if ticket != self.ticket || self.state != ToolState::ActivatingDeferred {
            tracing::trace!(ticket, current = self.ticket, "stale tool activation ignored");
            return false;
        }
        self.state = ToolState::Active;
        self.notifier.notify(Channel::Tool);
        true
    }

    /// Deactivate the current tool: cancel its interaction and save its settings.
    pub fn deactivate(&mut self, ctx: &mut dyn ToolContext) {
        let Some(id) = self.active.take() else {
            return;
        };
        self.state = ToolState::DeactivatingFast;
        if let Some(tool) = self.instances.get_mut(&id) {
            tool.cancel(ctx);
            let settings = tool.settings();
            self.persist(id, settings);
        }
        self.state = ToolState::Inactive;
        tracing::debug!(tool = %id, "tool deactivated");
    }

    fn instance(&mut self, id: ToolId) -> Option<&mut Box<dyn Tool>> {
        if !self.instances.contains_key(&id) {
            let settings = self.load_settings(id);
            let tool = (self.registry.get(&id)?.factory)(settings);
            self.instances.insert(id, tool);
        }
        self.instances.get_mut(&id)
    }

    /// Route a pointer event to the active tool. Ignored while no tool is usable.
    ///
    /// # Errors
    ///
    /// Propagates the tool's error.
    pub fn handle_pointer(&mut self, event: &PointerEvent, ctx: &mut dyn ToolContext) -> CanvasResult<()> {
        if !self.is_usable() {
            return Ok(());
        }
        let Some(tool) = self.active.and_then(|id| self.instances.get_mut(&id)) else {
            return Ok(());
        };
        tool.on_pointer(event, ctx)
    }

    /// Cancel the active tool's interaction without switching tools.
    pub fn cancel(&mut self, ctx: &mut dyn ToolContext) {
        if let Some(tool) = self.active.and_then(|id| self.instances.get_mut(&id)) {
            tool.cancel(ctx);
        }
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    fn defaults(&self, id: ToolId) -> ToolSettings {
        self.registry
            .get(&id)
            .map_or_else(ToolSettings::default, |r| r.defaults)
    }

    fn load_settings(&self, id: ToolId) -> ToolSettings {
        match self.store.load(&id.settings_key()) {
            Ok(Some(json)) => match serde_json::from_str::<ToolSettings>(&json) {
                Ok(settings) => settings.normalized(),
                Err(err) => {
                    tracing::warn!(tool = %id, "ignoring unreadable tool settings: {err}");
                    self.defaults(id)
                }
            },
            Ok(None) => self.defaults(id),
            Err(err) => {
                tracing::warn!(tool = %id, "settings store read failed: {err}");
                self.defaults(id)
            }
        }
    }

    fn persist(&self, id: ToolId, settings: ToolSettings) {
        let result = serde_json::to_string(&settings)
            .map_err(crate::CanvasError::from)
            .and_then(|json| self.store.save(&id.settings_key(), &json));
        if let Err(err) = result {
            tracing::warn!(tool = %id, "failed to persist tool settings: {err}");
        }
    }

    /// Settings of a tool, live if instantiated, else persisted or default.
    #[must_use]
    pub fn settings(&self, id: ToolId) -> ToolSettings {
        self.instances
            .get(&id)
            .map_or_else(|| self.load_settings(id), |t| t.settings())
    }

    /// Change a tool's settings and persist them.
    pub fn update_settings(&mut self, id: ToolId, settings: ToolSettings) {
        let settings = settings.normalized();
        if let Some(tool) = self.instances.get_mut(&id) {
            tool.set_settings(settings);
        }
        self.persist(id, settings);
        self.notifier.notify(Channel::Tool);
    }

    /// Restore a tool's defaults and forget its persisted settings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Settings`] if the store cannot be updated.
    pub fn reset_settings(&mut self, id: ToolId) -> CanvasResult<()> {
        let defaults = self.defaults(id);
        if let Some(tool) = self.instances.get_mut(&id) {
            tool.set_settings(defaults);
        }
        self.store.remove(&id.settings_key())?;
        tracing::debug!(tool = %id, "tool settings reset");
        self.notifier.notify(Channel::Tool);
        Ok(())
    }

    /// Reset every registered tool.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub fn reset_all_settings(&mut self) -> CanvasResult<()> {
        let ids: Vec<ToolId> = self.registry.keys().copied().collect();
        self.notifier.begin_batch();
        let result = ids.into_iter().try_for_each(|id| self.reset_settings(id));
        self.notifier.end_batch();
        result
    }

    /// Save the settings of every instantiated tool.
    pub fn save_all(&self) {
        for (id, tool) in &self.instances {
            self.persist(*id, tool.settings());
        }
    }
}
