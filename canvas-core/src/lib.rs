//! # Canvas Core
//!
//! Document model and editing engine for a layered raster/vector canvas.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CanvasEditor                        │
//! ├───────────────┬──────────────────┬───────────────────────┤
//! │ ToolManager   │ HistoryManager   │ LayerManager          │
//! │ - Brush/Erase │ - Actions        │ - Layers + caches     │
//! │ - Selection   │ - Linear undo    │ - Culled compositing  │
//! │ - Pan         │                  │ - Raster scheduling   │
//! ├───────────────┴──────────────────┴───────────────────────┤
//! │ StrokeManager │ SelectionManager │ CanvasController      │
//! │ ColorManager  │ ChangeNotifier   │ Document records      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering to the screen and encoding exports live in `canvas-renderer`;
//! this crate only produces per-layer pixmaps and composites.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blend;
pub mod color;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod event;
pub mod geometry;
pub mod history;
pub mod layer;
pub mod layer_manager;
pub mod notify;
pub mod raster;
pub mod scheduler;
pub mod selection;
pub mod stamp;
pub mod stroke;
pub mod stroke_manager;
pub mod tools;
pub mod viewport;

pub use blend::BlendMode;
pub use color::{Color, ColorManager};
pub use config::{EditorConfig, HistoryConfig, RasterPolicy};
pub use document::{
    AssetResolver, CanvasRecord, ImageCodec, ImageFormat, LayerRecord, MemoryAssets, NoAssets,
    RawCodec,
};
pub use editor::CanvasEditor;
pub use error::{CanvasError, CanvasResult, CanvasWarning};
pub use event::{InputEvent, KeyEvent, KeyModifiers, PointerEvent, PointerPhase};
pub use geometry::{Anchor, Bounds, CanvasSize, Point};
pub use history::{Action, HistoryManager, UndoHistory};
pub use layer::{BaseImage, CacheMode, Layer, LayerContent, LayerId, RasterOutcome};
pub use layer_manager::{
    flatten_layers, merge_layers, Background, LayerManager, LayerStack, LiveStroke, RenderStats,
    RenderView,
};
pub use notify::{Change, ChangeNotifier, Channel};
pub use scheduler::{FlushReport, RasterJob, RasterResult, RasterScheduler};
pub use selection::{SelectionManager, SelectionShape};
pub use stroke::{BrushParams, Stroke, StrokePoint};
pub use stroke_manager::StrokeManager;
pub use tools::{
    CursorShape, JsonFileSettingsStore, MemorySettingsStore, SettingsStore, Tool, ToolContext,
    ToolId, ToolManager, ToolMeta, ToolSettings, ToolState,
};
pub use viewport::{CanvasController, ViewState};

/// Canvas core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
