//! # Canvas Renderer
//!
//! Turns a [`canvas_core::CanvasEditor`] into frames and exports.
//!
//! ## Frame Composition
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Overlay (volatile)   ants, cursor           │
//! ├─────────────────────────────────────────────┤
//! │ Canvas  (cacheable)  layers, live stroke    │
//! │                      checkerboard, surround │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The canvas surface is kept between frames and repainted only when the
//! document or the viewport changes. Exports bypass the pipeline and encode
//! the flattened layer stack.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkerboard;
#[cfg(feature = "images")]
pub mod codec;
pub mod cursor;
pub mod error;
pub mod export;
pub mod overlay;
pub mod pipeline;

pub use checkerboard::CheckerSpec;
#[cfg(feature = "images")]
pub use codec::ImageCrateCodec;
pub use cursor::draw_cursor;
pub use error::{RenderError, RenderResult};
pub use export::{ExportConfig, ExportFormat, ExportedImage, Exporter};
pub use overlay::{OutlineMetrics, OutlineSource, OverlayStats, SelectionOverlay};
pub use pipeline::{FrameStats, PipelineConfig, RenderPipeline, Surface, SurfaceHint};

/// Renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release process-wide render caches. Call once at application shutdown.
pub fn shutdown() {
    checkerboard::teardown();
    canvas_core::stamp::teardown();
}
