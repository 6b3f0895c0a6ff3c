//! Per-layer cache tiers.
//!
//! A layer owns up to three images:
//!
//! ```text
//! rasterized  base image + strokes [0, rasterized_count)
//! composite   rasterized + pending strokes, layer opacity applied
//! thumbnail   composite scaled into a small square
//! ```
//!
//! After an allocation failure the layer drops to [`CacheMode::Flattened`]:
//! only the composite tier is kept and it is rebuilt from every stroke.

use std::sync::Arc;

use tiny_skia::Pixmap;

use crate::raster::new_pixmap;
use crate::{CanvasError, CanvasResult, CanvasSize};

/// Which tiers a layer keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Rasterized, composite and thumbnail tiers.
    #[default]
    Tiered,
    /// Composite tier only.
    Flattened,
}

/// Counters for cache work, used to verify that caches are not rebuilt needlessly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Composite rebuilds.
    pub composite_builds: u64,
    /// Rasterized-tier updates (incremental or full).
    pub raster_updates: u64,
    /// Full rebuilds of the rasterized tier.
    pub full_rebuilds: u64,
    /// Thumbnail renders.
    pub thumbnail_builds: u64,
}

/// Cache images owned by one layer.
#[derive(Debug, Default)]
pub struct LayerCache {
    pub(crate) rasterized: Option<Arc<Pixmap>>,
    pub(crate) composite: Option<Pixmap>,
    pub(crate) composite_valid: bool,
    pub(crate) thumbnail: Option<(u32, Arc<Pixmap>)>,
    pub(crate) mode: CacheMode,
    pub(crate) stats: CacheStats,
}

impl LayerCache {
    /// Current tier mode.
    #[must_use]
    pub const fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Work counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether the rasterized tier holds usable pixels.
    #[must_use]
    pub const fn has_rasterized(&self) -> bool {
        self.rasterized.is_some()
    }

    /// Whether the composite is up to date.
    #[must_use]
    pub const fn is_composite_valid(&self) -> bool {
        self.composite_valid && self.composite.is_some()
    }

    /// Mark the composite and thumbnail stale. Pixels are kept for reuse.
    pub fn invalidate_composite(&mut self) {
        self.composite_valid = false;
        self.thumbnail = None;
    }

    /// Drop the rasterized tier; the next rasterization rebuilds from scratch.
    pub fn invalidate_rasterized(&mut self) {
        self.rasterized = None;
        self.invalidate_composite();
    }

    /// Drop every tier.
    pub fn clear(&mut self) {
        self.rasterized = None;
        self.composite = None;
        self.composite_valid = false;
        self.thumbnail = None;
    }

    /// Switch to the single-tier mode, freeing the rasterized tier and thumbnail.
    ///
    /// Returns `true` if this call changed the mode.
    pub fn degrade(&mut self) -> bool {
        if self.mode == CacheMode::Flattened {
            return false;
        }
        self.mode = CacheMode::Flattened;
        self.rasterized = None;
        self.thumbnail = None;
        true
    }

    /// Take a cleared composite buffer, reusing the old allocation when the size matches.
    pub(crate) fn take_composite_buffer(
        &mut self,
        size: CanvasSize,
        budget_bytes: usize,
    ) -> CanvasResult<Pixmap> {
        match self.composite.take() {
            Some(mut pixmap) if pixmap.width() == size.width && pixmap.height() == size.height => {
                pixmap.fill(tiny_skia::Color::TRANSPARENT);
                Ok(pixmap)
            }
            _ => allocate(size, 1, budget_bytes),
        }
    }

    /// Whether two canvas-sized tiers fit into the budget.
    pub(crate) fn tiers_fit(size: CanvasSize, budget_bytes: usize) -> bool {
        pixmap_bytes(size).saturating_mul(2) <= budget_bytes
    }
}

/// Bytes needed for one RGBA8 pixmap of this size.
#[must_use]
pub fn pixmap_bytes(size: CanvasSize) -> usize {
    (size.width as usize)
        .saturating_mul(size.height as usize)
        .saturating_mul(4)
}

/// Allocate a canvas-sized pixmap if `tiers` of them fit into the budget.
pub(crate) fn allocate(size: CanvasSize, tiers: usize, budget_bytes: usize) -> CanvasResult<Pixmap> {
    if pixmap_bytes(size).saturating_mul(tiers) > budget_bytes {
        return Err(CanvasError::Allocation {
            width: size.width,
            height: size.height,
        });
    }
    new_pixmap(size.width, size.height)
}
