//! Layers: stroke storage, incremental rasterization and cache ownership.

pub mod cache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};
use tokio::time::Instant;
use uuid::Uuid;

pub use cache::{CacheMode, CacheStats, LayerCache};

use crate::document::ImageCodec;
use crate::raster::{new_pixmap, render_stroke, render_strokes};
use crate::scheduler::{RasterJob, RasterResult};
use crate::stroke::clamp_unit;
use crate::{
    BlendMode, Bounds, CanvasError, CanvasResult, CanvasSize, CanvasWarning, RasterPolicy, Stroke,
};

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Create a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raster image underneath a layer's strokes (e.g. an imported photo).
///
/// `pixmap` is `None` when the referenced bytes failed to decode; the layer
/// then renders as if there were no base image but keeps the reference so
/// the document round-trips.
#[derive(Debug, Clone)]
pub struct BaseImage {
    reference: Option<String>,
    pixmap: Option<Arc<Pixmap>>,
    x: f32,
    y: f32,
}

impl BaseImage {
    /// An in-memory image with no external reference, placed at the origin.
    #[must_use]
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            reference: None,
            pixmap: Some(Arc::new(pixmap)),
            x: 0.0,
            y: 0.0,
        }
    }

    /// An image loaded from `reference`; `pixmap` is `None` if it failed to decode.
    #[must_use]
    pub fn referenced(reference: impl Into<String>, pixmap: Option<Pixmap>) -> Self {
        Self {
            reference: Some(reference.into()),
            pixmap: pixmap.map(Arc::new),
            x: 0.0,
            y: 0.0,
        }
    }

    /// Place the image at an offset in canvas coordinates.
    #[must_use]
    pub const fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// External reference (asset path or data URI), if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Decoded pixels, if available.
    #[must_use]
    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_deref()
    }

    /// Offset in canvas coordinates.
    #[must_use]
    pub const fn offset(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    /// Whether pixels are available.
    #[must_use]
    pub const fn is_decoded(&self) -> bool {
        self.pixmap.is_some()
    }

    /// Extent in canvas coordinates; empty when not decoded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Bounds {
        self.pixmap.as_ref().map_or_else(Bounds::empty, |p| {
            Bounds::new(self.x, self.y, p.width() as f32, p.height() as f32)
        })
    }

    /// Same image shifted by an offset.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self.clone()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn draw_onto(&self, target: &mut Pixmap) {
        let Some(pixmap) = &self.pixmap else {
            return;
        };
        let integral = self.x.fract() == 0.0 && self.y.fract() == 0.0;
        let (x, y, transform, quality) = if integral {
            (self.x as i32, self.y as i32, Transform::identity(), FilterQuality::Nearest)
        } else {
            (0, 0, Transform::from_translate(self.x, self.y), FilterQuality::Bilinear)
        };
        target.draw_pixmap(
            x,
            y,
            Pixmap::as_ref(pixmap),
            &PixmapPaint {
                quality,
                ..PixmapPaint::default()
            },
            transform,
            None,
        );
    }
}

/// Content removed by [`Layer::clear_content`], restorable with [`Layer::restore_content`].
#[derive(Debug, Clone, Default)]
pub struct LayerContent {
    /// Removed strokes.
    pub strokes: Vec<Arc<Stroke>>,
    /// Removed base image.
    pub base_image: Option<BaseImage>,
}

/// What a rasterization pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterOutcome {
    /// Nothing was pending.
    UpToDate,
    /// Pending strokes were drawn on top of the existing tier.
    Incremental {
        /// Strokes drawn.
        drawn: usize,
    },
    /// The tier was rebuilt from the first stroke.
    FullRebuild {
        /// Strokes drawn.
        drawn: usize,
    },
    /// The layer runs in single-tier mode; strokes are folded into the composite.
    Flattened,
}

/// One layer of the document.
///
/// Strokes with index `>= rasterized_count` are pending: they are drawn on
/// top of the rasterized tier until the next rasterization pass.
#[derive(Debug)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) strokes: Vec<Arc<Stroke>>,
    pub(crate) rasterized_count: usize,
    pub(crate) base_image: Option<BaseImage>,
    pub(crate) visible: bool,
    pub(crate) locked: bool,
    pub(crate) opacity: f32,
    pub(crate) blend_mode: BlendMode,
    pub(crate) generation: u64,
    pub(crate) last_append: Option<Instant>,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) size: CanvasSize,
    pub(crate) policy: RasterPolicy,
    pub(crate) cache: LayerCache,
    pub(crate) warnings: Vec<CanvasWarning>,
}

impl Layer {
    /// Create an empty, visible, unlocked, fully opaque layer.
    #[must_use]
    pub fn new(name: impl Into<String>, size: CanvasSize) -> Self {
        Self::with_id(LayerId::new(), name, size)
    }

    /// Create an empty layer with a given ID.
    #[must_use]
    pub fn with_id(id: LayerId, name: impl Into<String>, size: CanvasSize) -> Self {
        Self {
            id,
            name: name.into(),
            strokes: Vec::new(),
            rasterized_count: 0,
            base_image: None,
            visible: true,
            locked: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            generation: next_generation(),
            last_append: None,
            bounds: None,
            size,
            policy: RasterPolicy::default(),
            cache: LayerCache::default(),
            warnings: Vec::new(),
        }
    }

    /// Use a specific rasterization policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RasterPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    // ---------------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------------

    /// Layer ID.
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether the layer is drawn.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide. Returns `true` if the value changed.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        if self.visible == visible {
            return false;
        }
        self.visible = visible;
        self.cache.invalidate_composite();
        true
    }

    /// Whether edits are refused.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Lock or unlock. Returns `true` if the value changed.
    pub fn set_locked(&mut self, locked: bool) -> bool {
        let changed = self.locked != locked;
        self.locked = locked;
        changed
    }

    /// Opacity in [0, 1].
    #[must_use]
    pub const fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set opacity, clamped to [0, 1].
    ///
    /// Setting the current value again leaves every cache intact. Returns
    /// `true` if the value changed.
    pub fn set_opacity(&mut self, opacity: f32) -> bool {
        let opacity = clamp_unit(opacity, self.opacity);
        if (opacity - self.opacity).abs() <= f32::EPSILON {
            return false;
        }
        self.opacity = opacity;
        self.cache.invalidate_composite();
        true
    }

    /// Blend mode used when compositing onto layers below.
    #[must_use]
    pub const fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Set the blend mode. Returns `true` if the value changed.
    pub fn set_blend_mode(&mut self, mode: BlendMode) -> bool {
        if self.blend_mode == mode {
            return false;
        }
        self.blend_mode = mode;
        self.cache.invalidate_composite();
        true
    }

    /// Whether the layer needs an isolated buffer to blend correctly.
    #[must_use]
    pub fn needs_isolation(&self) -> bool {
        self.opacity < 1.0 || !self.blend_mode.is_normal()
    }

    /// Monotonic version stamp; bumped whenever rasterized pixels stop matching the strokes.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Canvas dimensions the caches are built at.
    #[must_use]
    pub const fn canvas_size(&self) -> CanvasSize {
        self.size
    }

    /// Rasterization policy.
    #[must_use]
    pub const fn policy(&self) -> &RasterPolicy {
        &self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: RasterPolicy) {
        if (policy.blur_coefficient - self.policy.blur_coefficient).abs() > f32::EPSILON {
            self.invalidate_all();
        }
        self.policy = policy;
    }

    /// Cache tiers.
    #[must_use]
    pub const fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Drain warnings raised since the last call.
    pub fn take_warnings(&mut self) -> Vec<CanvasWarning> {
        std::mem::take(&mut self.warnings)
    }

    // ---------------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------------

    /// All strokes in drawing order.
    #[must_use]
    pub fn strokes(&self) -> &[Arc<Stroke>] {
        &self.strokes
    }

    /// Number of strokes.
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    /// Strokes already folded into the rasterized tier.
    #[must_use]
    pub const fn rasterized_count(&self) -> usize {
        self.rasterized_count
    }

    /// Strokes not yet rasterized.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.strokes.len() - self.rasterized_count
    }

    /// Strokes not yet rasterized.
    #[must_use]
    pub fn pending_strokes(&self) -> &[Arc<Stroke>] {
        &self.strokes[self.rasterized_count..]
    }

    /// Whether the layer has no strokes and no base image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.base_image.is_none()
    }

    /// Append a committed stroke. It stays pending until the next rasterization.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerLocked`] if the layer is locked.
    pub fn add_stroke(&mut self, stroke: impl Into<Arc<Stroke>>) -> CanvasResult<()> {
        self.ensure_unlocked()?;
        self.push_stroke(stroke.into());
        self.after_append();
        Ok(())
    }

    /// Append several strokes with a single invalidation.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerLocked`] if the layer is locked.
    pub fn add_strokes_batch<I>(&mut self, strokes: I) -> CanvasResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Arc<Stroke>>,
    {
        self.ensure_unlocked()?;
        let before = self.strokes.len();
        for stroke in strokes {
            self.push_stroke(stroke.into());
        }
        if self.strokes.len() != before {
            self.after_append();
        }
        Ok(())
    }

    fn push_stroke(&mut self, stroke: Arc<Stroke>) {
        if let Some(bounds) = &mut self.bounds {
            *bounds = bounds.union(&stroke.bounds(self.policy.blur_coefficient));
        }
        self.strokes.push(stroke);
    }

    fn after_append(&mut self) {
        self.last_append = Some(Instant::now());
        self.cache.invalidate_composite();
    }

    /// Remove and return the last stroke.
    ///
    /// Removing an already rasterized stroke invalidates the rasterized tier.
    pub fn pop_stroke(&mut self) -> Option<Arc<Stroke>> {
        let stroke = self.strokes.pop()?;
        if self.rasterized_count > self.strokes.len() {
            self.rasterized_count = self.strokes.len();
            self.cache.invalidate_rasterized();
            self.generation = next_generation();
        }
        self.cache.invalidate_composite();
        self.bounds = None;
        Some(stroke)
    }

    /// Remove all strokes and the base image.
    pub fn clear_content(&mut self) -> LayerContent {
        let content = LayerContent {
            strokes: std::mem::take(&mut self.strokes),
            base_image: self.base_image.take(),
        };
        self.rasterized_count = 0;
        self.invalidate_all();
        content
    }

    /// Shared copy of the strokes and base image, leaving the layer untouched.
    #[must_use]
    pub fn content(&self) -> LayerContent {
        LayerContent {
            strokes: self.strokes.clone(),
            base_image: self.base_image.clone(),
        }
    }

    /// Replace the content with previously removed content.
    pub fn restore_content(&mut self, content: LayerContent) {
        self.strokes = content.strokes;
        self.base_image = content.base_image;
        self.rasterized_count = self.strokes.len();
        self.invalidate_all();
    }

    /// Base image, if any.
    #[must_use]
    pub const fn base_image(&self) -> Option<&BaseImage> {
        self.base_image.as_ref()
    }

    /// Replace the base image.
    pub fn set_base_image(&mut self, image: Option<BaseImage>) {
        self.base_image = image;
        self.invalidate_all();
    }

    /// Decode bytes into the base image.
    ///
    /// A decode failure is not an error: the layer keeps the reference with
    /// no pixels, renders as empty, and records a warning. Returns whether
    /// the image decoded.
    pub fn load_base_image(
        &mut self,
        reference: Option<String>,
        bytes: &[u8],
        codec: &dyn ImageCodec,
    ) -> bool {
        match codec.decode(bytes) {
            Ok(pixmap) => {
                let image = match reference {
                    Some(r) => BaseImage::referenced(r, Some(pixmap)),
                    None => BaseImage::from_pixmap(pixmap),
                };
                self.set_base_image(Some(image));
                true
            }
            Err(err) => {
                tracing::warn!(layer = %self.id, "base image decode failed: {err}");
                self.warnings.push(CanvasWarning::BaseImageDecode {
                    layer: self.id,
                    message: err.to_string(),
                });
                self.set_base_image(reference.map(|r| BaseImage::referenced(r, None)));
                false
            }
        }
    }

    /// Shift all content by an offset.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        self.strokes = self
            .strokes
            .iter()
            .map(|s| Arc::new(s.translated(dx, dy)))
            .collect();
        self.base_image = self.base_image.as_ref().map(|b| b.translated(dx, dy));
        self.invalidate_all();
    }

    /// Change the cache dimensions. Content coordinates are unchanged.
    pub fn set_canvas_size(&mut self, size: CanvasSize) {
        if self.size == size {
            return;
        }
        self.size = size;
        self.cache.clear();
        self.generation = next_generation();
    }

    fn ensure_unlocked(&self) -> CanvasResult<()> {
        if self.locked {
            Err(CanvasError::LayerLocked(self.id))
        } else {
            Ok(())
        }
    }

    fn invalidate_all(&mut self) {
        self.cache.invalidate_rasterized();
        self.generation = next_generation();
        self.bounds = None;
    }

    // ---------------------------------------------------------------------
    // Rasterization
    // ---------------------------------------------------------------------

    /// Whether rasterization should run now: pending strokes exceed the
    /// force threshold, or the layer has been idle for the idle delay.
    #[must_use]
    pub fn needs_rasterize(&self, now: Instant) -> bool {
        let stale_tier = self.cache.mode == CacheMode::Tiered
            && !self.cache.has_rasterized()
            && self.rasterized_count > 0;
        let pending = self.pending_count();
        if pending == 0 && !stale_tier {
            return false;
        }
        if pending > self.policy.force_threshold {
            return true;
        }
        self.last_append
            .map_or(true, |t| now.saturating_duration_since(t) >= self.policy.idle_delay)
    }

    /// Snapshot the work needed to bring the rasterized tier up to date.
    ///
    /// Pending clearing strokes (eraser) force a rebuild from the first
    /// stroke, since they cannot be applied incrementally to cached pixels.
    #[must_use]
    pub fn raster_job(&self) -> Option<RasterJob> {
        if self.cache.mode == CacheMode::Flattened {
            return None;
        }
        let tier = self.cache.rasterized.clone();
        let pending = self.pending_strokes();
        if pending.is_empty() && (tier.is_some() || self.rasterized_count == 0) {
            return None;
        }
        let full_rebuild = tier.is_none() || pending.iter().any(|s| s.is_clearing());
        let start = if full_rebuild { 0 } else { self.rasterized_count };
        Some(RasterJob {
            layer: self.id,
            generation: self.generation,
            expected_count: self.rasterized_count,
            end: self.strokes.len(),
            full_rebuild,
            size: self.size,
            blur_coefficient: self.policy.blur_coefficient,
            budget_bytes: self.policy.layer_cache_bytes,
            seed: if full_rebuild { None } else { tier },
            base: if full_rebuild {
                self.base_image.clone()
            } else {
                None
            },
            strokes: self.strokes[start..].to_vec(),
        })
    }

    /// Install the output of a raster job.
    ///
    /// Stale results (generation moved on, another pass already applied, or
    /// strokes removed) are dropped and `false` is returned.
    pub fn apply_raster(&mut self, result: RasterResult) -> bool {
        let stale = result.layer != self.id
            || result.generation != self.generation
            || result.expected_count != self.rasterized_count
            || result.end > self.strokes.len()
            || self.cache.mode == CacheMode::Flattened
            || result.pixmap.width() != self.size.width
            || result.pixmap.height() != self.size.height;
        if stale {
            tracing::trace!(
                layer = %self.id,
                job_generation = result.generation,
                generation = self.generation,
                "discarding stale raster result"
            );
            return false;
        }
        self.cache.rasterized = Some(Arc::new(result.pixmap));
        self.rasterized_count = result.end;
        self.cache.stats.raster_updates += 1;
        if result.full_rebuild {
            self.generation = next_generation();
            self.cache.stats.full_rebuilds += 1;
        }
        true
    }

    /// Rasterize pending strokes now.
    ///
    /// Allocation failure switches the layer to single-tier mode and records
    /// a [`CanvasWarning::DegradedCache`].
    pub fn rasterize(&mut self) -> RasterOutcome {
        if self.cache.mode == CacheMode::Flattened {
            self.rasterized_count = self.strokes.len();
            return RasterOutcome::Flattened;
        }
        let Some(job) = self.raster_job() else {
            return RasterOutcome::UpToDate;
        };
        let full = job.is_full_rebuild();
        let drawn = job.stroke_count();
        match job.run_blocking() {
            Ok(result) => {
                self.apply_raster(result);
                tracing::debug!(layer = %self.id, drawn, full, "layer rasterized");
                if full {
                    RasterOutcome::FullRebuild { drawn }
                } else {
                    RasterOutcome::Incremental { drawn }
                }
            }
            Err(err) => {
                tracing::warn!(layer = %self.id, "rasterization failed: {err}");
                self.degrade();
                self.rasterized_count = self.strokes.len();
                RasterOutcome::Flattened
            }
        }
    }

    /// Switch to single-tier caching. Records a warning the first time.
    pub fn degrade(&mut self) {
        if self.cache.degrade() {
            self.warnings
                .push(CanvasWarning::DegradedCache { layer: self.id });
        }
        if self.cache.mode == CacheMode::Flattened {
            self.rasterized_count = self.strokes.len();
        }
    }

    // ---------------------------------------------------------------------
    // Composite and thumbnail
    // ---------------------------------------------------------------------

    /// Rebuild the composite if it is stale. Returns whether it was rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if even a single tier cannot be allocated.
    pub fn update_composite_cache(&mut self) -> CanvasResult<bool> {
        if self.cache.is_composite_valid() {
            return Ok(false);
        }
        match self.build_composite() {
            Ok(()) => Ok(true),
            Err(CanvasError::Allocation { .. }) if self.cache.mode == CacheMode::Tiered => {
                self.degrade();
                self.build_composite().map(|()| true)
            }
            Err(err) => Err(err),
        }
    }

    /// The composite, if valid.
    #[must_use]
    pub fn composite(&self) -> Option<&Pixmap> {
        if self.cache.is_composite_valid() {
            self.cache.composite.as_ref()
        } else {
            None
        }
    }

    fn build_composite(&mut self) -> CanvasResult<()> {
        let mut pixmap = self
            .cache
            .take_composite_buffer(self.size, self.policy.layer_cache_bytes)?;
        self.draw_content(&mut pixmap)?;
        apply_opacity(&mut pixmap, self.opacity);
        self.cache.composite = Some(pixmap);
        self.cache.composite_valid = true;
        self.cache.stats.composite_builds += 1;
        tracing::trace!(layer = %self.id, "composite rebuilt");
        Ok(())
    }

    /// Base image, rasterized strokes and pending strokes, at full opacity.
    fn draw_content(&self, target: &mut Pixmap) -> CanvasResult<()> {
        let k = self.policy.blur_coefficient;
        match &self.cache.rasterized {
            Some(tier) if tier.width() == target.width() && tier.height() == target.height() => {
                target.data_mut().copy_from_slice(tier.data());
                render_strokes(target, self.pending_strokes(), k)
            }
            _ => {
                if let Some(base) = &self.base_image {
                    base.draw_onto(target);
                }
                render_strokes(target, &self.strokes, k)
            }
        }
    }

    /// Render the layer with an in-progress stroke into a fresh buffer.
    ///
    /// The buffer has layer opacity applied and is meant to be composited
    /// once with the layer's blend mode.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if the buffer cannot be allocated.
    pub fn render_isolated(&self, live: &Stroke) -> CanvasResult<Pixmap> {
        let mut buffer = new_pixmap(self.size.width, self.size.height)?;
        self.draw_content(&mut buffer)?;
        render_stroke(&mut buffer, live, self.policy.blur_coefficient)?;
        apply_opacity(&mut buffer, self.opacity);
        Ok(buffer)
    }

    /// Thumbnail fitting in a `size` x `size` square.
    ///
    /// Cached until the composite is invalidated; rebuilt on every call in
    /// single-tier mode.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if the composite or thumbnail cannot be allocated.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn thumbnail(&mut self, size: u32) -> CanvasResult<Arc<Pixmap>> {
        if let Some((cached_size, thumb)) = &self.cache.thumbnail {
            if *cached_size == size && self.cache.is_composite_valid() {
                return Ok(Arc::clone(thumb));
            }
        }
        self.update_composite_cache()?;
        let scale = size as f32 / self.size.width.max(self.size.height).max(1) as f32;
        let width = ((self.size.width as f32 * scale).round() as u32).max(1);
        let height = ((self.size.height as f32 * scale).round() as u32).max(1);
        let mut thumb = new_pixmap(width, height)?;
        if let Some(composite) = &self.cache.composite {
            thumb.draw_pixmap(
                0,
                0,
                composite.as_ref(),
                &PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                },
                Transform::from_scale(scale, scale),
                None,
            );
        }
        let thumb = Arc::new(thumb);
        self.cache.stats.thumbnail_builds += 1;
        if self.cache.mode == CacheMode::Tiered {
            self.cache.thumbnail = Some((size, Arc::clone(&thumb)));
        }
        Ok(thumb)
    }

    // ---------------------------------------------------------------------
    // Bounds
    // ---------------------------------------------------------------------

    /// Extent of all strokes and the base image; computed lazily and cached.
    pub fn compute_bounds(&mut self) -> Bounds {
        if let Some(bounds) = self.bounds {
            return bounds;
        }
        let k = self.policy.blur_coefficient;
        let strokes = self
            .strokes
            .iter()
            .fold(Bounds::empty(), |acc, s| acc.union(&s.bounds(k)));
        let bounds = self
            .base_image
            .as_ref()
            .map_or(strokes, |b| strokes.union(&b.bounds()));
        self.bounds = Some(bounds);
        bounds
    }

    /// Cached bounds, if computed.
    #[must_use]
    pub const fn cached_bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Forget the cached bounds.
    pub fn invalidate_bounds(&mut self) {
        self.bounds = None;
    }

    // ---------------------------------------------------------------------
    // Copies
    // ---------------------------------------------------------------------

    /// Copy of the layer's data with the same ID and empty caches.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            strokes: self.strokes.clone(),
            rasterized_count: self.rasterized_count,
            base_image: self.base_image.clone(),
            visible: self.visible,
            locked: self.locked,
            opacity: self.opacity,
            blend_mode: self.blend_mode,
            generation: next_generation(),
            last_append: None,
            bounds: self.bounds,
            size: self.size,
            policy: self.policy,
            cache: LayerCache::default(),
            warnings: Vec::new(),
        }
    }

    /// Copy with a new ID and name.
    #[must_use]
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        let mut copy = self.snapshot();
        copy.id = LayerId::new();
        copy.name = name.into();
        copy.locked = false;
        copy
    }

    /// Whether two layers hold the same observable content and properties.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.strokes.len() == other.strokes.len()
            && self
                .strokes
                .iter()
                .zip(&other.strokes)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
            && (self.opacity - other.opacity).abs() <= f32::EPSILON
            && self.blend_mode == other.blend_mode
            && self.visible == other.visible
            && self.base_image.is_some() == other.base_image.is_some()
    }
}

static GENERATIONS: AtomicU64 = AtomicU64::new(1);

/// Generation stamps are drawn from one process-wide sequence, so a layer
/// restored from a snapshot never reuses a stamp held by an in-flight job.
fn next_generation() -> u64 {
    GENERATIONS.fetch_add(1, Ordering::Relaxed)
}

/// Scale premultiplied pixels by an opacity.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn apply_opacity(pixmap: &mut Pixmap, opacity: f32) {
    if opacity >= 1.0 {
        return;
    }
    let scale = opacity.clamp(0.0, 1.0);
    for byte in pixmap.data_mut() {
        *byte = (f32::from(*byte) * scale).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrushParams, Color, StrokePoint};

    fn stroke_at(x: f32, y: f32) -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(x, y), StrokePoint::new(x + 10.0, y)],
            BrushParams::default(),
        )
    }

    fn layer() -> Layer {
        Layer::new("Layer 1", CanvasSize::new(64, 64))
    }

    #[test]
    fn test_add_stroke_is_pending() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        assert_eq!(layer.stroke_count(), 1);
        assert_eq!(layer.rasterized_count(), 0);
        assert_eq!(layer.pending_count(), 1);
    }

    #[test]
    fn test_locked_layer_refuses_strokes() {
        let mut layer = layer();
        layer.set_locked(true);
        assert!(matches!(
            layer.add_stroke(stroke_at(0.0, 0.0)),
            Err(CanvasError::LayerLocked(_))
        ));
    }

    #[test]
    fn test_rasterize_incremental_then_up_to_date() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        assert_eq!(layer.rasterize(), RasterOutcome::FullRebuild { drawn: 1 });
        layer.add_stroke(stroke_at(5.0, 20.0)).expect("add");
        assert_eq!(layer.rasterize(), RasterOutcome::Incremental { drawn: 1 });
        assert_eq!(layer.rasterized_count(), 2);
        assert_eq!(layer.rasterize(), RasterOutcome::UpToDate);
    }

    #[test]
    fn test_eraser_forces_full_rebuild() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        layer.rasterize();
        let generation = layer.generation();
        let eraser = Stroke::new(
            vec![StrokePoint::new(5.0, 5.0), StrokePoint::new(15.0, 5.0)],
            BrushParams::eraser(10.0, 1.0),
        );
        layer.add_stroke(eraser).expect("add");
        assert_eq!(layer.rasterize(), RasterOutcome::FullRebuild { drawn: 2 });
        assert!(layer.generation() > generation);
        layer.update_composite_cache().expect("composite");
        let px = layer.composite().and_then(|c| c.pixel(10, 5)).expect("pixel");
        assert_eq!(px.alpha(), 0);
    }

    #[test]
    fn test_stale_job_discarded() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        let job = layer.raster_job().expect("job");
        // A clear bumps the generation while the job is in flight.
        layer.clear_content();
        layer.add_stroke(stroke_at(30.0, 30.0)).expect("add");
        let result = job.run_blocking().expect("run");
        assert!(!layer.apply_raster(result));
        assert_eq!(layer.rasterized_count(), 0);
    }

    #[test]
    fn test_job_survives_plain_append() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        let job = layer.raster_job().expect("job");
        layer.add_stroke(stroke_at(5.0, 30.0)).expect("add");
        let result = job.run_blocking().expect("run");
        assert!(layer.apply_raster(result));
        assert_eq!(layer.rasterized_count(), 1);
        assert_eq!(layer.pending_count(), 1);
    }

    #[test]
    fn test_composite_idempotent() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        assert!(layer.update_composite_cache().expect("build"));
        let first = layer.composite().expect("valid").data().to_vec();
        assert!(!layer.update_composite_cache().expect("noop"));
        assert_eq!(layer.composite().expect("valid").data(), first.as_slice());
        assert_eq!(layer.cache().stats().composite_builds, 1);
    }

    #[test]
    fn test_same_opacity_keeps_cache() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        assert!(layer.set_opacity(0.5));
        layer.update_composite_cache().expect("build");
        assert!(!layer.set_opacity(0.5));
        assert!(layer.cache().is_composite_valid());
        assert!(!layer.set_opacity(f32::NAN));
        assert!(layer.set_opacity(7.0));
        assert!((layer.opacity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_opacity_baked_into_composite() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        layer.set_opacity(0.5);
        layer.update_composite_cache().expect("build");
        let px = layer.composite().and_then(|c| c.pixel(10, 5)).expect("pixel");
        assert!((127..=128).contains(&px.alpha()));
    }

    #[test]
    fn test_bounds_cached_and_extended() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        let b = layer.compute_bounds();
        assert!(b.contains(crate::Point::new(10.0, 5.0)));
        layer.add_stroke(stroke_at(40.0, 40.0)).expect("add");
        assert!(layer
            .cached_bounds()
            .expect("still cached")
            .contains(crate::Point::new(45.0, 40.0)));
        layer.invalidate_bounds();
        assert!(layer.cached_bounds().is_none());
    }

    #[test]
    fn test_pop_rasterized_stroke_invalidates_tier() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        layer.rasterize();
        let generation = layer.generation();
        layer.pop_stroke().expect("stroke");
        assert_eq!(layer.rasterized_count(), 0);
        assert!(!layer.cache().has_rasterized());
        assert!(layer.generation() > generation);
    }

    #[test]
    fn test_degraded_mode_after_allocation_failure() {
        let policy = RasterPolicy {
            layer_cache_bytes: 64 * 64 * 4 + 10,
            ..RasterPolicy::default()
        };
        let mut layer = layer().with_policy(policy);
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        assert_eq!(layer.rasterize(), RasterOutcome::Flattened);
        assert_eq!(layer.cache().mode(), CacheMode::Flattened);
        assert_eq!(layer.rasterized_count(), layer.stroke_count());
        let warnings = layer.take_warnings();
        assert!(matches!(
            warnings.as_slice(),
            [CanvasWarning::DegradedCache { .. }]
        ));
        // Single tier still renders.
        layer.update_composite_cache().expect("composite");
        let px = layer.composite().and_then(|c| c.pixel(10, 5)).expect("pixel");
        assert_eq!(px.alpha(), 255);
    }

    #[test]
    fn test_thumbnail_cached_until_invalidated() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        let a = layer.thumbnail(16).expect("thumb");
        assert_eq!((a.width(), a.height()), (16, 16));
        let b = layer.thumbnail(16).expect("thumb");
        assert!(Arc::ptr_eq(&a, &b));
        layer.set_opacity(0.3);
        let c = layer.thumbnail(16).expect("thumb");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_base_image_under_strokes() {
        let mut layer = layer();
        let mut photo = new_pixmap(64, 64).expect("pixmap");
        photo.fill(Color::rgb(0, 0, 255).to_skia());
        layer.set_base_image(Some(BaseImage::from_pixmap(photo)));
        layer.update_composite_cache().expect("composite");
        let px = layer.composite().and_then(|c| c.pixel(50, 50)).expect("pixel");
        assert_eq!((px.blue(), px.alpha()), (255, 255));
        assert_eq!(layer.compute_bounds(), Bounds::new(0.0, 0.0, 64.0, 64.0));
    }

    #[test]
    fn test_translate_moves_content() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        layer.translate(10.0, 20.0);
        let p = layer.strokes()[0].points()[0];
        assert_eq!((p.x, p.y), (15.0, 25.0));
    }

    #[test]
    fn test_snapshot_keeps_id_and_drops_caches() {
        let mut layer = layer();
        layer.add_stroke(stroke_at(5.0, 5.0)).expect("add");
        layer.rasterize();
        let copy = layer.snapshot();
        assert_eq!(copy.id(), layer.id());
        assert!(!copy.cache().has_rasterized());
        assert!(copy.same_content(&layer));
        assert_ne!(layer.duplicate("Copy").id(), layer.id());
    }
}
