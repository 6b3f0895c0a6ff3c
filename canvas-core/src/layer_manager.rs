//! The layer stack: ordering, active layer, batching and culled rendering.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};
use tokio::time::Instant;

use crate::document::{AssetResolver, CanvasRecord, ImageCodec};
use crate::layer::{cache, BaseImage, CacheMode, Layer};
use crate::notify::{Channel, ChangeNotifier};
use crate::scheduler::{RasterJob, RasterResult};
use crate::{Bounds, CanvasError, CanvasResult, CanvasSize, LayerId, RasterPolicy, Stroke};

/// What is shown beneath transparent canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Nothing; exports keep alpha.
    #[default]
    Transparent,
    /// Gray checkerboard drawn by the renderer.
    Checkerboard,
}

/// Structural access to the layer stack.
///
/// History actions are written against this trait so they can run on test
/// doubles as well as on [`LayerManager`]. Index 0 is the bottom layer.
pub trait LayerStack {
    /// Canvas dimensions.
    fn canvas_size(&self) -> CanvasSize;

    /// Policy new layers are created with.
    fn policy(&self) -> RasterPolicy;

    /// Number of layers.
    fn len(&self) -> usize;

    /// Whether the stack has no layers.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Layer IDs, bottom to top.
    fn ids(&self) -> Vec<LayerId>;

    /// Stack position of a layer.
    fn index_of(&self, id: LayerId) -> Option<usize>;

    /// Borrow a layer.
    fn layer(&self, id: LayerId) -> Option<&Layer>;

    /// Borrow a layer for mutation. Publishes a render change.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    fn layer_mut(&mut self, id: LayerId) -> CanvasResult<&mut Layer>;

    /// A fresh empty layer sized and configured for this stack.
    fn new_layer(&self, name: &str) -> Layer {
        Layer::new(name, self.canvas_size()).with_policy(self.policy())
    }

    /// Insert a layer at a stack position.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if the index is past the top
    /// or the ID is already present.
    fn insert_layer(&mut self, index: usize, layer: Layer) -> CanvasResult<()>;

    /// Remove a layer, returning its former position.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    fn remove_layer(&mut self, id: LayerId) -> CanvasResult<(usize, Layer)>;

    /// Move a layer to a new position, returning the old one.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] or, for an out-of-range target,
    /// [`CanvasError::InvalidOperation`].
    fn move_layer(&mut self, id: LayerId, to: usize) -> CanvasResult<usize>;

    /// Resize every layer's caches. Content is not moved.
    fn set_canvas_size(&mut self, size: CanvasSize);

    /// Layer receiving new strokes.
    fn active_layer(&self) -> Option<LayerId>;

    /// Change the active layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] for an unknown ID.
    fn set_active_layer(&mut self, id: LayerId) -> CanvasResult<()>;

    /// Open a notification batch.
    fn begin_batch(&self);

    /// Close a notification batch.
    fn end_batch(&self);

    /// Forward warnings raised by layers to the host.
    fn flush_warnings(&mut self) {}
}

/// Per-frame render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Layers composited onto the target.
    pub layers_drawn: usize,
    /// Visible layers skipped because they lie outside the viewport.
    pub layers_culled: usize,
    /// Hidden layers.
    pub layers_hidden: usize,
    /// Layers skipped because their cache could not be allocated.
    pub layers_failed: usize,
}

/// An in-progress stroke drawn on top of its layer.
#[derive(Debug, Clone, Copy)]
pub struct LiveStroke<'a> {
    /// Layer being drawn on.
    pub layer: LayerId,
    /// Uncommitted stroke.
    pub stroke: &'a Stroke,
}

/// Parameters of one culled render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderView<'a> {
    /// Canvas-to-target transform.
    pub transform: Transform,
    /// Visible region in canvas coordinates.
    pub viewport: Bounds,
    /// Stroke being drawn, if any.
    pub live: Option<LiveStroke<'a>>,
    /// Skip layers whose bounds miss the viewport.
    pub cull: bool,
}

impl<'a> RenderView<'a> {
    /// A culled view with no live stroke.
    #[must_use]
    pub const fn new(transform: Transform, viewport: Bounds) -> Self {
        Self {
            transform,
            viewport,
            live: None,
            cull: true,
        }
    }

    /// Identity view of a whole canvas.
    #[must_use]
    pub fn canvas(size: CanvasSize) -> Self {
        Self::new(Transform::identity(), size.bounds())
    }

    /// Draw an in-progress stroke on a layer.
    #[must_use]
    pub const fn with_live(mut self, layer: LayerId, stroke: &'a Stroke) -> Self {
        self.live = Some(LiveStroke { layer, stroke });
        self
    }

    /// Turn culling on or off.
    #[must_use]
    pub const fn with_culling(mut self, cull: bool) -> Self {
        self.cull = cull;
        self
    }

    fn quality(&self) -> FilterQuality {
        let t = self.transform;
        if t.is_translate() && t.tx.fract() == 0.0 && t.ty.fract() == 0.0 {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        }
    }
}

/// Ordered layers with one active layer.
#[derive(Debug)]
pub struct LayerManager {
    layers: Vec<Layer>,
    active: Option<LayerId>,
    size: CanvasSize,
    background: Background,
    policy: RasterPolicy,
    notifier: Arc<ChangeNotifier>,
}

impl LayerManager {
    /// Create an empty stack.
    #[must_use]
    pub fn new(size: CanvasSize, policy: RasterPolicy, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            layers: Vec::new(),
            active: None,
            size,
            background: Background::default(),
            policy,
            notifier,
        }
    }

    /// Layers bottom to top.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer at a stack position.
    #[must_use]
    pub fn layer_at(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// The active layer.
    #[must_use]
    pub fn active(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.layer(id))
    }

    /// Notification hub.
    #[must_use]
    pub const fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Background mode.
    #[must_use]
    pub const fn background(&self) -> Background {
        self.background
    }

    /// Change the background mode.
    pub fn set_background(&mut self, background: Background) {
        if self.background != background {
            self.background = background;
            self.notifier.notify(Channel::Render);
        }
    }

    /// Replace the raster policy on every layer.
    pub fn set_policy(&mut self, policy: RasterPolicy) {
        self.policy = policy;
        for layer in &mut self.layers {
            layer.set_policy(policy);
        }
        self.notifier.notify(Channel::Render);
    }

    /// Add an empty layer above the active one (or on top) and make it active.
    pub fn add_layer(&mut self, name: &str) -> LayerId {
        let layer = self.new_layer(name);
        let id = layer.id();
        let index = self
            .active
            .and_then(|a| self.index_of(a))
            .map_or(self.layers.len(), |i| i + 1);
        self.layers.insert(index, layer);
        tracing::debug!(layer = %id, index, "layer added");
        self.notifier.begin_batch();
        self.notifier.notify(Channel::Render);
        self.set_active(Some(id));
        self.notifier.end_batch();
        id
    }

    /// Name for a new layer that does not clash with existing ones.
    #[must_use]
    pub fn next_layer_name(&self) -> String {
        (self.layers.len() + 1..)
            .map(|n| format!("Layer {n}"))
            .find(|name| self.layers.iter().all(|l| l.name() != name))
            .unwrap_or_else(|| "Layer".to_string())
    }

    /// Append a committed stroke to a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LayerNotFound`] or [`CanvasError::LayerLocked`].
    pub fn add_stroke(&mut self, id: LayerId, stroke: impl Into<Arc<Stroke>>) -> CanvasResult<()> {
        self.layer_mut(id)?.add_stroke(stroke)
    }

    fn set_active(&mut self, id: Option<LayerId>) {
        if self.active != id {
            self.active = id;
            self.notifier.notify(Channel::ActiveLayer);
        }
    }

    // ---------------------------------------------------------------------
    // Rasterization
    // ---------------------------------------------------------------------

    /// Jobs for every layer due for rasterization.
    ///
    /// Layers in single-tier mode have nothing to rasterize; their pending
    /// strokes are folded into the composite directly.
    pub fn due_raster_jobs(&mut self, now: Instant) -> Vec<RasterJob> {
        let mut jobs = Vec::new();
        for layer in &mut self.layers {
            if !layer.needs_rasterize(now) {
                continue;
            }
            if layer.cache().mode() == CacheMode::Flattened {
                layer.rasterize();
            } else if let Some(job) = layer.raster_job() {
                jobs.push(job);
            }
        }
        jobs
    }

    /// Rasterize every due layer on the calling thread. Returns the number rasterized.
    pub fn rasterize_due(&mut self, now: Instant) -> usize {
        let mut count = 0;
        for layer in &mut self.layers {
            if layer.needs_rasterize(now) {
                layer.rasterize();
                count += 1;
            }
        }
        self.flush_warnings();
        count
    }

    /// Install a finished raster job. Results for removed layers or stale
    /// generations are dropped.
    pub fn apply_raster(&mut self, result: RasterResult) -> bool {
        match self.layers.iter_mut().find(|l| l.id() == result.layer()) {
            Some(layer) => layer.apply_raster(result),
            None => {
                tracing::trace!(layer = %result.layer(), "raster result for removed layer");
                false
            }
        }
    }

    /// Put a layer into single-tier mode after an allocation failure.
    pub fn degrade_layer(&mut self, id: LayerId) {
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id() == id) {
            layer.degrade();
        }
        self.flush_warnings();
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    /// Composite visible layers bottom to top onto `target`.
    ///
    /// Layers whose bounds miss the viewport are skipped when culling is on;
    /// their composite is transparent there, so the output is unchanged.
    /// Each layer is drawn from its composite, which already carries the
    /// layer opacity, with the layer blend mode. The layer holding the live
    /// stroke is rendered into a separate buffer first so an in-progress
    /// eraser only affects that layer.
    pub fn render_into(&mut self, target: &mut Pixmap, view: &RenderView<'_>) -> RenderStats {
        let mut stats = RenderStats::default();
        let quality = view.quality();
        for layer in &mut self.layers {
            if !layer.is_visible() {
                stats.layers_hidden += 1;
                continue;
            }
            let live = view
                .live
                .filter(|l| l.layer == layer.id())
                .map(|l| l.stroke);

            if view.cull && !layer.blend_mode().is_clearing() {
                let k = layer.policy().blur_coefficient;
                let mut bounds = layer.compute_bounds();
                if let Some(stroke) = live {
                    bounds = bounds.union(&stroke.bounds(k));
                }
                if !bounds.intersects(&view.viewport) {
                    stats.layers_culled += 1;
                    continue;
                }
            }

            let paint = PixmapPaint {
                opacity: 1.0,
                blend_mode: layer.blend_mode().to_skia(),
                quality,
            };
            let drawn = match live {
                Some(stroke) => layer.render_isolated(stroke).map(|buffer| {
                    target.draw_pixmap(0, 0, buffer.as_ref(), &paint, view.transform, None);
                }),
                None => layer.update_composite_cache().map(|_| {
                    if let Some(composite) = layer.composite() {
                        target.draw_pixmap(0, 0, composite.as_ref(), &paint, view.transform, None);
                    }
                }),
            };
            match drawn {
                Ok(()) => stats.layers_drawn += 1,
                Err(err) => {
                    tracing::warn!(layer = %layer.id(), "skipping layer: {err}");
                    stats.layers_failed += 1;
                }
            }
        }
        self.flush_warnings();
        tracing::trace!(
            drawn = stats.layers_drawn,
            culled = stats.layers_culled,
            "layers rendered"
        );
        stats
    }

    /// Canvas-sized composite of all visible layers.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if the canvas buffer cannot be allocated.
    pub fn render_flattened(&mut self) -> CanvasResult<Pixmap> {
        let mut target = cache::allocate(self.size, 1, self.policy.layer_cache_bytes)?;
        self.render_into(&mut target, &RenderView::canvas(self.size).with_culling(false));
        Ok(target)
    }

    /// Refresh thumbnails for every layer.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Allocation`] if a thumbnail cannot be allocated.
    pub fn thumbnails(&mut self, size: u32) -> CanvasResult<Vec<(LayerId, Arc<Pixmap>)>> {
        let thumbs = self
            .layers
            .iter_mut()
            .map(|l| l.thumbnail(size).map(|t| (l.id(), t)))
            .collect();
        self.flush_warnings();
        thumbs
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Produce the persisted canvas record.
    ///
    /// # Errors
    ///
    /// See [`Layer::to_record`].
    pub fn to_record(&self, codec: Option<&dyn ImageCodec>) -> CanvasResult<CanvasRecord> {
        let layers = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| l.to_record(i, codec))
            .collect::<CanvasResult<Vec<_>>>()?;
        Ok(CanvasRecord {
            width: self.size.width,
            height: self.size.height,
            background: self.background,
            layers,
        })
    }

    /// Rebuild a stack from a validated record. The top layer becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::MalformedDocument`] for invalid records or
    /// unresolvable base-image references.
    pub fn from_record(
        record: CanvasRecord,
        policy: RasterPolicy,
        notifier: Arc<ChangeNotifier>,
        assets: &dyn AssetResolver,
        codec: Option<&dyn ImageCodec>,
    ) -> CanvasResult<Self> {
        record.validate()?;
        let size = record.size();
        let mut manager = Self::new(size, policy, notifier);
        manager.background = record.background;
        let mut records = record.layers;
        records.sort_by_key(|l| l.order_index);
        for layer in records {
            manager
                .layers
                .push(Layer::from_record(layer, size, policy, assets, codec)?);
        }
        manager.active = manager.layers.last().map(Layer::id);
        manager.flush_warnings();
        tracing::debug!(layers = manager.layers.len(), "document loaded");
        Ok(manager)
    }
}

impl LayerStack for LayerManager {
    fn canvas_size(&self) -> CanvasSize {
        self.size
    }

    fn policy(&self) -> RasterPolicy {
        self.policy
    }

    fn len(&self) -> usize {
        self.layers.len()
    }

    fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(Layer::id).collect()
    }

    fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    fn layer_mut(&mut self, id: LayerId) -> CanvasResult<&mut Layer> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(CanvasError::LayerNotFound(id))?;
        self.notifier.notify(Channel::Render);
        Ok(layer)
    }

    fn insert_layer(&mut self, index: usize, layer: Layer) -> CanvasResult<()> {
        if index > self.layers.len() {
            return Err(CanvasError::InvalidOperation(format!(
                "insert position {index} past top of {} layers",
                self.layers.len()
            )));
        }
        if self.index_of(layer.id()).is_some() {
            return Err(CanvasError::InvalidOperation(format!(
                "layer {} already in stack",
                layer.id()
            )));
        }
        let mut layer = layer;
        if layer.canvas_size() != self.size {
            layer.set_canvas_size(self.size);
        }
        tracing::debug!(layer = %layer.id(), index, "layer inserted");
        let id = layer.id();
        self.layers.insert(index, layer);
        self.notifier.notify(Channel::Render);
        if self.active.is_none() {
            self.set_active(Some(id));
        }
        Ok(())
    }

    fn remove_layer(&mut self, id: LayerId) -> CanvasResult<(usize, Layer)> {
        let index = self.index_of(id).ok_or(CanvasError::LayerNotFound(id))?;
        let layer = self.layers.remove(index);
        tracing::debug!(layer = %id, index, "layer removed");
        self.notifier.notify(Channel::Render);
        if self.active == Some(id) {
            let next = self
                .layers
                .get(index.saturating_sub(1))
                .or_else(|| self.layers.first())
                .map(Layer::id);
            self.set_active(next);
        }
        Ok((index, layer))
    }

    fn move_layer(&mut self, id: LayerId, to: usize) -> CanvasResult<usize> {
        let from = self.index_of(id).ok_or(CanvasError::LayerNotFound(id))?;
        if to >= self.layers.len() {
            return Err(CanvasError::InvalidOperation(format!(
                "move target {to} outside {} layers",
                self.layers.len()
            )));
        }
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
            self.notifier.notify(Channel::Render);
        }
        Ok(from)
    }

    fn set_canvas_size(&mut self, size: CanvasSize) {
        if self.size == size {
            return;
        }
        self.size = size;
        for layer in &mut self.layers {
            layer.set_canvas_size(size);
        }
        tracing::debug!(width = size.width, height = size.height, "canvas resized");
        self.notifier.begin_batch();
        self.notifier.notify(Channel::CanvasSize);
        self.notifier.notify(Channel::Render);
        self.notifier.end_batch();
    }

    fn active_layer(&self) -> Option<LayerId> {
        self.active
    }

    fn set_active_layer(&mut self, id: LayerId) -> CanvasResult<()> {
        if self.index_of(id).is_none() {
            return Err(CanvasError::LayerNotFound(id));
        }
        self.set_active(Some(id));
        Ok(())
    }

    fn begin_batch(&self) {
        self.notifier.begin_batch();
    }

    fn end_batch(&self) {
        self.notifier.end_batch();
    }

    fn flush_warnings(&mut self) {
        for layer in &mut self.layers {
            for warning in layer.take_warnings() {
                self.notifier.warn(warning);
            }
        }
    }
}

/// Whether `upper` can be merged into `lower` by concatenating strokes
/// without changing how the pair renders.
///
/// Upper strokes must all draw source-over: an eraser or a multiply stroke
/// only ever touched the upper layer and would reach lower pixels once moved.
fn merges_as_vector(lower: &Layer, upper: &Layer) -> bool {
    lower.opacity() >= 1.0
        && upper.opacity() >= 1.0
        && lower.blend_mode().is_normal()
        && upper.blend_mode().is_normal()
        && upper.base_image().is_none()
        && upper.strokes().iter().all(|s| s.brush().blend_mode().is_normal())
}

/// Build the layer that replaces `lower` and `upper` after a merge-down.
///
/// The result has a new ID and takes the lower layer's name. Layers that
/// blend as plain source-over keep their strokes as vectors; otherwise both
/// composites are baked into a base image. A hidden layer contributes
/// nothing, so merging into a hidden lower layer keeps only the upper one.
///
/// # Errors
///
/// Returns [`CanvasError::LayerLocked`] if either layer is locked, or
/// [`CanvasError::Allocation`] if the merge buffer cannot be allocated.
pub fn merge_layers(lower: &mut Layer, upper: &mut Layer) -> CanvasResult<Layer> {
    for layer in [&*lower, &*upper] {
        if layer.is_locked() {
            return Err(CanvasError::LayerLocked(layer.id()));
        }
    }
    let name = lower.name().to_string();
    if !upper.is_visible() {
        return Ok(lower.duplicate(name));
    }
    if !lower.is_visible() {
        return Ok(upper.duplicate(name));
    }
    if merges_as_vector(lower, upper) {
        let mut merged = lower.duplicate(name);
        merged.add_strokes_batch(upper.strokes().iter().cloned())?;
        return Ok(merged);
    }

    let size = lower.canvas_size();
    let policy = *lower.policy();
    let mut buffer = cache::allocate(size, 1, policy.layer_cache_bytes)?;
    for layer in [&mut *lower, &mut *upper] {
        if !layer.is_visible() {
            continue;
        }
        layer.update_composite_cache()?;
        if let Some(composite) = layer.composite() {
            let paint = PixmapPaint {
                blend_mode: layer.blend_mode().to_skia(),
                ..PixmapPaint::default()
            };
            buffer.draw_pixmap(0, 0, composite.as_ref(), &paint, Transform::identity(), None);
        }
    }
    let mut merged = Layer::new(name, size).with_policy(policy);
    merged.set_base_image(Some(BaseImage::from_pixmap(buffer)));
    Ok(merged)
}

/// Bake every visible layer into one layer.
///
/// # Errors
///
/// Returns [`CanvasError::Allocation`] if the buffer cannot be allocated.
pub fn flatten_layers(layers: &mut [Layer], size: CanvasSize, policy: RasterPolicy) -> CanvasResult<Layer> {
    let mut buffer = cache::allocate(size, 1, policy.layer_cache_bytes)?;
    for layer in layers.iter_mut().filter(|l| l.is_visible()) {
        layer.update_composite_cache()?;
        if let Some(composite) = layer.composite() {
            let paint = PixmapPaint {
                blend_mode: layer.blend_mode().to_skia(),
                ..PixmapPaint::default()
            };
            buffer.draw_pixmap(0, 0, composite.as_ref(), &paint, Transform::identity(), None);
        }
    }
    let mut flat = Layer::new("Background", size).with_policy(policy);
    flat.set_base_image(Some(BaseImage::from_pixmap(buffer)));
    Ok(flat)
}
