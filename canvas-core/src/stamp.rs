//! Brush stamp cache.
//!
//! Pressure-sensitive strokes are rendered as a sequence of dabs. Each dab is
//! a pre-rendered soft circle ("stamp") for one brush size, hardness and
//! color. Stamps are expensive to build (blur pass) and reused heavily, so
//! they live in a process-wide LRU cache shared by every canvas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

use crate::raster::{gaussian_blur, new_pixmap};
use crate::{BrushParams, CanvasResult, Color};

/// Cache key: brush diameter in quarter pixels, hardness and blur in
/// thousandths, and the dab color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StampKey {
    quarter_px: u32,
    hardness_milli: u16,
    blur_milli: u16,
    color: Color,
}

impl StampKey {
    /// Key for a brush at the given blur coefficient.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_brush(brush: &BrushParams, blur_coefficient: f32) -> Self {
        let color = if brush.blend_mode().is_clearing() {
            Color::BLACK
        } else {
            brush.color()
        };
        Self {
            quarter_px: (brush.size() * 4.0).round().max(1.0) as u32,
            hardness_milli: (brush.hardness() * 1000.0).round() as u16,
            blur_milli: (blur_coefficient.clamp(0.0, 10.0) * 1000.0).round() as u16,
            color,
        }
    }

    /// Brush diameter in pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn diameter(&self) -> f32 {
        self.quarter_px as f32 / 4.0
    }

    fn sigma(&self) -> f32 {
        let hardness = f32::from(self.hardness_milli) / 1000.0;
        let k = f32::from(self.blur_milli) / 1000.0;
        if hardness >= 1.0 {
            0.0
        } else {
            self.diameter() * (1.0 - hardness) * k
        }
    }
}

/// A rendered dab, centered at (`center`, `center`) in its pixmap.
#[derive(Debug)]
pub struct Stamp {
    /// Premultiplied dab pixels.
    pub pixmap: Pixmap,
    /// Center offset within the pixmap.
    pub center: f32,
}

impl Stamp {
    /// Render the dab for a key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Allocation`] if the pixmap cannot be created.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build(key: &StampKey) -> CanvasResult<Self> {
        let radius = key.diameter() / 2.0;
        let sigma = key.sigma();
        let pad = (sigma * 3.0).ceil() + 1.0;
        let side = ((radius + pad) * 2.0).ceil().max(1.0) as u32;
        let mut pixmap = new_pixmap(side, side)?;
        #[allow(clippy::cast_precision_loss)]
        let center = side as f32 / 2.0;

        let mut paint = Paint::default();
        paint.set_color(key.color.to_skia());
        paint.anti_alias = true;
        if let Some(circle) = PathBuilder::from_circle(center, center, radius.max(0.25)) {
            pixmap.fill_path(&circle, &paint, FillRule::Winding, Transform::identity(), None);
        }
        gaussian_blur(&mut pixmap, sigma);
        Ok(Self { pixmap, center })
    }

    fn size_bytes(&self) -> usize {
        self.pixmap.data().len()
    }
}

/// Limits for the stamp cache.
#[derive(Debug, Clone)]
pub struct StampCacheConfig {
    /// Maximum total pixel bytes.
    pub max_size_bytes: usize,
    /// Maximum number of stamps.
    pub max_entries: usize,
}

impl Default for StampCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 32 * 1024 * 1024, // 32 MB
            max_entries: 256,
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StampCacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
    /// Total bytes rendered into stamps.
    pub bytes_built: u64,
}

#[derive(Debug)]
struct CacheEntry {
    stamp: Arc<Stamp>,
    last_accessed: Instant,
    size_bytes: usize,
}

/// LRU cache of rendered stamps with size and count limits.
#[derive(Debug)]
pub struct StampCache {
    entries: HashMap<StampKey, CacheEntry>,
    config: StampCacheConfig,
    current_size: usize,
    stats: StampCacheStats,
}

impl StampCache {
    /// Create an empty cache with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StampCacheConfig::default())
    }

    /// Create an empty cache with custom limits.
    #[must_use]
    pub fn with_config(config: StampCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            current_size: 0,
            stats: StampCacheStats::default(),
        }
    }

    /// Look up a stamp.
    pub fn get(&mut self, key: &StampKey) -> Option<Arc<Stamp>> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = Instant::now();
            self.stats.hits += 1;
            Some(Arc::clone(&entry.stamp))
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Return the cached stamp, rendering and inserting it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates allocation failure from [`Stamp::build`].
    pub fn get_or_build(&mut self, key: &StampKey) -> CanvasResult<Arc<Stamp>> {
        if let Some(stamp) = self.get(key) {
            return Ok(stamp);
        }
        let stamp = Arc::new(Stamp::build(key)?);
        self.insert(*key, Arc::clone(&stamp));
        Ok(stamp)
    }

    /// Insert a stamp, evicting least recently used entries past the limits.
    pub fn insert(&mut self, key: StampKey, stamp: Arc<Stamp>) {
        let size_bytes = stamp.size_bytes();
        if let Some(old) = self.entries.remove(&key) {
            self.current_size -= old.size_bytes;
        }
        self.evict_if_needed(size_bytes);
        self.current_size += size_bytes;
        self.stats.bytes_built += size_bytes as u64;
        self.entries.insert(
            key,
            CacheEntry {
                stamp,
                last_accessed: Instant::now(),
                size_bytes,
            },
        );
    }

    /// Whether a stamp is cached.
    #[must_use]
    pub fn contains(&self, key: &StampKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every stamp.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_size = 0;
    }

    /// Number of cached stamps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total cached bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.current_size
    }

    /// Hit/miss/eviction counters.
    #[must_use]
    pub const fn stats(&self) -> &StampCacheStats {
        &self.stats
    }

    fn evict_if_needed(&mut self, needed_bytes: usize) {
        while self.current_size + needed_bytes > self.config.max_size_bytes
            && !self.entries.is_empty()
        {
            self.evict_lru();
        }
        while self.entries.len() >= self.config.max_entries && !self.entries.is_empty() {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size -= entry.size_bytes;
                self.stats.evictions += 1;
            }
        }
    }
}

impl Default for StampCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a stamp cache.
#[derive(Debug, Default)]
pub struct SharedStampCache {
    inner: Mutex<StampCache>,
}

impl SharedStampCache {
    /// Wrap a cache.
    #[must_use]
    pub fn new(cache: StampCache) -> Self {
        Self {
            inner: Mutex::new(cache),
        }
    }

    /// See [`StampCache::get_or_build`].
    ///
    /// # Errors
    ///
    /// Propagates allocation failure.
    pub fn get_or_build(&self, key: &StampKey) -> CanvasResult<Arc<Stamp>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_build(key)
    }

    /// Render the stamp a brush will need ahead of its first stroke.
    ///
    /// # Errors
    ///
    /// Propagates allocation failure.
    pub fn warm(&self, brush: &BrushParams, blur_coefficient: f32) -> CanvasResult<()> {
        let key = StampKey::for_brush(brush, blur_coefficient);
        self.get_or_build(&key).map(|_| ())
    }

    /// Whether the stamp for a brush is already cached.
    #[must_use]
    pub fn is_warm(&self, brush: &BrushParams, blur_coefficient: f32) -> bool {
        let key = StampKey::for_brush(brush, blur_coefficient);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> StampCacheStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
            .clone()
    }

    /// Number of cached stamps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no stamps are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static SHARED: Mutex<Option<Arc<SharedStampCache>>> = Mutex::new(None);

/// Process-wide stamp cache, created on first use.
#[must_use]
pub fn shared() -> Arc<SharedStampCache> {
    let mut slot = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert_with(|| {
        tracing::debug!("creating shared stamp cache");
        Arc::new(SharedStampCache::default())
    }))
}

/// Release the process-wide stamp cache. Call at application shutdown.
///
/// Handles already obtained from [`shared`] stay valid; the next call to
/// [`shared`] builds a fresh cache.
pub fn teardown() {
    let previous = SHARED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if previous.is_some() {
        tracing::debug!("shared stamp cache torn down");
    }
}
