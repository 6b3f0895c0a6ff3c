//! Deferred rasterization.
//!
//! A [`RasterJob`] is a snapshot of the work needed to bring a layer's
//! rasterized tier up to date. It owns everything it needs (strokes are
//! shared `Arc`s), so it can run as an async task interleaved with input
//! handling. The result is applied with [`Layer::apply_raster`], which drops
//! it if the layer's generation moved on while the job ran.

use std::sync::Arc;

use tiny_skia::Pixmap;

use crate::layer::{cache, BaseImage, Layer};
use crate::raster::render_stroke;
use crate::{CanvasResult, CanvasSize, LayerId, LayerManager, RasterPolicy, Stroke};

/// Work captured from a layer at job start.
#[derive(Debug, Clone)]
pub struct RasterJob {
    pub(crate) layer: LayerId,
    pub(crate) generation: u64,
    pub(crate) expected_count: usize,
    pub(crate) end: usize,
    pub(crate) full_rebuild: bool,
    pub(crate) size: CanvasSize,
    pub(crate) blur_coefficient: f32,
    pub(crate) budget_bytes: usize,
    pub(crate) seed: Option<Arc<Pixmap>>,
    pub(crate) base: Option<BaseImage>,
    pub(crate) strokes: Vec<Arc<Stroke>>,
}

impl RasterJob {
    /// Layer this job belongs to.
    #[must_use]
    pub const fn layer(&self) -> LayerId {
        self.layer
    }

    /// Generation captured at job start.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the job redraws the tier from the first stroke.
    #[must_use]
    pub const fn is_full_rebuild(&self) -> bool {
        self.full_rebuild
    }

    /// Number of strokes the job draws.
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    fn prepare(&self) -> CanvasResult<Pixmap> {
        if let Some(seed) = &self.seed {
            return Ok(Pixmap::clone(seed));
        }
        let mut pixmap = cache::allocate(self.size, 2, self.budget_bytes)?;
        if let Some(base) = &self.base {
            base.draw_onto(&mut pixmap);
        }
        Ok(pixmap)
    }

    fn finish(self, pixmap: Pixmap) -> RasterResult {
        RasterResult {
            layer: self.layer,
            generation: self.generation,
            expected_count: self.expected_count,
            end: self.end,
            full_rebuild: self.full_rebuild,
            pixmap,
        }
    }

    /// Run to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Allocation`] if the tier cannot be allocated.
    pub fn run_blocking(self) -> CanvasResult<RasterResult> {
        let mut pixmap = self.prepare()?;
        for stroke in &self.strokes {
            render_stroke(&mut pixmap, stroke, self.blur_coefficient)?;
        }
        Ok(self.finish(pixmap))
    }

    /// Run cooperatively, yielding to the executor between strokes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Allocation`] if the tier cannot be allocated.
    pub async fn run(self) -> CanvasResult<RasterResult> {
        let mut pixmap = self.prepare()?;
        for stroke in &self.strokes {
            render_stroke(&mut pixmap, stroke, self.blur_coefficient)?;
            tokio::task::yield_now().await;
        }
        Ok(self.finish(pixmap))
    }
}

/// Output of a finished [`RasterJob`].
#[derive(Debug)]
pub struct RasterResult {
    pub(crate) layer: LayerId,
    pub(crate) generation: u64,
    pub(crate) expected_count: usize,
    pub(crate) end: usize,
    pub(crate) full_rebuild: bool,
    pub(crate) pixmap: Pixmap,
}

impl RasterResult {
    /// Layer the result belongs to.
    #[must_use]
    pub const fn layer(&self) -> LayerId {
        self.layer
    }

    /// Stroke count covered by the result.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }
}

/// Summary of one scheduler flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Results applied to their layers.
    pub applied: usize,
    /// Results dropped because the layer changed underneath them.
    pub discarded: usize,
    /// Jobs that failed to allocate and degraded their layer.
    pub degraded: usize,
}

/// Runs deferred rasterization according to a [`RasterPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RasterScheduler {
    policy: RasterPolicy,
}

impl RasterScheduler {
    /// Create a scheduler.
    #[must_use]
    pub const fn new(policy: RasterPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RasterPolicy {
        &self.policy
    }

    /// Whether a layer should be rasterized now.
    #[must_use]
    pub fn is_due(&self, layer: &Layer, now: tokio::time::Instant) -> bool {
        layer.needs_rasterize(now)
    }

    /// Sleep for the idle delay.
    pub async fn wait_idle(&self) {
        tokio::time::sleep(self.policy.idle_delay).await;
    }

    /// Run one job.
    ///
    /// # Errors
    ///
    /// Propagates allocation failure from the job.
    pub async fn run(&self, job: RasterJob) -> CanvasResult<RasterResult> {
        tracing::trace!(
            layer = %job.layer,
            strokes = job.strokes.len(),
            full = job.full_rebuild,
            "raster job started"
        );
        job.run().await
    }

    /// Rasterize every layer that is due, applying results as they finish.
    pub async fn flush_due(&self, layers: &mut LayerManager) -> FlushReport {
        let now = tokio::time::Instant::now();
        let jobs = layers.due_raster_jobs(now);
        let mut report = FlushReport::default();
        for job in jobs {
            let id = job.layer;
            match self.run(job).await {
                Ok(result) => {
                    if layers.apply_raster(result) {
                        report.applied += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(layer = %id, "raster job failed: {err}");
                    layers.degrade_layer(id);
                    report.degraded += 1;
                }
            }
        }
        if report.applied + report.discarded + report.degraded > 0 {
            tracing::debug!(
                applied = report.applied,
                discarded = report.discarded,
                degraded = report.degraded,
                "raster flush complete"
            );
        }
        report
    }
}
