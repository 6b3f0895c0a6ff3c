//! Flattened export for the generation pipeline.
//!
//! The visible layers are composited at canvas resolution, optionally scaled
//! and matted, then encoded. The display checkerboard never appears in an
//! export.

use std::sync::Arc;

use canvas_core::document::encode_data_uri;
use canvas_core::{Color, ImageCodec, ImageFormat, LayerManager};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::error::{RenderError, RenderResult};

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// PNG with alpha.
    #[default]
    Png,
    /// JPEG, flattened over the background.
    Jpeg,
}

/// Configuration for flattened export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Output format.
    pub format: ExportFormat,
    /// Backdrop composited under the layers; `None` keeps transparency.
    pub background: Option<Color>,
    /// JPEG quality 1-100 (default: 85).
    pub jpeg_quality: u8,
    /// Scale factor applied to the canvas size.
    pub scale: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            background: None,
            jpeg_quality: 85,
            scale: 1.0,
        }
    }
}

impl ExportConfig {
    fn image_format(&self) -> ImageFormat {
        match self.format {
            ExportFormat::Png => ImageFormat::Png,
            ExportFormat::Jpeg => ImageFormat::Jpeg {
                quality: self.jpeg_quality.clamp(1, 100),
            },
        }
    }
}

/// An encoded export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime: &'static str,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

impl ExportedImage {
    /// Base64 `data:` URI of the encoded bytes.
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        encode_data_uri(self.mime, &self.bytes)
    }
}

/// Renders the layer stack to an encoded image.
pub struct Exporter {
    config: ExportConfig,
    codec: Arc<dyn ImageCodec>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Create an exporter encoding through `codec`.
    #[must_use]
    pub fn new(config: ExportConfig, codec: Arc<dyn ImageCodec>) -> Self {
        Self { config, codec }
    }

    /// Exporter with default configuration and the `image`-crate codec.
    #[cfg(feature = "images")]
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            ExportConfig::default(),
            Arc::new(crate::codec::ImageCrateCodec::new()),
        )
    }

    /// Export configuration.
    #[must_use]
    pub const fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Flatten, scale and matte the visible layers without encoding.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] if a buffer cannot be allocated.
    pub fn render(&self, layers: &mut LayerManager) -> RenderResult<Pixmap> {
        let flat = layers.render_flattened()?;
        let scale = if self.config.scale.is_finite() && self.config.scale > 0.0 {
            self.config.scale
        } else {
            1.0
        };
        let (width, height) = scaled_size(flat.width(), flat.height(), scale);
        let mut out = Pixmap::new(width, height).ok_or_else(|| RenderError::surface(width, height))?;
        if let Some(background) = self.config.background {
            out.fill(background.to_skia());
        }
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        out.draw_pixmap(0, 0, flat.as_ref(), &paint, Transform::from_scale(scale, scale), None);
        Ok(out)
    }

    /// Export the visible layers.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] on allocation failure or
    /// [`RenderError::Encode`] if the codec rejects the image.
    pub fn export(&self, layers: &mut LayerManager) -> RenderResult<ExportedImage> {
        let pixmap = self.render(layers)?;
        let format = self.config.image_format();
        let bytes = self
            .codec
            .encode(&pixmap, format)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        tracing::info!(
            width = pixmap.width(),
            height = pixmap.height(),
            bytes = bytes.len(),
            mime = format.mime_type(),
            "canvas exported"
        );
        Ok(ExportedImage {
            bytes,
            mime: format.mime_type(),
            width: pixmap.width(),
            height: pixmap.height(),
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale_dim = |d: u32| ((d as f32 * scale).round() as u32).max(1);
    (scale_dim(width), scale_dim(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size_never_zero() {
        assert_eq!(scaled_size(100, 50, 0.5), (50, 25));
        assert_eq!(scaled_size(3, 3, 0.01), (1, 1));
    }

    #[test]
    fn test_jpeg_quality_clamped() {
        let config = ExportConfig {
            format: ExportFormat::Jpeg,
            jpeg_quality: 0,
            ..ExportConfig::default()
        };
        assert_eq!(config.image_format(), ImageFormat::Jpeg { quality: 1 });
    }
}
