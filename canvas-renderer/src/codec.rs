//! [`ImageCodec`] backed by the `image` crate.

use canvas_core::{CanvasError, CanvasResult, Color, ImageCodec, ImageFormat};
use image::ImageEncoder;
use tiny_skia::{ColorU8, Pixmap};

/// PNG/JPEG codec for base-image import and export.
///
/// Decoding accepts any format the `image` crate was built with. JPEG output
/// has no alpha, so pixels are flattened over [`Self::matte`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCrateCodec {
    /// Backdrop for formats without alpha.
    pub matte: Color,
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self {
            matte: Color::WHITE,
        }
    }
}

impl ImageCrateCodec {
    /// Codec with a white matte.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> CanvasResult<Pixmap> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|e| CanvasError::Decode(e.to_string()))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut pixmap = Pixmap::new(width, height).ok_or(CanvasError::Allocation { width, height })?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        tracing::trace!(width, height, "image decoded");
        Ok(pixmap)
    }

    fn encode(&self, pixmap: &Pixmap, format: ImageFormat) -> CanvasResult<Vec<u8>> {
        let (width, height) = (pixmap.width(), pixmap.height());
        let mut buf = std::io::Cursor::new(Vec::new());
        match format {
            ImageFormat::Png => {
                let data: Vec<u8> = pixmap
                    .pixels()
                    .iter()
                    .flat_map(|p| {
                        let c = p.demultiply();
                        [c.red(), c.green(), c.blue(), c.alpha()]
                    })
                    .collect();
                image::codecs::png::PngEncoder::new(&mut buf)
                    .write_image(&data, width, height, image::ColorType::Rgba8.into())
                    .map_err(|e| CanvasError::Decode(format!("PNG encoding failed: {e}")))?;
            }
            ImageFormat::Jpeg { quality } => {
                let data = flatten_rgb(pixmap, self.matte);
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                    .write_image(&data, width, height, image::ColorType::Rgb8.into())
                    .map_err(|e| CanvasError::Decode(format!("JPEG encoding failed: {e}")))?;
            }
        }
        Ok(buf.into_inner())
    }
}

/// Composite premultiplied pixels over an opaque matte, dropping alpha.
#[must_use]
pub fn flatten_rgb(pixmap: &Pixmap, matte: Color) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.pixels().len() * 3);
    for p in pixmap.pixels() {
        let inv = 255 - u16::from(p.alpha());
        for (channel, back) in [(p.red(), matte.r), (p.green(), matte.g), (p.blue(), matte.b)] {
            let blended = u16::from(channel) + (u16::from(back) * inv + 127) / 255;
            out.push(u8::try_from(blended.min(255)).unwrap_or(u8::MAX));
        }
    }
    out
}
