//! Persisted document records and the collaborators used to load them.
//!
//! ```text
//! Canvas { width, height, background, layers: [Layer...] }
//! Layer  { id, orderIndex, name, strokes, baseImageRef, opacity, blendMode, visible, locked }
//! ```

use std::collections::{HashMap, HashSet};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tiny_skia::Pixmap;

use crate::layer::{BaseImage, Layer};
use crate::{
    Background, BlendMode, CanvasError, CanvasResult, CanvasSize, LayerId, RasterPolicy, Stroke,
};

/// Encoded image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG at a quality in 1..=100.
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
}

impl ImageFormat {
    /// MIME type for data URIs.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Decode bytes into pixels and encode pixels into bytes.
///
/// Pixmaps are premultiplied RGBA8.
pub trait ImageCodec: Send + Sync {
    /// Decode an encoded image.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Decode`] if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> CanvasResult<Pixmap>;

    /// Encode pixels.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Decode`] if encoding fails.
    fn encode(&self, pixmap: &Pixmap, format: ImageFormat) -> CanvasResult<Vec<u8>>;
}

/// Looks up base-image bytes by reference (asset path, content hash, ...).
pub trait AssetResolver {
    /// Bytes for a reference, or `None` if unknown.
    fn resolve(&self, reference: &str) -> Option<Vec<u8>>;
}

/// Resolver with no assets; only inline `data:` references load.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetResolver for NoAssets {
    fn resolve(&self, _reference: &str) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory asset table.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes under a reference.
    pub fn insert(&mut self, reference: impl Into<String>, bytes: Vec<u8>) {
        self.assets.insert(reference.into(), bytes);
    }
}

impl AssetResolver for MemoryAssets {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        self.assets.get(reference).cloned()
    }
}

/// Uncompressed codec: `RAW0`, width and height as little-endian `u32`,
/// then premultiplied RGBA8 rows. Ignores the requested format.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RawCodec {
    const MAGIC: &'static [u8; 4] = b"RAW0";
}

impl ImageCodec for RawCodec {
    fn decode(&self, bytes: &[u8]) -> CanvasResult<Pixmap> {
        let bad = |msg: &str| CanvasError::Decode(msg.to_string());
        let header = bytes.get(..12).ok_or_else(|| bad("truncated header"))?;
        if &header[..4] != Self::MAGIC {
            return Err(bad("not a raw image"));
        }
        let word = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
        let (width, height) = (word(4), word(8));
        let size = tiny_skia::IntSize::from_wh(width, height).ok_or_else(|| bad("zero size"))?;
        let data = bytes[12..].to_vec();
        Pixmap::from_vec(data, size).ok_or_else(|| bad("pixel data length mismatch"))
    }

    fn encode(&self, pixmap: &Pixmap, _format: ImageFormat) -> CanvasResult<Vec<u8>> {
        let mut out = Vec::with_capacity(12 + pixmap.data().len());
        out.extend_from_slice(Self::MAGIC);
        out.extend_from_slice(&pixmap.width().to_le_bytes());
        out.extend_from_slice(&pixmap.height().to_le_bytes());
        out.extend_from_slice(pixmap.data());
        Ok(out)
    }
}

/// Build a base64 `data:` URI.
#[must_use]
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Decode the payload of a base64 `data:` URI.
///
/// # Errors
///
/// Returns [`CanvasError::Decode`] if the URI is not base64 data.
pub fn decode_data_uri(uri: &str) -> CanvasResult<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CanvasError::Decode("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| CanvasError::Decode("data URI has no payload".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(CanvasError::Decode("data URI is not base64".to_string()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| CanvasError::Decode(e.to_string()))
}

/// Serialized layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    /// Layer identifier.
    pub id: LayerId,
    /// Position in the stack, bottom first.
    pub order_index: usize,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Strokes in drawing order.
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    /// Asset reference or `data:` URI of the base image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image_ref: Option<String>,
    /// Base image offset in canvas coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image_offset: Option<[f32; 2]>,
    /// Opacity in [0, 1].
    #[serde(default = "LayerRecord::default_opacity")]
    pub opacity: f32,
    /// Blend mode.
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Visibility flag.
    #[serde(default = "LayerRecord::default_visible")]
    pub visible: bool,
    /// Lock flag.
    #[serde(default)]
    pub locked: bool,
}

impl LayerRecord {
    const fn default_opacity() -> f32 {
        1.0
    }

    const fn default_visible() -> bool {
        true
    }
}

/// Serialized canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasRecord {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Background shown beneath transparent pixels.
    #[serde(default)]
    pub background: Background,
    /// Layers; `orderIndex` defines the stack order.
    pub layers: Vec<LayerRecord>,
}

impl CanvasRecord {
    /// Parse and validate.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Serialization`] for malformed or truncated JSON
    /// and [`CanvasError::MalformedDocument`] for structurally invalid content.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check sizes, IDs and ordering.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::MalformedDocument`] describing the first problem found.
    pub fn validate(&self) -> CanvasResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CanvasError::MalformedDocument(format!(
                "canvas size {}x{} is empty",
                self.width, self.height
            )));
        }
        let mut ids = HashSet::new();
        let mut orders = HashSet::new();
        for layer in &self.layers {
            if !ids.insert(layer.id) {
                return Err(CanvasError::MalformedDocument(format!(
                    "duplicate layer id {}",
                    layer.id
                )));
            }
            if !orders.insert(layer.order_index) {
                return Err(CanvasError::MalformedDocument(format!(
                    "duplicate orderIndex {}",
                    layer.order_index
                )));
            }
            if !layer.opacity.is_finite() {
                return Err(CanvasError::MalformedDocument(format!(
                    "layer {} has non-finite opacity",
                    layer.id
                )));
            }
        }
        Ok(())
    }

    /// Canvas dimensions.
    #[must_use]
    pub const fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }

    /// Layers sorted bottom to top.
    #[must_use]
    pub fn ordered_layers(&self) -> Vec<&LayerRecord> {
        let mut layers: Vec<_> = self.layers.iter().collect();
        layers.sort_by_key(|l| l.order_index);
        layers
    }
}

impl Layer {
    /// Produce the persisted record.
    ///
    /// An in-memory base image without a reference is embedded as a PNG
    /// `data:` URI, which needs a codec.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if an embedded image needs
    /// encoding and no codec was given, or the codec's error.
    pub fn to_record(
        &self,
        order_index: usize,
        codec: Option<&dyn ImageCodec>,
    ) -> CanvasResult<LayerRecord> {
        let (base_image_ref, base_image_offset) = match &self.base_image {
            None => (None, None),
            Some(base) => {
                let reference = match (base.reference(), base.pixmap()) {
                    (Some(r), _) => Some(r.to_string()),
                    (None, Some(pixmap)) => {
                        let codec = codec.ok_or_else(|| {
                            CanvasError::InvalidOperation(format!(
                                "layer {} has an embedded image but no codec was provided",
                                self.id
                            ))
                        })?;
                        let bytes = codec.encode(pixmap, ImageFormat::Png)?;
                        Some(encode_data_uri(ImageFormat::Png.mime_type(), &bytes))
                    }
                    (None, None) => None,
                };
                let (x, y) = base.offset();
                let offset = (x != 0.0 || y != 0.0).then_some([x, y]);
                (reference, offset)
            }
        };
        Ok(LayerRecord {
            id: self.id,
            order_index,
            name: self.name.clone(),
            strokes: self.strokes.iter().map(|s| Stroke::clone(s)).collect(),
            base_image_ref,
            base_image_offset,
            opacity: self.opacity,
            blend_mode: self.blend_mode,
            visible: self.visible,
            locked: self.locked,
        })
    }

    /// Rebuild a layer from its record. Every cache starts invalid.
    ///
    /// Base images are resolved through `assets` (inline `data:` URIs are
    /// decoded directly) and decoded with `codec`. A decode failure, or a
    /// missing codec, leaves the layer without pixels and records a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::MalformedDocument`] if a base-image reference is
    /// neither a valid `data:` URI nor known to `assets`.
    pub fn from_record(
        record: LayerRecord,
        size: CanvasSize,
        policy: RasterPolicy,
        assets: &dyn AssetResolver,
        codec: Option<&dyn ImageCodec>,
    ) -> CanvasResult<Self> {
        let mut layer = Self::with_id(record.id, record.name, size).with_policy(policy);
        layer.visible = record.visible;
        layer.opacity = record.opacity.clamp(0.0, 1.0);
        layer.blend_mode = record.blend_mode;
        layer.strokes = record.strokes.into_iter().map(std::sync::Arc::new).collect();
        layer.rasterized_count = layer.strokes.len();

        if let Some(reference) = record.base_image_ref {
            let bytes = if reference.starts_with("data:") {
                decode_data_uri(&reference).map_err(|e| {
                    CanvasError::MalformedDocument(format!("layer {}: {e}", record.id))
                })?
            } else {
                assets.resolve(&reference).ok_or_else(|| {
                    CanvasError::MalformedDocument(format!(
                        "layer {} references unknown asset {reference}",
                        record.id
                    ))
                })?
            };
            // Inline images are stored as embedded pixels, not references.
            let keep_reference = (!reference.starts_with("data:")).then_some(reference);
            match codec {
                Some(codec) => {
                    layer.load_base_image(keep_reference, &bytes, codec);
                }
                None => {
                    layer.warnings.push(crate::CanvasWarning::BaseImageDecode {
                        layer: layer.id,
                        message: "no image codec available".to_string(),
                    });
                    tracing::warn!(layer = %layer.id, "no codec to decode base image");
                    layer.base_image = keep_reference.map(|r| BaseImage::referenced(r, None));
                }
            }
            // A failed inline image leaves no base image at all.
            if let Some([x, y]) = record.base_image_offset {
                layer.base_image = layer.base_image.take().map(|b| b.at(x, y));
            }
        }
        layer.locked = record.locked;
        layer.cache.clear();
        layer.bounds = None;
        Ok(layer)
    }

    /// Serialize this layer alone to JSON.
    ///
    /// # Errors
    ///
    /// See [`Layer::to_record`].
    pub fn serialize(&self, codec: Option<&dyn ImageCodec>) -> CanvasResult<String> {
        Ok(serde_json::to_string(&self.to_record(0, codec)?)?)
    }

    /// Deserialize a layer produced by [`Layer::serialize`].
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Serialization`] for malformed JSON, or the
    /// errors of [`Layer::from_record`].
    pub fn deserialize(
        json: &str,
        size: CanvasSize,
        policy: RasterPolicy,
        assets: &dyn AssetResolver,
        codec: Option<&dyn ImageCodec>,
    ) -> CanvasResult<Self> {
        let record: LayerRecord = serde_json::from_str(json)?;
        Self::from_record(record, size, policy, assets, codec)
    }
}
