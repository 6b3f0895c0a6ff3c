//! Error types for canvas operations.

use thiserror::Error;

use crate::LayerId;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Layer not found in the stack.
    #[error("Layer not found: {0}")]
    LayerNotFound(LayerId),

    /// The layer is locked against edits.
    #[error("Layer is locked: {0}")]
    LayerLocked(LayerId),

    /// Invalid operation on the document.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document parsed but its contents are not usable.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Image bytes could not be decoded or encoded.
    #[error("Image codec error: {0}")]
    Decode(String),

    /// A raster surface could not be allocated.
    #[error("Failed to allocate {width}x{height} surface")]
    Allocation {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// Settings store failure.
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Non-fatal conditions that the core absorbs but reports to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasWarning {
    /// A base image failed to decode; the layer renders as empty.
    BaseImageDecode {
        /// Affected layer.
        layer: LayerId,
        /// Codec message.
        message: String,
    },
    /// Cache allocation failed; the layer now runs with a single cache tier.
    DegradedCache {
        /// Affected layer.
        layer: LayerId,
    },
}

impl std::fmt::Display for CanvasWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BaseImageDecode { layer, message } => {
                write!(f, "base image for layer {layer} failed to decode: {message}")
            }
            Self::DegradedCache { layer } => {
                write!(f, "layer {layer} switched to flattened cache mode")
            }
        }
    }
}
