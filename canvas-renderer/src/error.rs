//! Renderer error types.

use canvas_core::CanvasError;
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while producing frames or exports.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A surface could not be allocated.
    #[error("Surface allocation failed: {width}x{height}")]
    Surface {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Encoding an export failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Decoding an image failed.
    #[error("Decoding failed: {0}")]
    Decode(String),

    /// The document refused the operation.
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

impl RenderError {
    pub(crate) const fn surface(width: u32, height: u32) -> Self {
        Self::Surface { width, height }
    }
}

impl From<RenderError> for CanvasError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Canvas(inner) => inner,
            RenderError::Surface { width, height } => Self::Allocation { width, height },
            RenderError::Encode(msg) | RenderError::Decode(msg) => Self::Decode(msg),
        }
    }
}
