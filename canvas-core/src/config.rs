//! Editor tuning and limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CanvasResult;

/// When and how pending strokes are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RasterPolicy {
    /// Quiet time after the last stroke append before rasterizing.
    #[serde(rename = "idleDelayMs", with = "duration_ms")]
    pub idle_delay: Duration,
    /// Rasterize immediately once more than this many strokes are pending.
    pub force_threshold: usize,
    /// Soft-edge coefficient `k` in `sigma = size * (1 - hardness) * k`.
    pub blur_coefficient: f32,
    /// Memory allowed for one layer's canvas-sized cache tiers.
    pub layer_cache_bytes: usize,
}

impl Default for RasterPolicy {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(500),
            force_threshold: 20,
            blur_coefficient: 0.5,
            layer_cache_bytes: 512 * 1024 * 1024, // 512 MB
        }
    }
}

/// Undo history limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Oldest actions are evicted past this depth.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

/// Top-level editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Rasterization policy applied to every layer.
    pub raster: RasterPolicy,
    /// History limits.
    pub history: HistoryConfig,
    /// Edge length of layer thumbnails in pixels.
    pub thumbnail_size: u32,
    /// Number of recent colors remembered.
    pub recent_colors: usize,
    /// Depth of the selection's own undo stack.
    pub selection_history_depth: usize,
    /// Buffer size of each notification channel.
    pub notify_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            raster: RasterPolicy::default(),
            history: HistoryConfig::default(),
            thumbnail_size: 64,
            recent_colors: 16,
            selection_history_depth: 50,
            notify_capacity: 64,
        }
    }
}

impl EditorConfig {
    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Serialization`] for invalid JSON.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CanvasError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.raster.idle_delay, Duration::from_millis(500));
        assert_eq!(config.raster.force_threshold, 20);
        assert!((config.raster.blur_coefficient - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.history.max_depth, 100);
        assert_eq!(config.thumbnail_size, 64);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            EditorConfig::from_json(r#"{"raster":{"idleDelayMs":250},"history":{"maxDepth":5}}"#)
                .expect("parse");
        assert_eq!(config.raster.idle_delay, Duration::from_millis(250));
        assert_eq!(config.raster.force_threshold, 20);
        assert_eq!(config.history.max_depth, 5);
        assert_eq!(config.recent_colors, 16);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EditorConfig::default();
        let json = config.to_json().expect("serialize");
        assert!(json.contains("idleDelayMs"));
        assert_eq!(EditorConfig::from_json(&json).expect("parse"), config);
    }

    #[test]
    fn test_invalid_json() {
        assert!(EditorConfig::from_json("{not json").is_err());
    }
}
