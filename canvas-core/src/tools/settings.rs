//! Per-tool settings and the key-value stores that persist them.
//!
//! Settings belong to the process, not the document: they survive document
//! switches and, with a file store, application restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::stroke::clamp_unit;
use crate::{BrushParams, CanvasError, CanvasResult, Color};

/// Adjustable parameters of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolSettings {
    /// Brush diameter in canvas pixels.
    pub size: f32,
    /// Edge hardness in [0, 1].
    pub hardness: f32,
    /// Stroke opacity in [0, 1].
    pub opacity: f32,
    /// Scale dabs by stylus pressure.
    pub pressure: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            size: 12.0,
            hardness: 1.0,
            opacity: 1.0,
            pressure: true,
        }
    }
}

impl ToolSettings {
    /// Largest brush diameter.
    pub const MAX_SIZE: f32 = 1000.0;

    /// Defaults with a different size.
    #[must_use]
    pub fn with_size(size: f32) -> Self {
        Self {
            size,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamp every field into range; non-finite values fall back to defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let size = if self.size.is_finite() {
            self.size.clamp(BrushParams::MIN_SIZE, Self::MAX_SIZE)
        } else {
            defaults.size
        };
        Self {
            size,
            hardness: clamp_unit(self.hardness, defaults.hardness),
            opacity: clamp_unit(self.opacity, defaults.opacity),
            pressure: self.pressure,
        }
    }

    /// Brush for painting with these settings.
    #[must_use]
    pub fn paint_brush(&self, color: Color) -> BrushParams {
        BrushParams::new(
            self.size,
            self.hardness,
            self.opacity,
            color,
            crate::BlendMode::Normal,
        )
    }

    /// Brush for erasing with these settings.
    #[must_use]
    pub fn eraser_brush(&self) -> BrushParams {
        let mut brush = BrushParams::eraser(self.size, self.hardness);
        brush.set_opacity(self.opacity);
        brush
    }
}

/// Key-value persistence for settings.
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Value stored under a key.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Settings`] if the backing storage cannot be read.
    fn load(&self, key: &str) -> CanvasResult<Option<String>>;

    /// Store a value.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Settings`] if the value cannot be persisted.
    fn save(&self, key: &str, value: &str) -> CanvasResult<()>;

    /// Delete a key. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Settings`] if the change cannot be persisted.
    fn remove(&self, key: &str) -> CanvasResult<()>;
}

/// Volatile store for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, key: &str) -> CanvasResult<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &str) -> CanvasResult<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CanvasResult<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object on disk.
///
/// The file is read once at open and rewritten on every change through a
/// temporary sibling file and a rename.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettingsStore {
    /// Open a store, reading existing values. A missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Settings`] if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> CanvasResult<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CanvasError::Settings(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(CanvasError::Settings(format!("{}: {e}", path.display()))),
        };
        tracing::debug!(path = %path.display(), "settings store opened");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> CanvasResult<()> {
        let io = |e: std::io::Error| CanvasError::Settings(format!("{}: {e}", self.path.display()));
        let json = serde_json::to_string_pretty(values)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, &self.path).map_err(io)
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn load(&self, key: &str) -> CanvasResult<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &str) -> CanvasResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> CanvasResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        let s = ToolSettings {
            size: -3.0,
            hardness: 2.0,
            opacity: f32::NAN,
            pressure: false,
        }
        .normalized();
        assert!((s.size - BrushParams::MIN_SIZE).abs() < f32::EPSILON);
        assert!((s.hardness - 1.0).abs() < f32::EPSILON);
        assert!((s.opacity - 1.0).abs() < f32::EPSILON);
        assert!(!s.pressure);
    }

    #[test]
    fn test_settings_json_defaults() {
        let s: ToolSettings = serde_json::from_str(r#"{"size":30}"#).expect("parse");
        assert!((s.size - 30.0).abs() < f32::EPSILON);
        assert!(s.pressure);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.load("a").expect("load"), None);
        store.save("a", "1").expect("save");
        assert_eq!(store.load("a").expect("load").as_deref(), Some("1"));
        store.remove("a").expect("remove");
        store.remove("a").expect("remove missing");
        assert_eq!(store.load("a").expect("load"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs").join("tools.json");
        {
            let store = JsonFileSettingsStore::open(&path).expect("open");
            store.save("tool.brush", r#"{"size":40}"#).expect("save");
        }
        let store = JsonFileSettingsStore::open(&path).expect("reopen");
        assert_eq!(
            store.load("tool.brush").expect("load").as_deref(),
            Some(r#"{"size":40}"#)
        );
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tools.json");
        std::fs::write(&path, "{oops").expect("write");
        assert!(matches!(
            JsonFileSettingsStore::open(&path),
            Err(CanvasError::Settings(_))
        ));
    }
}
