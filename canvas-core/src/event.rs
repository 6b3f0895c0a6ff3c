//! Input events forwarded by the hosting UI shell.

use serde::{Deserialize, Serialize};

use crate::{Point, StrokePoint};

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPhase {
    /// Button or stylus pressed.
    Down,
    /// Pointer moved while pressed.
    Move,
    /// Button or stylus released.
    Up,
    /// Gesture cancelled (e.g., palm rejection, focus loss).
    Cancel,
}

/// A pointer sample. Coordinates are in screen space; tools map them through
/// the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Phase of this event.
    pub phase: PointerPhase,
    /// X position in screen coordinates.
    pub x: f32,
    /// Y position in screen coordinates.
    pub y: f32,
    /// Pressure (0.0 to 1.0, if available).
    pub pressure: Option<f32>,
    /// Timestamp in milliseconds since canvas start.
    pub timestamp_ms: u64,
}

impl PointerEvent {
    /// Create a new pointer event without pressure.
    #[must_use]
    pub const fn new(phase: PointerPhase, x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            phase,
            x,
            y,
            pressure: None,
            timestamp_ms,
        }
    }

    /// Attach stylus pressure.
    #[must_use]
    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = Some(pressure.clamp(0.0, 1.0));
        self
    }

    /// Position of the event.
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Same event relocated to `p` (used after mapping to canvas space).
    #[must_use]
    pub const fn at(self, p: Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
            ..self
        }
    }

    /// Convert into a stroke sample.
    #[must_use]
    pub fn to_stroke_point(&self) -> StrokePoint {
        match self.pressure {
            Some(p) => StrokePoint::with_pressure(self.x, self.y, p),
            None => StrokePoint::new(self.x, self.y),
        }
    }
}

/// Keyboard modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct KeyModifiers {
    /// Shift key pressed.
    pub shift: bool,
    /// Control key pressed.
    pub ctrl: bool,
    /// Alt/Option key pressed.
    pub alt: bool,
    /// Meta/Command key pressed.
    pub meta: bool,
}

impl KeyModifiers {
    /// Platform "command" modifier: ctrl or meta.
    #[must_use]
    pub const fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// A keyboard event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key name (e.g. `"z"`, `"Escape"`, `"["`).
    pub key: String,
    /// Whether the key is pressed.
    pub pressed: bool,
    /// Active modifier keys.
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    /// A key press with modifiers.
    #[must_use]
    pub fn press(key: impl Into<String>, modifiers: KeyModifiers) -> Self {
        Self {
            key: key.into(),
            pressed: true,
            modifiers,
        }
    }
}

/// All input the editor accepts from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InputEvent {
    /// Pointer or stylus input.
    Pointer(PointerEvent),
    /// Keyboard input.
    Key(KeyEvent),
    /// Hover without a pressed button; only moves the cursor overlay.
    Hover {
        /// X coordinate in screen space.
        x: f32,
        /// Y coordinate in screen space.
        y: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_to_stroke_point() {
        let ev = PointerEvent::new(PointerPhase::Move, 4.0, 5.0, 10).with_pressure(1.5);
        let sp = ev.to_stroke_point();
        assert_eq!(sp.pressure, Some(1.0));
        assert!((sp.x - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_input_event_serde() {
        let ev = InputEvent::Pointer(PointerEvent::new(PointerPhase::Down, 1.0, 2.0, 0));
        let json = serde_json::to_string(&ev).expect("serialize");
        assert!(json.contains("\"type\":\"Pointer\""));
        assert!(json.contains("\"phase\":\"down\""));
        let back: InputEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ev);
    }

    #[test]
    fn test_command_modifier() {
        let m = KeyModifiers {
            meta: true,
            ..KeyModifiers::default()
        };
        assert!(m.command());
        assert!(!KeyModifiers::default().command());
    }
}
