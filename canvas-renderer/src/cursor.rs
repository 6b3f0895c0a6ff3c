//! Tool cursor drawn on the overlay surface.

use canvas_core::{Color, CursorShape, Point};
use tiny_skia::{Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Half-length of the crosshair arms in screen pixels.
const CROSSHAIR_ARM: f32 = 8.0;

/// Radius of the hand markers.
const GRAB_RADIUS: f32 = 6.0;

/// Brush outlines never shrink below this radius so they stay visible.
const MIN_BRUSH_RADIUS: f32 = 1.5;

/// Draw `shape` centered at a screen position.
///
/// Brush outlines are scaled by `zoom` so they match the painted footprint.
pub fn draw_cursor(
    target: &mut Pixmap,
    shape: CursorShape,
    at: Point,
    zoom: f32,
    color: Color,
    width: f32,
) {
    let mut pb = PathBuilder::new();
    match shape {
        CursorShape::Brush { diameter } => {
            let r = (diameter * zoom / 2.0).max(MIN_BRUSH_RADIUS);
            pb.push_circle(at.x, at.y, r);
        }
        CursorShape::Crosshair => {
            pb.move_to(at.x - CROSSHAIR_ARM, at.y);
            pb.line_to(at.x + CROSSHAIR_ARM, at.y);
            pb.move_to(at.x, at.y - CROSSHAIR_ARM);
            pb.line_to(at.x, at.y + CROSSHAIR_ARM);
        }
        CursorShape::Grab => pb.push_circle(at.x, at.y, GRAB_RADIUS),
        CursorShape::Grabbing => {
            pb.push_circle(at.x, at.y, GRAB_RADIUS);
            pb.push_circle(at.x, at.y, GRAB_RADIUS / 2.0);
        }
    }
    let Some(path) = pb.finish() else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    let stroke = Stroke {
        width,
        ..Stroke::default()
    };
    target.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(p: &Pixmap, x: u32, y: u32) -> u8 {
        p.pixel(x, y).map_or(0, |c| c.alpha())
    }

    #[test]
    fn test_brush_outline_scales_with_zoom() {
        let mut target = Pixmap::new(64, 64).expect("target");
        let shape = CursorShape::Brush { diameter: 10.0 };
        draw_cursor(&mut target, shape, Point::new(32.0, 32.0), 4.0, Color::BLACK, 1.0);
        assert!(alpha(&target, 52, 32) > 0);
        assert_eq!(alpha(&target, 32, 32), 0);
    }

    #[test]
    fn test_crosshair_marks_center_lines() {
        let mut target = Pixmap::new(32, 32).expect("target");
        draw_cursor(
            &mut target,
            CursorShape::Crosshair,
            Point::new(16.5, 16.5),
            1.0,
            Color::BLACK,
            1.0,
        );
        assert!(alpha(&target, 10, 16) > 0);
        assert!(alpha(&target, 16, 22) > 0);
        assert_eq!(alpha(&target, 2, 2), 0);
    }
}
