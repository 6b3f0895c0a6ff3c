//! Stroke rasterization onto premultiplied RGBA pixmaps.

use std::sync::Arc;

use tiny_skia::{
    FillRule, FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapMut,
    PixmapPaint, Transform,
};

use crate::stamp::{self, StampKey};
use crate::{BrushParams, CanvasError, CanvasResult, Point, Stroke};

/// Allocate a transparent pixmap.
///
/// # Errors
///
/// Returns [`CanvasError::Allocation`] for zero or oversized dimensions.
pub fn new_pixmap(width: u32, height: u32) -> CanvasResult<Pixmap> {
    Pixmap::new(width, height).ok_or(CanvasError::Allocation { width, height })
}

/// Draw one stroke onto a canvas-space pixmap.
///
/// A hard brush without pressure is drawn straight onto the target. Soft
/// or pressure-sensitive strokes are drawn into an isolated buffer first and
/// composited with the brush opacity and blend mode, so self-overlap does
/// not accumulate alpha.
///
/// # Errors
///
/// Returns [`CanvasError::Allocation`] if the isolation buffer or a stamp
/// cannot be allocated.
#[allow(clippy::cast_precision_loss)]
pub fn render_stroke(target: &mut Pixmap, stroke: &Stroke, blur_coefficient: f32) -> CanvasResult<()> {
    if stroke.is_empty() {
        return Ok(());
    }
    let brush = stroke.brush();
    let blend = brush.blend_mode().to_skia();

    if brush.hardness() >= 1.0 && !stroke.has_pressure() {
        let paint = brush_paint(brush, brush.opacity(), blend);
        draw_centerline(&mut target.as_mut(), stroke, &paint, Transform::identity());
        return Ok(());
    }

    let Some(rect) = stroke
        .bounds(blur_coefficient)
        .to_pixel_rect(target.width(), target.height())
    else {
        return Ok(());
    };
    let mut isolated = new_pixmap(rect.width(), rect.height())?;
    let shift = Transform::from_translate(-(rect.x() as f32), -(rect.y() as f32));

    if stroke.has_pressure() {
        draw_dabs(&mut isolated, stroke, shift, blur_coefficient)?;
    } else {
        let paint = brush_paint(brush, 1.0, tiny_skia::BlendMode::SourceOver);
        draw_centerline(&mut isolated.as_mut(), stroke, &paint, shift);
        gaussian_blur(&mut isolated, brush.blur_sigma(blur_coefficient));
    }

    target.draw_pixmap(
        rect.x(),
        rect.y(),
        isolated.as_ref(),
        &PixmapPaint {
            opacity: brush.opacity(),
            blend_mode: blend,
            quality: FilterQuality::Nearest,
        },
        Transform::identity(),
        None,
    );
    Ok(())
}

/// Draw a run of strokes in order.
///
/// # Errors
///
/// Stops at the first allocation failure.
pub fn render_strokes<'a, I>(target: &mut Pixmap, strokes: I, blur_coefficient: f32) -> CanvasResult<()>
where
    I: IntoIterator<Item = &'a Arc<Stroke>>,
{
    for stroke in strokes {
        render_stroke(target, stroke, blur_coefficient)?;
    }
    Ok(())
}

fn brush_paint(brush: &BrushParams, opacity: f32, blend: tiny_skia::BlendMode) -> Paint<'static> {
    let base = if brush.blend_mode().is_clearing() {
        crate::Color::BLACK
    } else {
        brush.color()
    };
    let mut color = base.to_skia();
    color.apply_opacity(opacity);
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint.blend_mode = blend;
    paint
}

fn draw_centerline(target: &mut PixmapMut<'_>, stroke: &Stroke, paint: &Paint<'_>, transform: Transform) {
    let size = stroke.brush().size();
    if stroke.is_dot() {
        let Some(p) = stroke.points().first() else {
            return;
        };
        if let Some(circle) = PathBuilder::from_circle(p.x, p.y, size / 2.0) {
            target.fill_path(&circle, paint, FillRule::Winding, transform, None);
        }
        return;
    }
    let Some(path) = stroke.smoothed_path() else {
        return;
    };
    let outline = tiny_skia::Stroke {
        width: size,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..tiny_skia::Stroke::default()
    };
    target.stroke_path(path, paint, &outline, transform, None);
}

/// Dab spacing as a fraction of brush diameter.
const DAB_SPACING: f32 = 0.1;

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_dabs(target: &mut Pixmap, stroke: &Stroke, shift: Transform, blur_coefficient: f32) -> CanvasResult<()> {
    let brush = stroke.brush();
    let key = StampKey::for_brush(brush, blur_coefficient);
    let stamp = stamp::shared().get_or_build(&key)?;
    let spacing = (brush.size() * DAB_SPACING).max(1.0);
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };

    let mut dab = |pos: Point, pressure: f32| {
        if pressure * brush.size() < 0.25 {
            return;
        }
        let t = shift
            .pre_translate(pos.x, pos.y)
            .pre_scale(pressure, pressure)
            .pre_translate(-stamp.center, -stamp.center);
        target.draw_pixmap(0, 0, stamp.pixmap.as_ref(), &paint, t, None);
    };

    let points = stroke.points();
    if let [only] = points {
        dab(only.position(), only.pressure_or_full());
        return Ok(());
    }
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let steps = (a.position().distance(b.position()) / spacing).ceil().max(1.0) as u32;
        for i in 0..steps {
            let t = i as f32 / steps as f32;
            let pos = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
            let pressure = a.pressure_or_full() + (b.pressure_or_full() - a.pressure_or_full()) * t;
            dab(pos, pressure);
        }
    }
    if let Some(last) = points.last() {
        dab(last.position(), last.pressure_or_full());
    }
    Ok(())
}

/// Approximate a gaussian blur with three box passes per axis.
///
/// Works directly on premultiplied data; averaging keeps every color channel
/// at or below alpha.
pub fn gaussian_blur(pixmap: &mut Pixmap, sigma: f32) {
    let radius = box_radius(sigma);
    if radius == 0 {
        return;
    }
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let data = pixmap.data_mut();
    let mut scratch = vec![0u8; data.len()];
    for _ in 0..3 {
        blur_pass(data, &mut scratch, width, height, 1, width, radius);
        blur_pass(&scratch, data, height, width, width, 1, radius);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn box_radius(sigma: f32) -> usize {
    if !(sigma.is_finite() && sigma > 0.0) {
        return 0;
    }
    // Three passes of width w give variance 3 * (w^2 - 1) / 12.
    let width = (4.0 * sigma * sigma + 1.0).sqrt();
    ((width - 1.0) / 2.0).round() as usize
}

/// One sliding-window pass along `lines` lines of `count` pixels.
///
/// Pixel `i` of line `l` sits at `l * line_step + i * step`. Pixels outside
/// the line count as transparent.
#[allow(clippy::cast_possible_truncation)]
fn blur_pass(
    src: &[u8],
    dst: &mut [u8],
    count: usize,
    lines: usize,
    step: usize,
    line_step: usize,
    radius: usize,
) {
    let window = (2 * radius + 1) as u32;
    for line in 0..lines {
        let at = |i: usize, c: usize| (line * line_step + i * step) * 4 + c;
        for c in 0..4 {
            let mut sum: u32 = (0..=radius.min(count - 1)).map(|i| u32::from(src[at(i, c)])).sum();
            for i in 0..count {
                dst[at(i, c)] = ((sum + window / 2) / window) as u8;
                if i + radius + 1 < count {
                    sum += u32::from(src[at(i + radius + 1, c)]);
                }
                if i >= radius {
                    sum -= u32::from(src[at(i - radius, c)]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlendMode, Color, StrokePoint};

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.pixel(x, y).map_or(0, |p| p.alpha())
    }

    fn horizontal(brush: BrushParams) -> Stroke {
        Stroke::new(
            vec![
                StrokePoint::new(10.0, 32.0),
                StrokePoint::new(30.0, 32.0),
                StrokePoint::new(54.0, 32.0),
            ],
            brush,
        )
    }

    #[test]
    fn test_hard_stroke_paints_centerline() {
        let mut pixmap = new_pixmap(64, 64).expect("pixmap");
        let brush = BrushParams::new(6.0, 1.0, 1.0, Color::rgb(255, 0, 0), BlendMode::Normal);
        render_stroke(&mut pixmap, &horizontal(brush), 0.5).expect("render");
        assert_eq!(alpha_at(&pixmap, 30, 32), 255);
        assert_eq!(alpha_at(&pixmap, 30, 10), 0);
    }

    #[test]
    fn test_opacity_does_not_accumulate_on_self_overlap() {
        let mut pixmap = new_pixmap(64, 64).expect("pixmap");
        let brush = BrushParams::new(10.0, 0.5, 0.5, Color::BLACK, BlendMode::Normal);
        let stroke = Stroke::new(
            vec![
                StrokePoint::new(10.0, 32.0),
                StrokePoint::new(50.0, 32.0),
                StrokePoint::new(10.0, 32.0),
            ],
            brush,
        );
        render_stroke(&mut pixmap, &stroke, 0.5).expect("render");
        assert!(alpha_at(&pixmap, 30, 32) <= 128);
    }

    #[test]
    fn test_soft_stroke_has_falloff() {
        let mut hard = new_pixmap(64, 64).expect("pixmap");
        let mut soft = new_pixmap(64, 64).expect("pixmap");
        let color = Color::BLACK;
        render_stroke(
            &mut hard,
            &horizontal(BrushParams::new(8.0, 1.0, 1.0, color, BlendMode::Normal)),
            0.5,
        )
        .expect("render");
        render_stroke(
            &mut soft,
            &horizontal(BrushParams::new(8.0, 0.0, 1.0, color, BlendMode::Normal)),
            0.5,
        )
        .expect("render");
        // Soft edge reaches further out than the hard edge.
        assert_eq!(alpha_at(&hard, 30, 40), 0);
        assert!(alpha_at(&soft, 30, 40) > 0);
    }

    #[test]
    fn test_eraser_removes_pixels() {
        let mut pixmap = new_pixmap(64, 64).expect("pixmap");
        pixmap.fill(tiny_skia::Color::from_rgba8(0, 0, 255, 255));
        render_stroke(&mut pixmap, &horizontal(BrushParams::eraser(6.0, 1.0)), 0.5)
            .expect("render");
        assert_eq!(alpha_at(&pixmap, 30, 32), 0);
        assert_eq!(alpha_at(&pixmap, 30, 5), 255);
    }

    #[test]
    fn test_pressure_stroke_uses_dabs() {
        let mut pixmap = new_pixmap(64, 64).expect("pixmap");
        let brush = BrushParams::new(12.0, 1.0, 1.0, Color::BLACK, BlendMode::Normal);
        let stroke = Stroke::new(
            vec![
                StrokePoint::with_pressure(10.0, 32.0, 0.2),
                StrokePoint::with_pressure(54.0, 32.0, 1.0),
            ],
            brush,
        );
        render_stroke(&mut pixmap, &stroke, 0.5).expect("render");
        // Thin at the light end, full width at the heavy end.
        assert_eq!(alpha_at(&pixmap, 12, 36), 0);
        assert!(alpha_at(&pixmap, 52, 36) > 0);
    }

    #[test]
    fn test_single_point_dot() {
        let mut pixmap = new_pixmap(16, 16).expect("pixmap");
        let stroke = Stroke::new(vec![StrokePoint::new(8.0, 8.0)], BrushParams::default());
        render_stroke(&mut pixmap, &stroke, 0.5).expect("render");
        assert_eq!(alpha_at(&pixmap, 8, 8), 255);
    }

    #[test]
    fn test_blur_preserves_premultiplied_invariant() {
        let mut pixmap = new_pixmap(16, 16).expect("pixmap");
        pixmap.fill_rect(
            tiny_skia::Rect::from_xywh(4.0, 4.0, 8.0, 8.0).expect("rect"),
            &Paint {
                shader: tiny_skia::Shader::SolidColor(tiny_skia::Color::from_rgba8(200, 100, 50, 180)),
                ..Paint::default()
            },
            Transform::identity(),
            None,
        );
        gaussian_blur(&mut pixmap, 2.0);
        for px in pixmap.pixels() {
            assert!(px.red() <= px.alpha() && px.green() <= px.alpha() && px.blue() <= px.alpha());
        }
    }

    #[test]
    fn test_box_radius() {
        assert_eq!(box_radius(0.0), 0);
        assert_eq!(box_radius(f32::NAN), 0);
        assert_eq!(box_radius(5.0), 5);
    }

    #[test]
    fn test_allocation_failure() {
        assert!(matches!(
            new_pixmap(0, 10),
            Err(CanvasError::Allocation { width: 0, height: 10 })
        ));
    }
}
