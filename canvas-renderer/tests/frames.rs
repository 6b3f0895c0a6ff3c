//! Frame pipeline behavior against a live editor.

use std::time::Duration;

use canvas_core::{
    Background, CanvasEditor, CanvasSize, Color, EditorConfig, InputEvent, PointerEvent,
    PointerPhase, ToolId,
};
use canvas_renderer::{FrameStats, PipelineConfig, RenderPipeline};
use tiny_skia::Pixmap;

fn editor() -> CanvasEditor {
    CanvasEditor::blank(CanvasSize::new(64, 64), EditorConfig::default())
}

fn pointer(editor: &mut CanvasEditor, phase: PointerPhase, x: f32, y: f32) {
    editor
        .handle_input(&InputEvent::Pointer(PointerEvent::new(phase, x, y, 0)))
        .expect("pointer");
}

fn frame(
    pipeline: &mut RenderPipeline,
    editor: &mut CanvasEditor,
    target: &mut Pixmap,
    ms: u64,
) -> FrameStats {
    pipeline
        .render_frame(editor, target, Duration::from_millis(ms))
        .expect("frame")
}

#[test]
fn test_unchanged_frames_reuse_canvas_surface() {
    let mut editor = editor();
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");

    let first = frame(&mut pipeline, &mut editor, &mut target, 0);
    assert!(first.canvas_repainted);
    assert_eq!(first.layers.layers_drawn, 1);

    let second = frame(&mut pipeline, &mut editor, &mut target, 16);
    assert!(!second.canvas_repainted);
    assert_eq!(pipeline.repaints(), 1);
}

#[test]
fn test_stroke_and_viewport_changes_repaint() {
    let mut editor = editor();
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");
    frame(&mut pipeline, &mut editor, &mut target, 0);

    editor.activate_tool(ToolId::BRUSH).expect("brush");
    pointer(&mut editor, PointerPhase::Down, 10.0, 10.0);
    assert!(frame(&mut pipeline, &mut editor, &mut target, 16).canvas_repainted);
    pointer(&mut editor, PointerPhase::Up, 40.0, 40.0);
    assert!(frame(&mut pipeline, &mut editor, &mut target, 32).canvas_repainted);
    assert!(!frame(&mut pipeline, &mut editor, &mut target, 48).canvas_repainted);

    editor.viewport_mut().pan_by(5.0, 0.0);
    assert!(frame(&mut pipeline, &mut editor, &mut target, 64).canvas_repainted);
}

#[test]
fn test_hover_draws_cursor_without_repaint() {
    let mut editor = editor();
    editor.activate_tool(ToolId::BRUSH).expect("brush");
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");
    frame(&mut pipeline, &mut editor, &mut target, 0);

    editor
        .handle_input(&InputEvent::Hover { x: 32.0, y: 32.0 })
        .expect("hover");
    let stats = frame(&mut pipeline, &mut editor, &mut target, 16);
    assert!(!stats.canvas_repainted);
    // Default brush diameter is 12, so the outline passes through x = 38.
    assert!(target.pixel(38, 32).expect("px").alpha() > 0);
    assert_eq!(target.pixel(32, 32).expect("px").alpha(), 0);
}

#[test]
fn test_marching_ants_reuse_outline_between_ticks() {
    let mut editor = editor();
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");

    editor.activate_tool(ToolId::RECT_SELECT).expect("select");
    pointer(&mut editor, PointerPhase::Down, 10.0, 10.0);
    pointer(&mut editor, PointerPhase::Move, 40.0, 30.0);
    pointer(&mut editor, PointerPhase::Up, 40.0, 30.0);
    assert!(editor.selection().shape().is_some());

    let mut reused = 0;
    for tick in 0..4 {
        let stats = frame(&mut pipeline, &mut editor, &mut target, tick * 100);
        assert!(stats.outline_drawn);
        reused += u32::from(stats.outline_reused);
    }
    assert_eq!(pipeline.overlay().stats().measured, 1);
    assert_eq!(reused, 3);
    assert!((9..=10).any(|x| target.pixel(x, 20).expect("px").alpha() > 0));
    assert_eq!(target.pixel(25, 20).expect("px").alpha(), 0);

    pointer(&mut editor, PointerPhase::Down, 5.0, 5.0);
    pointer(&mut editor, PointerPhase::Up, 20.0, 20.0);
    frame(&mut pipeline, &mut editor, &mut target, 500);
    assert_eq!(pipeline.overlay().stats().measured, 2);
}

#[test]
fn test_select_all_has_no_outline() {
    let mut editor = editor();
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");
    assert!(!frame(&mut pipeline, &mut editor, &mut target, 0).outline_drawn);
}

#[test]
fn test_checkerboard_and_surround() {
    let mut editor = editor();
    editor.layers_mut().set_background(Background::Checkerboard);
    let config = PipelineConfig {
        surround: Color::rgb(10, 20, 30),
        ..PipelineConfig::default()
    };
    let mut pipeline = RenderPipeline::new(config, editor.notifier());
    let mut target = Pixmap::new(100, 80).expect("target");
    frame(&mut pipeline, &mut editor, &mut target, 0);

    assert_eq!(target.pixel(0, 0).expect("px").red(), 255);
    assert_eq!(target.pixel(8, 0).expect("px").red(), 204);
    let outside = target.pixel(90, 70).expect("px");
    assert_eq!((outside.red(), outside.green(), outside.blue()), (10, 20, 30));
}

#[test]
fn test_view_size_follows_target() {
    let mut editor = editor();
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(120, 90).expect("target");
    frame(&mut pipeline, &mut editor, &mut target, 0);
    let (w, h) = editor.viewport().view_size();
    assert!((w - 120.0).abs() < f32::EPSILON);
    assert!((h - 90.0).abs() < f32::EPSILON);
}

#[test]
fn test_selection_drag_preview_is_overlay_only() {
    let mut editor = editor();
    editor.activate_tool(ToolId::ELLIPSE_SELECT).expect("select");
    let mut pipeline = RenderPipeline::for_editor(&editor);
    let mut target = Pixmap::new(64, 64).expect("target");
    frame(&mut pipeline, &mut editor, &mut target, 0);

    pointer(&mut editor, PointerPhase::Down, 8.0, 8.0);
    pointer(&mut editor, PointerPhase::Move, 30.0, 30.0);
    let stats = frame(&mut pipeline, &mut editor, &mut target, 16);
    assert!(stats.outline_drawn);
    assert!(!stats.canvas_repainted);
    assert!(editor.selection().shape().is_none());
}
