//! End-to-end editing scenarios.

use std::sync::Arc;
use std::time::Duration;

use canvas_core::history::MergeLayers;
use canvas_core::{
    BlendMode, BrushParams, CanvasController, CanvasEditor, CanvasSize, ChangeNotifier, Channel,
    Color, EditorConfig, HistoryManager, InputEvent, Layer, LayerManager, LayerStack, Point,
    PointerEvent, PointerPhase, RasterPolicy, RasterScheduler, RenderView, Stroke, StrokePoint,
    ToolId, UndoHistory,
};
use tiny_skia::Pixmap;
use tokio::time::Instant;

fn hard_brush() -> BrushParams {
    BrushParams::new(8.0, 1.0, 1.0, Color::BLACK, BlendMode::Normal)
}

fn stroke_at(x: f32, y: f32, samples: usize) -> Stroke {
    let points = (0..samples)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f32 * 3.0;
            StrokePoint::new(x + d, y + d / 2.0)
        })
        .collect();
    Stroke::new(points, hard_brush())
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_idle_rasterization() {
    let mut editor = CanvasEditor::blank(CanvasSize::new(512, 512), EditorConfig::default());
    editor.activate_tool(ToolId::BRUSH).expect("brush");
    let mut events = vec![PointerEvent::new(PointerPhase::Down, 10.0, 10.0, 0)];
    for i in 1..9u16 {
        let f = f32::from(i);
        events.push(PointerEvent::new(PointerPhase::Move, 10.0 + f * 5.0, 10.0 + f * 2.0, u64::from(i)));
    }
    events.push(PointerEvent::new(PointerPhase::Up, 60.0, 40.0, 9));
    for event in events {
        editor.handle_input(&InputEvent::Pointer(event)).expect("input");
    }

    let layer = editor.layers().active().expect("layer");
    assert_eq!(layer.stroke_count(), 1);
    assert_eq!(layer.strokes()[0].len(), 10);
    assert_eq!(layer.pending_count(), 1);

    // Not idle yet.
    assert_eq!(editor.flush_rasters().await.applied, 0);

    tokio::time::advance(Duration::from_millis(500)).await;
    let report = editor.flush_rasters().await;
    assert_eq!(report.applied, 1);

    let layer = editor.layers().active().expect("layer");
    assert_eq!(layer.rasterized_count(), layer.stroke_count());
    assert_eq!(layer.pending_count(), 0);
    let rasterized: usize = layer.strokes()[..layer.rasterized_count()]
        .iter()
        .map(|s| s.len())
        .sum();
    assert_eq!(rasterized, 10);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_force_threshold() {
    let notifier = Arc::new(ChangeNotifier::default());
    let policy = RasterPolicy::default();
    let mut stack = LayerManager::new(CanvasSize::new(256, 256), policy, notifier);
    let id = stack.add_layer("Busy");
    let scheduler = RasterScheduler::new(policy);

    let mut forced_at = None;
    for i in 0..25u16 {
        let f = f32::from(i);
        stack.add_stroke(id, stroke_at(f * 8.0, f * 4.0, 4)).expect("add");
        tokio::time::advance(Duration::from_millis(100)).await;
        let layer = stack.layer(id).expect("layer");
        if forced_at.is_none() && scheduler.is_due(layer, Instant::now()) {
            forced_at = Some(layer.pending_count());
            let report = scheduler.flush_due(&mut stack).await;
            assert_eq!(report.applied, 1);
        }
    }

    assert_eq!(forced_at, Some(policy.force_threshold + 1));
    let layer = stack.layer(id).expect("layer");
    assert_eq!(layer.rasterized_count(), policy.force_threshold + 1);
    assert_eq!(layer.pending_count(), 25 - (policy.force_threshold + 1));
}

#[test]
fn test_scenario_c_opacity_invalidation() {
    let mut layer = Layer::new("Paint", CanvasSize::new(64, 64));
    layer.add_stroke(stroke_at(4.0, 4.0, 6)).expect("add");
    layer.update_composite_cache().expect("initial");
    let builds = layer.cache().stats().composite_builds;

    assert!(layer.set_opacity(0.5));
    assert!(!layer.cache().is_composite_valid());
    assert!(layer.update_composite_cache().expect("rebuild"));
    assert_eq!(layer.cache().stats().composite_builds, builds + 1);

    assert!(!layer.set_opacity(0.5));
    assert!(layer.cache().is_composite_valid());
    assert!(!layer.update_composite_cache().expect("cached"));
    assert_eq!(layer.cache().stats().composite_builds, builds + 1);
}

#[test]
fn test_scenario_d_merge_undo_restores_originals() {
    let notifier = Arc::new(ChangeNotifier::default());
    let mut stack = LayerManager::new(CanvasSize::new(64, 64), RasterPolicy::default(), notifier);
    let mut history = HistoryManager::default();

    let a = stack.add_layer("A");
    stack.add_stroke(a, stroke_at(2.0, 2.0, 5)).expect("a1");
    stack.add_stroke(a, stroke_at(10.0, 2.0, 3)).expect("a2");
    let b = stack.add_layer("B");
    stack.add_stroke(b, stroke_at(30.0, 30.0, 4)).expect("b1");
    stack.layer_mut(b).expect("b").set_opacity(0.5);
    let a_before = stack.layer(a).expect("a").snapshot();
    let b_before = stack.layer(b).expect("b").snapshot();

    history
        .execute(Box::new(MergeLayers::new(b)), &mut stack)
        .expect("merge");
    assert_eq!(stack.len(), 1);
    let c = stack.ids()[0];
    assert_ne!(c, a);
    assert_ne!(c, b);

    assert!(history.undo(&mut stack).expect("undo"));
    assert_eq!(stack.ids(), vec![a, b]);
    assert!(stack.layer(c).is_none());
    assert!(stack.layer(a).expect("a").same_content(&a_before));
    assert!(stack.layer(b).expect("b").same_content(&b_before));
    assert!((stack.layer(b).expect("b").opacity() - 0.5).abs() < f32::EPSILON);
}

#[test]
fn test_scenario_e_culls_offscreen_layer() {
    let size = CanvasSize::new(512, 512);
    let notifier = Arc::new(ChangeNotifier::default());
    let mut stack = LayerManager::new(size, RasterPolicy::default(), notifier);
    let top_left = stack.add_layer("1");
    stack.add_stroke(top_left, stroke_at(20.0, 20.0, 8)).expect("tl");
    let bottom_right = stack.add_layer("2");
    stack
        .add_stroke(bottom_right, stroke_at(400.0, 400.0, 8))
        .expect("br");

    let mut viewport = CanvasController::new(size, 512.0, 512.0);
    viewport.zoom_at(Point::new(0.0, 0.0), 2.0);
    let visible = viewport.viewport_bounds();
    assert!(visible.right() <= 256.5 && visible.bottom() <= 256.5);

    let mut target = Pixmap::new(512, 512).expect("target");
    let stats = stack.render_into(&mut target, &RenderView::new(viewport.transform(), visible));
    assert_eq!(stats.layers_drawn, 1);
    assert_eq!(stats.layers_culled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_raster_result_is_discarded() {
    let mut layer = Layer::new("Race", CanvasSize::new(64, 64));
    layer.add_stroke(stroke_at(1.0, 1.0, 4)).expect("add");
    tokio::time::advance(Duration::from_millis(600)).await;
    let job = layer.raster_job().expect("job");

    // An eraser stroke lands and forces a full rebuild while the job runs.
    layer
        .add_stroke(Stroke::new(
            vec![StrokePoint::new(1.0, 1.0), StrokePoint::new(8.0, 8.0)],
            BrushParams::eraser(6.0, 1.0),
        ))
        .expect("eraser");
    layer.rasterize();
    let result = job.run().await.expect("run");
    assert!(!layer.apply_raster(result));
    assert_eq!(layer.rasterized_count(), 2);
}

#[tokio::test]
async fn test_tool_switch_publishes_tool_not_render() {
    let mut editor = CanvasEditor::blank(CanvasSize::new(64, 64), EditorConfig::default());
    let mut render = editor.notifier().subscribe(Channel::Render);
    let mut tool = editor.notifier().subscribe(Channel::Tool);
    let activation = editor.activate_tool(ToolId::ERASER).expect("eraser");
    if let Some(warm_up) = activation.warm_up {
        warm_up.await.expect("warm");
        assert!(editor.complete_activation(activation.ticket));
    }
    assert!(tool.try_recv().is_ok());
    assert!(render.try_recv().is_err());
}
