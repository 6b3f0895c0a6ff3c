//! Document-level invariants: raster bookkeeping, persistence, composite
//! idempotence, the undo/redo law, culling equivalence and merge fidelity.

use std::sync::Arc;

use canvas_core::history::{
    AddLayer, AddStroke, ChangeBlendMode, ChangeOpacity, ClearLayer, DeleteLayer, DuplicateLayer,
    MergeLayers, ReorderLayer, ResizeCanvas, SetVisibility,
};
use canvas_core::{
    Anchor, BlendMode, Bounds, BrushParams, CanvasSize, ChangeNotifier, Color, HistoryManager,
    Layer, LayerId, LayerManager, LayerStack, NoAssets, RasterPolicy, RenderView, Stroke,
    StrokePoint, UndoHistory,
};
use tiny_skia::{Pixmap, Transform};

fn brush(color: Color, blend: BlendMode) -> BrushParams {
    BrushParams::new(6.0, 1.0, 1.0, color, blend)
}

fn line(from: (f32, f32), to: (f32, f32), color: Color) -> Stroke {
    line_with(from, to, brush(color, BlendMode::Normal))
}

fn line_with(from: (f32, f32), to: (f32, f32), brush: BrushParams) -> Stroke {
    let points = (0..=4)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / 4.0;
            StrokePoint::with_pressure(
                from.0 + (to.0 - from.0) * t,
                from.1 + (to.1 - from.1) * t,
                0.5 + t / 2.0,
            )
        })
        .collect();
    Stroke::new(points, brush)
}

fn manager(size: u32) -> LayerManager {
    LayerManager::new(
        CanvasSize::new(size, size),
        RasterPolicy::default(),
        Arc::new(ChangeNotifier::default()),
    )
}

#[derive(Debug, PartialEq)]
struct LayerState {
    id: LayerId,
    name: String,
    strokes: usize,
    opacity: f32,
    blend: BlendMode,
    visible: bool,
    has_base: bool,
}

fn observe(stack: &LayerManager) -> (CanvasSize, Vec<LayerState>) {
    let layers = stack
        .layers()
        .iter()
        .map(|l| LayerState {
            id: l.id(),
            name: l.name().to_string(),
            strokes: l.stroke_count(),
            opacity: l.opacity(),
            blend: l.blend_mode(),
            visible: l.is_visible(),
            has_base: l.base_image().is_some(),
        })
        .collect();
    (stack.canvas_size(), layers)
}

#[test]
fn test_rasterized_count_never_exceeds_strokes() {
    let mut layer = Layer::new("Ink", CanvasSize::new(64, 64));
    let check = |l: &Layer| assert!(l.rasterized_count() <= l.stroke_count());

    for i in 0..6u8 {
        let f = f32::from(i) * 8.0;
        layer
            .add_stroke(line((f, 2.0), (f + 4.0, 40.0), Color::BLACK))
            .expect("add");
        check(&layer);
        if i % 2 == 0 {
            layer.rasterize();
            check(&layer);
        }
    }
    layer.pop_stroke();
    check(&layer);
    layer.pop_stroke();
    check(&layer);
    layer
        .add_stroke(line_with(
            (0.0, 0.0),
            (60.0, 60.0),
            BrushParams::eraser(10.0, 1.0),
        ))
        .expect("eraser");
    check(&layer);
    layer.rasterize();
    assert_eq!(layer.rasterized_count(), layer.stroke_count());
    layer.clear_content();
    check(&layer);
    assert_eq!(layer.rasterized_count(), 0);
}

#[test]
fn test_rasterize_catches_up_with_strokes() {
    let mut layer = Layer::new("Ink", CanvasSize::new(32, 32));
    layer
        .add_strokes_batch([
            line((1.0, 1.0), (30.0, 1.0), Color::BLACK),
            line((1.0, 5.0), (30.0, 5.0), Color::rgb(255, 0, 0)),
        ])
        .expect("batch");
    layer.rasterize();
    assert_eq!(layer.rasterized_count(), layer.stroke_count());
    assert_eq!(layer.pending_count(), 0);
}

#[test]
fn test_layer_serialize_roundtrip() {
    let mut layer = Layer::new("Sketch", CanvasSize::new(48, 48));
    layer
        .add_stroke(line((2.0, 2.0), (40.0, 30.0), Color::rgb(10, 20, 30)))
        .expect("add");
    layer
        .add_stroke(line_with(
            (5.0, 5.0),
            (6.0, 7.0),
            BrushParams::new(3.0, 0.25, 0.75, Color::WHITE, BlendMode::Multiply),
        ))
        .expect("add");
    layer.set_opacity(0.4);
    layer.set_blend_mode(BlendMode::Screen);
    layer.set_visible(false);
    layer.rasterize();

    let json = layer.serialize(None).expect("serialize");
    let restored = Layer::deserialize(
        &json,
        CanvasSize::new(48, 48),
        RasterPolicy::default(),
        &NoAssets,
        None,
    )
    .expect("deserialize");

    assert_eq!(restored.id(), layer.id());
    assert!(restored.same_content(&layer));
    assert!((restored.opacity() - 0.4).abs() < f32::EPSILON);
    assert_eq!(restored.blend_mode(), BlendMode::Screen);
    assert!(!restored.is_visible());
    assert!(!restored.cache().is_composite_valid());
    assert!(!restored.cache().has_rasterized());
}

#[test]
fn test_composite_update_is_idempotent() {
    let mut layer = Layer::new("Ink", CanvasSize::new(40, 40));
    layer
        .add_stroke(line((4.0, 4.0), (36.0, 30.0), Color::rgb(0, 128, 255)))
        .expect("add");
    layer.set_opacity(0.6);

    assert!(layer.update_composite_cache().expect("first"));
    let first = layer.composite().expect("composite").data().to_vec();
    assert!(!layer.update_composite_cache().expect("second"));
    let second = layer.composite().expect("composite").data().to_vec();
    assert_eq!(first, second);
    assert_eq!(layer.cache().stats().composite_builds, 1);
}

#[test]
fn test_undo_all_redo_all_reproduces_state() {
    let mut stack = manager(64);
    let mut history = HistoryManager::default();
    let base = stack.add_layer("Base");

    history
        .execute(Box::new(AddLayer::new("Top")), &mut stack)
        .expect("add layer");
    let top = stack.active_layer().expect("top");

    let script: Vec<Box<dyn canvas_core::Action>> = vec![
        Box::new(AddStroke::new(base, line((1.0, 1.0), (30.0, 30.0), Color::BLACK))),
        Box::new(AddStroke::new(top, line((40.0, 40.0), (60.0, 10.0), Color::WHITE))),
        Box::new(ChangeOpacity::new(top, 0.5)),
        Box::new(ChangeBlendMode::new(base, BlendMode::Multiply)),
        Box::new(DuplicateLayer::new(top)),
        Box::new(ReorderLayer::new(top, 0)),
        Box::new(SetVisibility::new(base, false)),
        Box::new(ClearLayer::new(base)),
        Box::new(ResizeCanvas::new(CanvasSize::new(96, 80), Anchor::Center)),
        Box::new(MergeLayers::new(base)),
    ];
    let count = script.len();
    for action in script {
        history.execute(action, &mut stack).expect("execute");
    }
    let after = observe(&stack);

    for _ in 0..count {
        assert!(history.undo(&mut stack).expect("undo"));
    }
    for _ in 0..count {
        assert!(history.redo(&mut stack).expect("redo"));
    }
    assert_eq!(observe(&stack), after);
}

#[test]
fn test_undo_restores_deleted_layer_in_place() {
    let mut stack = manager(32);
    let mut history = HistoryManager::default();
    let a = stack.add_layer("A");
    let b = stack.add_layer("B");
    let c = stack.add_layer("C");
    history
        .execute(Box::new(DeleteLayer::new(b)), &mut stack)
        .expect("delete");
    assert_eq!(stack.ids(), vec![a, c]);
    history.undo(&mut stack).expect("undo");
    assert_eq!(stack.ids(), vec![a, b, c]);
}

#[test]
fn test_culling_is_pixel_identical() {
    let mut stack = manager(128);
    let a = stack.add_layer("Top-left");
    stack
        .add_stroke(a, line((5.0, 5.0), (40.0, 30.0), Color::rgb(200, 0, 0)))
        .expect("a");
    let b = stack.add_layer("Bottom-right");
    stack
        .add_stroke(b, line((90.0, 90.0), (120.0, 120.0), Color::rgb(0, 0, 200)))
        .expect("b");
    let c = stack.add_layer("Multiply");
    stack
        .add_stroke(c, line((0.0, 60.0), (60.0, 60.0), Color::rgb(0, 200, 0)))
        .expect("c");
    stack.layer_mut(c).expect("c").set_blend_mode(BlendMode::Multiply);
    stack.layer_mut(c).expect("c").set_opacity(0.7);

    let transform = Transform::from_scale(2.0, 2.0);
    let viewport = Bounds::new(0.0, 0.0, 64.0, 64.0);
    let render = |stack: &mut LayerManager, cull: bool| {
        let mut target = Pixmap::new(128, 128).expect("target");
        let stats = stack.render_into(
            &mut target,
            &RenderView::new(transform, viewport).with_culling(cull),
        );
        (target, stats)
    };
    let (culled, culled_stats) = render(&mut stack, true);
    let (full, full_stats) = render(&mut stack, false);
    assert_eq!(culled.data(), full.data());
    assert_eq!(culled_stats.layers_culled, 1);
    assert_eq!(full_stats.layers_culled, 0);
}

/// Largest per-channel difference between two equally sized pixmaps.
fn max_channel_delta(a: &Pixmap, b: &Pixmap) -> u8 {
    a.data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

/// Merge `upper` down through the history and check the canvas renders the
/// same before the merge, after it, and after undoing it.
fn assert_merge_preserves_pixels(case: &str, mut stack: LayerManager, upper: LayerId) {
    let mut history = HistoryManager::default();
    let before = stack.render_flattened().expect("before");
    assert!(before.data().iter().any(|&c| c != 0), "{case}: empty canvas");

    history
        .execute(Box::new(MergeLayers::new(upper)), &mut stack)
        .expect("merge");
    assert_eq!(stack.ids().len(), 1, "{case}: layers after merge");
    assert!(stack.layer_at(0).expect("merged").is_visible(), "{case}: merged hidden");
    let merged = stack.render_flattened().expect("merged");
    let delta = max_channel_delta(&before, &merged);
    assert!(delta <= 2, "{case}: merge changed pixels by {delta}");

    assert!(history.undo(&mut stack).expect("undo"));
    let restored = stack.render_flattened().expect("restored");
    assert_eq!(restored.data(), before.data(), "{case}: undo changed pixels");
}

fn two_layers(lower: Stroke, upper: Stroke) -> (LayerManager, LayerId, LayerId) {
    let mut stack = manager(64);
    let a = stack.add_layer("Lower");
    let b = stack.add_layer("Upper");
    stack.add_stroke(a, lower).expect("lower");
    stack.add_stroke(b, upper).expect("upper");
    (stack, a, b)
}

#[test]
fn test_merge_down_renders_identically() {
    let red = || line((4.0, 20.0), (60.0, 20.0), Color::rgb(220, 30, 30));
    let crossing = |blend: BlendMode| {
        line_with((30.0, 2.0), (30.0, 60.0), brush(Color::rgb(40, 200, 240), blend))
    };

    let (stack, _, upper) = two_layers(red(), crossing(BlendMode::Normal));
    assert_merge_preserves_pixels("source-over", stack, upper);

    let (mut stack, _, upper) = two_layers(red(), line((4.0, 40.0), (60.0, 40.0), Color::BLACK));
    stack.add_stroke(upper, crossing(BlendMode::Erase)).expect("eraser");
    assert_merge_preserves_pixels("eraser stroke", stack, upper);

    let (stack, _, upper) = two_layers(red(), crossing(BlendMode::Multiply));
    assert_merge_preserves_pixels("multiply stroke", stack, upper);

    let (stack, _, upper) = two_layers(red(), crossing(BlendMode::Screen));
    assert_merge_preserves_pixels("screen stroke", stack, upper);

    let (mut stack, lower, upper) = two_layers(red(), crossing(BlendMode::Normal));
    stack.layer_mut(lower).expect("lower").set_visible(false);
    assert_merge_preserves_pixels("hidden lower", stack, upper);

    let (mut stack, _, upper) = two_layers(red(), crossing(BlendMode::Normal));
    stack.layer_mut(upper).expect("upper").set_visible(false);
    assert_merge_preserves_pixels("hidden upper", stack, upper);

    let (mut stack, _, upper) = two_layers(red(), crossing(BlendMode::Normal));
    stack.layer_mut(upper).expect("upper").set_opacity(0.5);
    assert_merge_preserves_pixels("translucent upper", stack, upper);

    let (mut stack, lower, upper) = two_layers(red(), crossing(BlendMode::Normal));
    stack.layer_mut(lower).expect("lower").set_opacity(0.5);
    stack.layer_mut(upper).expect("upper").set_blend_mode(BlendMode::Multiply);
    assert_merge_preserves_pixels("translucent lower under multiply", stack, upper);
}
