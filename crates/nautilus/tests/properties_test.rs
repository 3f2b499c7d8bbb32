use nautilus::compact::Compactor;
use nautilus::config::{CompactionConfig, ThresholdConfig};
use nautilus::dimension::DimensionLock;
use nautilus::geom::{Point, point, vector};
use nautilus::{AdaptiveThreshold, Engine, EngineConfig, Error, Hierarchy, NodeSizeStatistics};
use nautilus_graph::{EdgeSpec, NodeSpec, SceneGraph, SceneOptions, Viewport};
use std::time::Duration;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Two top-level containers; `a` holds a nested container `a1` and a leaf.
fn nested_scene() -> SceneGraph {
    SceneGraph::load(
        SceneOptions::default(),
        vec![
            NodeSpec::container("a"),
            NodeSpec::container("a1").in_parent("a"),
            NodeSpec::leaf("a1x").at(100.0, 100.0).in_parent("a1"),
            NodeSpec::leaf("a1y").at(200.0, 100.0).in_parent("a1"),
            NodeSpec::leaf("a2").at(400.0, 100.0).in_parent("a"),
            NodeSpec::container("b"),
            NodeSpec::leaf("b1").at(1000.0, 1000.0).in_parent("b"),
        ],
        vec![
            EdgeSpec::new("x-y", "a1x", "a1y"),
            EdgeSpec::new("x-b1", "a1x", "b1"),
            EdgeSpec::new("a2-b1", "a2", "b1"),
        ],
    )
}

/// Engine past its first settle.
fn settled() -> Engine<SceneGraph> {
    let mut engine = Engine::new(nested_scene(), EngineConfig::default()).unwrap();
    engine.apply_initial_visibility(Duration::ZERO).unwrap();
    engine.tick(ms(300)).unwrap();
    assert!(engine.is_first_layout_complete());
    engine
}

fn visible(g: &SceneGraph, id: &str) -> bool {
    g.style(id).is_some_and(|s| s.is_visible())
}

fn assert_prefix_closed(engine: &Engine<SceneGraph>) {
    let g = engine.adapter().unwrap();
    for id in engine.hierarchy().ids() {
        if !visible(g, id) {
            continue;
        }
        if let Some(parent) = engine.hierarchy().parent(id) {
            assert!(visible(g, parent), "{id} is visible but its parent {parent} is not");
        }
    }
}

fn assert_edge_law(g: &SceneGraph) {
    for id in g.edges() {
        let (s, t) = g.edge_endpoints(id).unwrap();
        let expected = (visible(g, s) && visible(g, t))
            || g.is_selected(s)
            || g.is_selected(t)
            || g.edge_highlighted(id);
        assert_eq!(g.edge_style(id).unwrap().is_visible(), expected, "edge {id}");
    }
}

fn assert_near(actual: Point, expected: Point) {
    assert!(
        (actual - expected).length() < 1e-9,
        "expected {expected:?}, got {actual:?}"
    );
}

fn look_at(engine: &mut Engine<SceneGraph>, at: Duration, viewport: Viewport) -> Duration {
    engine.adapter_mut().unwrap().set_viewport(viewport);
    engine.tick(at).unwrap();
    let due = at + engine.config().timing.debounce();
    let report = engine.tick(due).unwrap();
    assert!(report.propagation.is_some(), "debounced pass should have run");
    due
}

#[test]
fn visible_set_is_closed_under_parents() {
    let mut engine = settled();
    assert_prefix_closed(&engine);

    let mut close = Viewport::new(100.0, 100.0).with_zoom(2.0);
    close.center_on(engine.adapter().unwrap().position("a1").unwrap());
    let far = Viewport::new(1000.0, 1000.0).with_zoom(0.1);

    let t = look_at(&mut engine, ms(400), close);
    assert_prefix_closed(&engine);
    assert_edge_law(engine.adapter().unwrap());
    let g = engine.adapter().unwrap();
    assert!(visible(g, "a1x") && visible(g, "a1y"));
    assert!(!visible(g, "b1"));

    look_at(&mut engine, t + ms(100), far);
    assert_prefix_closed(&engine);
    assert_edge_law(engine.adapter().unwrap());
    let g = engine.adapter().unwrap();
    assert!(visible(g, "a") && visible(g, "b"));
    assert!(!visible(g, "a1") && !visible(g, "a1x") && !visible(g, "b1"));
}

#[test]
fn viewport_changes_are_debounced_into_one_pass() {
    let mut engine = settled();
    let debounce = engine.config().timing.debounce();
    let scene = engine.adapter_mut().unwrap();
    scene.set_viewport(Viewport::new(800.0, 600.0).with_zoom(0.5));
    engine.tick(ms(400)).unwrap();
    engine
        .adapter_mut()
        .unwrap()
        .set_viewport(Viewport::new(800.0, 600.0).with_zoom(0.6));
    engine.tick(ms(450)).unwrap();

    // The first pan's deadline passes without a pass; only the last change counts.
    let early = engine.tick(ms(400) + debounce).unwrap();
    assert!(early.propagation.is_none());
    let late = engine.tick(ms(450) + debounce).unwrap();
    assert!(late.propagation.is_some());
    assert_eq!(engine.pending_tasks(), 0);
}

#[test]
fn selection_neighbourhood_survives_zooming_out() {
    let mut engine = settled();
    let scene = engine.adapter_mut().unwrap();
    scene.set_selected("b1", true);
    scene.set_viewport(Viewport::new(1000.0, 1000.0).with_zoom(0.1));
    engine.tick(ms(400)).unwrap();
    engine.recalculate_thresholds().unwrap().unwrap();

    let g = engine.adapter().unwrap();
    for id in ["b1", "b", "a1x", "a1", "a", "a2"] {
        assert!(visible(g, id), "{id} should be protected");
    }
    assert!(!visible(g, "a1y"));
    assert!(g.edge_style("x-b1").unwrap().is_visible());
    assert_prefix_closed(&engine);
    assert_edge_law(g);
}

#[test]
fn forced_edge_update_follows_endpoint_visibility() {
    let mut engine = settled();
    engine.manually_set_depth_level(0).unwrap();
    assert!(!engine.is_adaptive_zoom_enabled());
    let report = engine.force_update_edge_visibility().unwrap();
    assert_eq!(report.visible, 0);
    assert_eq!(report.hidden, 3);

    engine
        .adapter_mut()
        .unwrap()
        .set_edge_hovered("a2-b1", true);
    let report = engine.force_update_edge_visibility().unwrap();
    assert_eq!(report.visible, 1);
    assert_edge_law(engine.adapter().unwrap());
}

#[test]
fn manual_depth_levels_bypass_coverage() {
    let mut engine = settled();
    engine.manually_set_depth_level(1).unwrap();
    let g = engine.adapter().unwrap();
    assert!(visible(g, "a1") && visible(g, "a2") && visible(g, "b1"));
    assert!(!visible(g, "a1x"));

    // Pans no longer schedule passes.
    engine
        .adapter_mut()
        .unwrap()
        .set_viewport(Viewport::new(10.0, 10.0));
    engine.tick(ms(400)).unwrap();
    assert_eq!(engine.pending_tasks(), 0);

    engine.set_adaptive_zoom_enabled(false).unwrap();
    assert_eq!(engine.depth_level(), Some(1));
    assert!(!visible(engine.adapter().unwrap(), "a1x"));

    engine.set_adaptive_zoom_enabled(true).unwrap();
    assert!(engine.is_adaptive_zoom_enabled());
    assert_eq!(engine.depth_level(), None);
    assert_prefix_closed(&engine);
}

#[test]
fn disabling_adaptive_zoom_without_a_level_shows_everything() {
    let mut engine = settled();
    engine.set_adaptive_zoom_enabled(false).unwrap();
    let g = engine.adapter().unwrap();
    for id in engine.hierarchy().ids() {
        assert!(visible(g, id), "{id} should be visible");
    }
}

#[test]
fn threshold_grows_with_area() {
    let cfg = ThresholdConfig::default();
    let mut t = AdaptiveThreshold::new(cfg);
    assert_eq!(t.threshold(1.0), cfg.max_percent);

    t.set_stats(NodeSizeStatistics::from_areas([100.0, 2_500.0, 1_000_000.0]));
    let mut last = f64::NEG_INFINITY;
    let mut area = 1.0;
    while area < 1e8 {
        let v = t.threshold(area);
        assert!(v >= last, "threshold decreased at area {area}");
        assert!((cfg.min_percent..=cfg.max_percent).contains(&v));
        last = v;
        area *= 1.7;
    }
    assert_eq!(t.threshold(100.0), cfg.min_percent);
    assert_eq!(t.threshold(1_000_000.0), cfg.max_percent);
}

#[test]
fn lock_unlock_lock_keeps_captured_sizes() {
    let mut g = nested_scene();
    let h = Hierarchy::build(&g);
    let mut lock = DimensionLock::new();
    let first = lock.capture_and_lock(&mut g, &h, Duration::ZERO);
    assert_eq!(first.len(), 3);
    let sizes: Vec<_> = lock.entries().map(|(id, e)| (id.to_string(), e.size())).collect();
    let boxes: Vec<_> = first.iter().map(|id| g.bounding_box(id).unwrap()).collect();

    lock.unlock(&mut g, None);
    assert_eq!(lock.locked_count(), 0);
    assert!(g.style("a").unwrap().fixed_size.is_none());

    lock.capture_and_lock(&mut g, &h, ms(10));
    let again: Vec<_> = lock.entries().map(|(id, e)| (id.to_string(), e.size())).collect();
    assert_eq!(sizes, again);
    let boxes_again: Vec<_> = first.iter().map(|id| g.bounding_box(id).unwrap()).collect();
    assert_eq!(boxes, boxes_again);
    assert!(lock.verify(&mut g).is_empty());
}

#[test]
fn recalculating_dimensions_picks_up_out_of_band_children() {
    let mut engine = settled();
    let before = engine.dimensions().entry("a1").unwrap().size();
    let far = engine.adapter().unwrap().position("a1").unwrap() + vector(0.0, 300.0);
    engine
        .adapter_mut()
        .unwrap()
        .add_node(NodeSpec::leaf("late").at(far.x, far.y).in_parent("a1"))
        .unwrap();

    let entry = engine.recalculate_dimensions("a1").unwrap().unwrap();
    assert!(entry.height > before.height);
    assert_eq!(engine.dimensions().entry("a1").unwrap().size(), entry.size());
    assert!(engine.hierarchy().contains("late"));
}

#[test]
fn compaction_never_introduces_overlaps() {
    // Jittered grids: cells are 100 apart and leaves 40 wide, so nothing overlaps up front.
    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut jitter = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        ((seed >> 33) as f64 / (1u64 << 31) as f64) * 40.0 - 20.0
    };
    let mut nodes = vec![NodeSpec::container("top"), NodeSpec::container("bottom")];
    for i in 0..36 {
        let (col, row) = ((i % 6) as f64, (i / 6) as f64);
        let (parent, dy) = if i < 18 { ("top", 0.0) } else { ("bottom", 400.0) };
        nodes.push(
            NodeSpec::leaf(format!("n{i}"))
                .at(col * 100.0 + jitter(), row * 100.0 + dy + jitter())
                .in_parent(parent),
        );
    }
    for k in 0..3 {
        nodes.push(NodeSpec::leaf(format!("loose{k}")).at(2_000.0 + k as f64 * 300.0, 0.0));
    }
    let mut g = SceneGraph::load(SceneOptions::default(), nodes, vec![]);
    let h = Hierarchy::build(&g);
    let ids: Vec<String> = h.ids().map(str::to_string).collect();

    let overlapping = |g: &SceneGraph| {
        let mut pairs = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if h.is_related(a, b) {
                    continue;
                }
                if g.bounding_box(a).unwrap().intersects(&g.bounding_box(b).unwrap()) {
                    pairs.push((a.clone(), b.clone()));
                }
            }
        }
        pairs
    };
    let before = overlapping(&g);

    let mut compactor = Compactor::new();
    let report = compactor
        .compact(&mut g, &h, &ids, &CompactionConfig::default(), 1)
        .unwrap();
    for pair in overlapping(&g) {
        assert!(before.contains(&pair), "compaction created overlap {pair:?}");
    }
    assert!(report.shifted_columns > 0);
    assert!(report.packed_groups > 0);
    assert!(compactor
        .compact(&mut g, &h, &ids, &CompactionConfig::default(), 1)
        .is_none());
}

#[test]
fn unexplained_moves_are_reverted_but_drags_stick() {
    let mut engine = settled();
    let home = engine.adapter().unwrap().position("b1").unwrap();

    engine
        .adapter_mut()
        .unwrap()
        .set_position("b1", point(home.x + 250.0, home.y));
    let report = engine.tick(ms(400)).unwrap();
    assert_eq!(report.drift_reverted, 1);
    assert_eq!(engine.adapter().unwrap().position("b1"), Some(home));

    let target = point(home.x - 60.0, home.y + 15.0);
    let scene = engine.adapter_mut().unwrap();
    scene.grab("b1");
    scene.drag("b1", target);
    scene.release("b1");
    let report = engine.tick(ms(500)).unwrap();
    assert_eq!(report.drift_reverted, 0);
    assert_near(engine.adapter().unwrap().position("b1").unwrap(), target);
    assert_near(engine.positions().cached("b1").unwrap(), target);
}

#[test]
fn drift_before_a_host_call_is_still_reverted() {
    let mut engine = settled();
    let home = engine.adapter().unwrap().position("b1").unwrap();
    engine
        .adapter_mut()
        .unwrap()
        .set_position("b1", home + vector(250.0, 0.0));
    engine.manually_set_depth_level(1).unwrap();
    assert_eq!(engine.adapter().unwrap().position("b1"), Some(home));
    assert_eq!(engine.positions().cached("b1"), Some(home));

    let a2 = engine.adapter().unwrap().position("a2").unwrap();
    engine
        .adapter_mut()
        .unwrap()
        .set_position("a2", a2 + vector(0.0, -90.0));
    engine.recalculate_thresholds().unwrap();
    assert_eq!(engine.adapter().unwrap().position("a2"), Some(a2));
    assert_eq!(engine.positions().cached("a2"), Some(a2));

    let report = engine.tick(ms(400)).unwrap();
    assert_eq!(report.drift_reverted, 0);
}

#[test]
fn unlocked_containers_do_not_follow_revealed_children() {
    let config = EngineConfig {
        lock_dimensions: false,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(nested_scene(), config).unwrap();
    engine.apply_initial_visibility(Duration::ZERO).unwrap();
    engine.tick(ms(300)).unwrap();
    assert_eq!(engine.dimensions().locked_count(), 0);
    let home = engine.adapter().unwrap().position("a1").unwrap();
    assert_eq!(engine.positions().cached("a1"), Some(home));

    let scene = engine.adapter_mut().unwrap();
    scene.set_selected("b1", true);
    scene.set_viewport(Viewport::new(1000.0, 1000.0).with_zoom(0.1));
    engine.tick(ms(400)).unwrap();
    engine.recalculate_thresholds().unwrap();

    let g = engine.adapter().unwrap();
    assert!(visible(g, "b1") && visible(g, "a1x") && visible(g, "a1"));
    assert_eq!(g.position("a1"), Some(home));
    assert_eq!(engine.positions().cached("a1"), Some(home));
}

#[test]
fn second_compaction_in_a_settle_is_a_no_op() {
    let mut engine = settled();
    assert!(engine.compact().unwrap().is_none());
}

#[test]
fn torn_down_engine_reports_missing_scene() {
    let mut engine = settled();
    let scene = engine.teardown().unwrap();
    assert!(scene.has_node("a"));

    assert!(matches!(engine.tick(ms(1_000)), Err(Error::NoScene)));
    assert!(matches!(
        engine.on_node_added(NodeSpec::leaf("z")),
        Err(Error::NoScene)
    ));
    assert!(matches!(engine.resolve_overlaps(), Err(Error::NoScene)));
    assert!(matches!(engine.adapter(), Err(Error::NoScene)));
    assert!(engine.teardown().is_none());
}
