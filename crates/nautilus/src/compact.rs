//! One-shot hierarchical compaction.
//!
//! Two phases run once per settle:
//!
//! 1. Grid packing, top-down: the visible children of every compound are packed into rows
//!    (largest first) wrapped at the container's inner width.
//! 2. Gap closing, per sibling group: nodes are clustered into columns and rows by centre
//!    proximity and every gap wider than the minimum spacing is narrowed. A single column or
//!    row never moves further than the shift cap.
//!
//! Every move is checked against the overlaps that existed before compaction; a move that
//! would create a new one is reverted.

use crate::adapter::{GeometryAdapter, batch};
use crate::config::CompactionConfig;
use crate::hierarchy::Hierarchy;
use crate::overlap::sibling_groups;
use indexmap::IndexSet;
use nautilus_graph::geom::{Box2D, Vector, vector};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub packed_groups: usize,
    /// Groups left as they were because they did not fit or would have overlapped.
    pub rejected_groups: usize,
    pub shifted_columns: usize,
    pub shifted_rows: usize,
    /// Column/row moves undone because they introduced an overlap.
    pub reverted: usize,
    /// Nodes whose translation was kept; their subtrees moved with them.
    pub moved: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Default)]
pub struct Compactor {
    last_settle: Option<u64>,
}

impl Compactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self, settle: u64) -> bool {
        self.last_settle == Some(settle)
    }

    pub fn reset(&mut self) {
        self.last_settle = None;
    }

    /// Compacts the visible nodes among `nodes`.
    ///
    /// Returns `None` when compaction already ran for `settle`; repeated passes would widen
    /// gaps instead of closing them.
    pub fn compact<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        nodes: &[String],
        config: &CompactionConfig,
        settle: u64,
    ) -> Option<CompactionReport> {
        if self.has_run(settle) {
            tracing::debug!(settle, "compaction already ran for this settle");
            return None;
        }
        self.last_settle = Some(settle);

        let visible: Vec<String> = nodes
            .iter()
            .filter(|id| adapter.is_visible(id))
            .cloned()
            .collect();
        let mut layout = Layout::capture(adapter, hierarchy, visible);
        let mut report = CompactionReport::default();

        pack_grids(adapter, &mut layout, config, &mut report);
        for group in sibling_groups(hierarchy, &layout.ids) {
            close_gaps(adapter, &mut layout, &group, Axis::X, config, &mut report);
            close_gaps(adapter, &mut layout, &group, Axis::Y, config, &mut report);
        }
        report.moved = layout.moved.into_iter().collect();
        tracing::debug!(?report, "compaction finished");
        Some(report)
    }
}

/// Cached boxes of the nodes taking part in compaction plus the overlaps present beforehand.
struct Layout<'h> {
    hierarchy: &'h Hierarchy,
    ids: Vec<String>,
    members: FxHashSet<String>,
    boxes: FxHashMap<String, Box2D>,
    baseline: FxHashSet<(String, String)>,
    moved: IndexSet<String, FxBuildHasher>,
}

impl<'h> Layout<'h> {
    fn capture<A: GeometryAdapter + ?Sized>(
        adapter: &A,
        hierarchy: &'h Hierarchy,
        ids: Vec<String>,
    ) -> Self {
        let boxes: FxHashMap<String, Box2D> = ids
            .iter()
            .filter_map(|id| Some((id.clone(), adapter.bounding_box(id)?)))
            .collect();
        let members: FxHashSet<String> = ids.iter().cloned().collect();
        let mut layout = Self {
            hierarchy,
            ids,
            members,
            boxes,
            baseline: FxHashSet::default(),
            moved: IndexSet::default(),
        };
        for i in 0..layout.ids.len() {
            for j in (i + 1)..layout.ids.len() {
                let (a, b) = (&layout.ids[i], &layout.ids[j]);
                if layout.conflict(a, b) {
                    layout.baseline.insert(pair(a, b));
                }
            }
        }
        layout
    }

    fn bounds(&self, id: &str) -> Option<Box2D> {
        self.boxes.get(id).copied()
    }

    /// Unrelated and overlapping.
    fn conflict(&self, a: &str, b: &str) -> bool {
        if self.hierarchy.is_related(a, b) {
            return false;
        }
        match (self.boxes.get(a), self.boxes.get(b)) {
            (Some(ba), Some(bb)) => ba.intersects(bb),
            _ => false,
        }
    }

    /// Member nodes whose boxes may change when `moved` nodes are translated.
    fn touched(&self, moved: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for id in moved {
            let mut family = vec![id.clone()];
            family.extend(self.hierarchy.descendants(id));
            family.extend(self.hierarchy.ancestors(id));
            for f in family {
                if self.members.contains(&f) && seen.insert(f.clone()) {
                    out.push(f);
                }
            }
        }
        out
    }

    fn refresh<A: GeometryAdapter + ?Sized>(&mut self, adapter: &A, touched: &[String]) {
        for id in touched {
            match adapter.bounding_box(id) {
                Some(b) => {
                    self.boxes.insert(id.clone(), b);
                }
                None => {
                    self.boxes.remove(id);
                }
            }
        }
    }

    fn introduces_overlap(&self, touched: &[String]) -> bool {
        touched.iter().any(|t| {
            self.ids
                .iter()
                .any(|o| o != t && self.conflict(t, o) && !self.baseline.contains(&pair(t, o)))
        })
    }

    /// Applies `moves` and keeps them only if no new overlap appears.
    fn try_moves<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        moves: &[(String, Vector)],
    ) -> bool {
        if moves.is_empty() {
            return true;
        }
        batch(adapter, |adapter| {
            for (id, d) in moves {
                adapter.translate(id, *d);
            }
        });
        let moved: Vec<String> = moves.iter().map(|(id, _)| id.clone()).collect();
        let touched = self.touched(&moved);
        self.refresh(adapter, &touched);
        if !self.introduces_overlap(&touched) {
            self.moved.extend(moved);
            return true;
        }
        batch(adapter, |adapter| {
            for (id, d) in moves {
                adapter.translate(id, -*d);
            }
        });
        self.refresh(adapter, &touched);
        false
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn pack_grids<A: GeometryAdapter + ?Sized>(
    adapter: &mut A,
    layout: &mut Layout<'_>,
    config: &CompactionConfig,
    report: &mut CompactionReport,
) {
    let hierarchy = layout.hierarchy;
    for level in hierarchy.levels() {
        for parent in level {
            if !hierarchy.is_compound(&parent) || !layout.members.contains(&parent) {
                continue;
            }
            let mut children: Vec<(String, Box2D)> = hierarchy
                .children(&parent)
                .iter()
                .filter_map(|c| Some((c.clone(), layout.bounds(c)?)))
                .collect();
            if children.len() < 2 {
                continue;
            }
            let Some(outer) = layout.bounds(&parent) else {
                continue;
            };
            children.sort_by(|a, b| {
                b.1.area()
                    .total_cmp(&a.1.area())
                    .then_with(|| a.0.cmp(&b.0))
            });

            let Some(moves) = grid_moves(&outer, &children, config) else {
                tracing::debug!(parent = parent.as_str(), "grid does not fit, group kept");
                report.rejected_groups += 1;
                continue;
            };
            if moves.is_empty() {
                continue;
            }
            if layout.try_moves(adapter, &moves) {
                report.packed_groups += 1;
            } else {
                report.rejected_groups += 1;
            }
        }
    }
}

/// Row-major grid placement inside `outer`. `None` when the children do not fit.
fn grid_moves(
    outer: &Box2D,
    children: &[(String, Box2D)],
    config: &CompactionConfig,
) -> Option<Vec<(String, Vector)>> {
    let left = outer.min.x + config.padding;
    let right = outer.max.x - config.padding;
    let bottom = outer.max.y - config.padding;
    let mut x = left;
    let mut y = outer.min.y + config.padding;
    let mut row_height: f64 = 0.0;
    let mut moves = Vec::new();
    for (id, b) in children {
        let s = b.size();
        if x > left && x + s.width > right {
            x = left;
            y += row_height + config.grid_gap;
            row_height = 0.0;
        }
        if x + s.width > right || y + s.height > bottom {
            return None;
        }
        let target = vector(x + s.width / 2.0, y + s.height / 2.0);
        let d = target - b.center().to_vector();
        if d.x.abs() > 1e-9 || d.y.abs() > 1e-9 {
            moves.push((id.clone(), d));
        }
        x += s.width + config.grid_gap;
        row_height = row_height.max(s.height);
    }
    Some(moves)
}

fn close_gaps<A: GeometryAdapter + ?Sized>(
    adapter: &mut A,
    layout: &mut Layout<'_>,
    group: &[String],
    axis: Axis,
    config: &CompactionConfig,
    report: &mut CompactionReport,
) {
    let lo = |b: &Box2D| match axis {
        Axis::X => b.min.x,
        Axis::Y => b.min.y,
    };
    let hi = |b: &Box2D| match axis {
        Axis::X => b.max.x,
        Axis::Y => b.max.y,
    };
    let mid = |b: &Box2D| (lo(b) + hi(b)) / 2.0;

    let mut members: Vec<(String, Box2D)> = group
        .iter()
        .filter_map(|id| Some((id.clone(), layout.bounds(id)?)))
        .collect();
    if members.len() < 2 {
        return;
    }
    members.sort_by(|a, b| mid(&a.1).total_cmp(&mid(&b.1)).then_with(|| a.0.cmp(&b.0)));

    let mut clusters: Vec<Vec<(String, Box2D)>> = Vec::new();
    let mut anchor = f64::NEG_INFINITY;
    for m in members {
        let c = mid(&m.1);
        if !clusters.is_empty() && c - anchor <= config.cluster_tolerance {
            if let Some(last) = clusters.last_mut() {
                last.push(m);
            }
        } else {
            anchor = c;
            clusters.push(vec![m]);
        }
    }
    if clusters.len() < 2 {
        return;
    }

    let span = |cluster: &[(String, Box2D)]| {
        cluster.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(l, h), (_, b)| {
            (l.min(lo(b)), h.max(hi(b)))
        })
    };
    let mut cumulative = 0.0;
    for k in 1..clusters.len() {
        let (_, prev_hi) = span(&clusters[k - 1]);
        let (next_lo, _) = span(&clusters[k]);
        let excess = next_lo - prev_hi - config.min_spacing;
        if excess > 0.0 {
            cumulative += excess.min(config.max_shift);
        }
        let shift = cumulative.min(config.max_shift);
        if shift <= 0.0 {
            continue;
        }
        let d = match axis {
            Axis::X => vector(-shift, 0.0),
            Axis::Y => vector(0.0, -shift),
        };
        let moves: Vec<(String, Vector)> = clusters[k]
            .iter()
            .map(|(id, _)| (id.clone(), d))
            .collect();
        if layout.try_moves(adapter, &moves) {
            match axis {
                Axis::X => report.shifted_columns += 1,
                Axis::Y => report.shifted_rows += 1,
            }
        } else {
            report.reverted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_graph::geom::point;
    use nautilus_graph::{NodeSpec, SceneGraph, SceneOptions};

    fn all_ids(h: &Hierarchy) -> Vec<String> {
        h.ids().map(str::to_string).collect()
    }

    #[test]
    fn wide_gaps_close_up_to_the_cap() {
        let mut g = SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::leaf("a").at(0.0, 0.0),
                NodeSpec::leaf("b").at(100.0, 0.0),
                NodeSpec::leaf("c").at(500.0, 0.0),
            ],
            vec![],
        );
        let h = Hierarchy::build(&g);
        let report = Compactor::new()
            .compact(&mut g, &h, &all_ids(&h), &CompactionConfig::default(), 1)
            .unwrap();
        // a..b gap is 60: 40 excess. b..c gap is 360: capped at 50 per column overall.
        assert_eq!(g.position("a"), Some(point(0.0, 0.0)));
        assert_eq!(g.position("b"), Some(point(60.0, 0.0)));
        assert_eq!(g.position("c"), Some(point(450.0, 0.0)));
        assert_eq!(report.shifted_columns, 2);
    }

    #[test]
    fn second_pass_in_the_same_settle_is_a_no_op() {
        let mut g = SceneGraph::load(
            SceneOptions::default(),
            vec![NodeSpec::leaf("a"), NodeSpec::leaf("b").at(300.0, 0.0)],
            vec![],
        );
        let h = Hierarchy::build(&g);
        let mut c = Compactor::new();
        let ids = all_ids(&h);
        assert!(c.compact(&mut g, &h, &ids, &CompactionConfig::default(), 7).is_some());
        let after = g.position("b");
        assert!(c.compact(&mut g, &h, &ids, &CompactionConfig::default(), 7).is_none());
        assert_eq!(g.position("b"), after);
        assert!(c.compact(&mut g, &h, &ids, &CompactionConfig::default(), 8).is_some());
    }

    #[test]
    fn children_are_packed_inside_locked_parent() {
        let mut g = SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::container("p").at(0.0, 0.0),
                NodeSpec::leaf("x").at(-150.0, -150.0).in_parent("p"),
                NodeSpec::leaf("y").at(150.0, 150.0).in_parent("p"),
            ],
            vec![],
        );
        g.set_style(
            "p",
            &nautilus_graph::StylePatch::new().lock_size(nautilus_graph::geom::size(400.0, 400.0)),
        );
        let h = Hierarchy::build(&g);
        let report = Compactor::new()
            .compact(&mut g, &h, &all_ids(&h), &CompactionConfig::default(), 1)
            .unwrap();
        assert_eq!(report.packed_groups, 1);
        // Top-left of the 400x400 box plus padding, then one grid gap.
        assert_eq!(g.position("x"), Some(point(-160.0, -160.0)));
        assert_eq!(g.position("y"), Some(point(-100.0, -160.0)));
    }

    #[test]
    fn moves_that_would_overlap_are_reverted() {
        // `blocker` sits between the two columns but in another sibling group.
        let mut g = SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::container("p").at(0.0, 0.0),
                NodeSpec::leaf("a").at(0.0, 0.0).in_parent("p"),
                NodeSpec::leaf("b").at(200.0, 0.0).in_parent("p"),
                NodeSpec::leaf("blocker").at(130.0, 0.0),
            ],
            vec![],
        );
        let h = Hierarchy::build(&g);
        let config = CompactionConfig {
            padding: 0.0,
            ..CompactionConfig::default()
        };
        let before_overlaps = count_conflicts(&g, &h);
        Compactor::new()
            .compact(&mut g, &h, &all_ids(&h), &config, 1)
            .unwrap();
        assert!(count_conflicts(&g, &h) <= before_overlaps);
    }

    fn count_conflicts(g: &SceneGraph, h: &Hierarchy) -> usize {
        let ids = all_ids(h);
        let layout = Layout::capture(g, h, ids);
        layout.baseline.len()
    }
}
