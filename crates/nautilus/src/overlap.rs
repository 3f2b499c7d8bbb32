//! Iterative pairwise overlap removal between sibling nodes.
//!
//! Siblings are processed largest first. Each overlapping pair is pushed apart along the line
//! between their centres until either axis clears the minimum separation; containers are kept
//! in place when paired with a leaf, equal-sized nodes split the move. The number of sweeps is
//! capped, so dense clusters may keep a small residual overlap.

use crate::adapter::{GeometryAdapter, batch};
use crate::config::OverlapConfig;
use crate::hierarchy::Hierarchy;
use indexmap::IndexMap;
use nautilus_graph::geom::{Box2D, Vector, vector};
use rustc_hash::FxBuildHasher;

/// Angular step used to separate nodes sharing the same centre.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapReport {
    pub groups: usize,
    /// Largest number of sweeps any sibling group needed.
    pub iterations: usize,
    /// Number of pairwise pushes applied.
    pub moves: usize,
    /// Overlapping sibling pairs left when the sweep cap was reached.
    pub residual: usize,
    pub converged: bool,
    /// Nodes translated by the pass; their subtrees moved with them.
    pub moved: Vec<String>,
}

#[derive(Debug, Clone)]
struct Item {
    id: String,
    bounds: Box2D,
    area: f64,
    compound: bool,
    delta: Vector,
}

/// Separates overlapping siblings among `nodes`, parents before children.
///
/// Moving a node moves its whole subtree. Nodes outside `nodes` are neither moved nor
/// considered as obstacles.
pub fn resolve<A: GeometryAdapter + ?Sized>(
    adapter: &mut A,
    hierarchy: &Hierarchy,
    nodes: &[String],
    config: &OverlapConfig,
) -> OverlapReport {
    let mut report = OverlapReport {
        converged: true,
        ..OverlapReport::default()
    };
    for group in sibling_groups(hierarchy, nodes) {
        if group.len() < 2 {
            continue;
        }
        report.groups += 1;
        let mut items: Vec<Item> = group
            .iter()
            .filter_map(|id| {
                let bounds = adapter.bounding_box(id)?;
                Some(Item {
                    id: id.clone(),
                    bounds,
                    area: bounds.area(),
                    compound: hierarchy.is_compound(id),
                    delta: vector(0.0, 0.0),
                })
            })
            .collect();
        items.sort_by(|a, b| b.area.total_cmp(&a.area).then_with(|| a.id.cmp(&b.id)));

        let (iterations, moves) = separate(&mut items, config);
        let residual = count_overlaps(&items);
        report.iterations = report.iterations.max(iterations);
        report.moves += moves;
        report.residual += residual;
        if residual > 0 {
            report.converged = false;
            tracing::debug!(
                parent = hierarchy.parent(&items[0].id).unwrap_or("<root>"),
                residual,
                "overlap sweep cap reached"
            );
        }

        batch(adapter, |adapter| {
            for item in &items {
                if (item.delta.x != 0.0 || item.delta.y != 0.0)
                    && adapter.translate(&item.id, item.delta)
                {
                    report.moved.push(item.id.clone());
                }
            }
        });
    }
    tracing::debug!(
        groups = report.groups,
        moves = report.moves,
        residual = report.residual,
        "overlaps resolved"
    );
    report
}

/// Visible nodes of `nodes` grouped by parent, in breadth-first order of the parents.
pub(crate) fn sibling_groups(hierarchy: &Hierarchy, nodes: &[String]) -> Vec<Vec<String>> {
    let mut groups: IndexMap<Option<&str>, Vec<String>, FxBuildHasher> = IndexMap::default();
    let wanted: rustc_hash::FxHashSet<&str> = nodes.iter().map(String::as_str).collect();
    for level in hierarchy.levels() {
        for id in level {
            if !wanted.contains(id.as_str()) {
                continue;
            }
            groups.entry(hierarchy.parent(&id)).or_default().push(id.clone());
        }
    }
    groups.into_values().collect()
}

fn separate(items: &mut [Item], config: &OverlapConfig) -> (usize, usize) {
    let n = items.len();
    let mut iterations = 0;
    let mut moves = 0;
    for _ in 0..config.max_iterations {
        let mut any = false;
        for i in 0..n {
            for j in (i + 1)..n {
                if !items[i].bounds.intersects(&items[j].bounds) {
                    continue;
                }
                any = true;
                push_apart(items, i, j, i * n + j + 1, config);
                moves += 1;
            }
        }
        if !any {
            break;
        }
        iterations += 1;
    }
    (iterations, moves)
}

fn push_apart(items: &mut [Item], i: usize, j: usize, pair_index: usize, config: &OverlapConfig) {
    let (a, b) = (&items[i], &items[j]);
    let d = b.bounds.center() - a.bounds.center();
    let dist = d.length();
    let u = if dist < 1e-9 {
        let angle = GOLDEN_ANGLE * pair_index as f64;
        vector(angle.cos(), angle.sin())
    } else {
        d / dist
    };

    let spacing = config.spacing
        + if a.compound || b.compound {
            config.compound_spacing
        } else {
            0.0
        };
    let (sa, sb) = (a.bounds.size(), b.bounds.size());
    let min_x = (sa.width + sb.width) / 2.0 + spacing;
    let min_y = (sa.height + sb.height) / 2.0 + spacing;
    let mut reach = f64::INFINITY;
    if u.x.abs() > 1e-9 {
        reach = reach.min(min_x / u.x.abs());
    }
    if u.y.abs() > 1e-9 {
        reach = reach.min(min_y / u.y.abs());
    }
    let t = (reach - dist).max(0.0);
    if !t.is_finite() || t == 0.0 {
        return;
    }

    // Shares of the push taken by `a` (backwards) and `b` (forwards).
    let (share_a, share_b) = match (a.compound, b.compound) {
        (true, false) => (0.0, 1.0),
        (false, true) => (1.0, 0.0),
        _ if (a.area - b.area).abs() <= 1e-9 * a.area.max(b.area).max(1.0) => (0.5, 0.5),
        // Sorted by area, so `b` is the smaller one.
        _ => (0.0, 1.0),
    };
    shift(&mut items[i], u * (-t * share_a));
    shift(&mut items[j], u * (t * share_b));
}

fn shift(item: &mut Item, by: Vector) {
    if by.x == 0.0 && by.y == 0.0 {
        return;
    }
    item.bounds = item.bounds.translate(by);
    item.delta += by;
}

fn count_overlaps(items: &[Item]) -> usize {
    let mut count = 0;
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if items[i].bounds.intersects(&items[j].bounds) {
                count += 1;
            }
        }
    }
    count
}
