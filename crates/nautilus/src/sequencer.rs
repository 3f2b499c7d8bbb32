//! FIFO sequencing of externally supplied mutation batches.
//!
//! Batches are applied one at a time. While a batch is in flight the processing latch is held;
//! once it has been applied the incremental latch tells the dimension lock to trust its cache,
//! and render-tick dimension checks wait until it is released.
//! Both guards live in the in-flight record, so finishing, timing out, aborting or clearing a
//! batch always releases them.

use crate::adapter::{GeometryAdapter, batch};
use crate::config::PlacementConfig;
use crate::schedule::{Latch, LatchGuard};
use nautilus_graph::geom::{Box2D, Point, point};
use nautilus_graph::{EdgeSpec, NodeSpec};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::time::Duration;

/// Monotonic id of a mutation batch.
pub type BatchId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRemoval {
    pub id: String,
    /// Parent as known to the caller; the scene's own parent is used when absent.
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationBatch {
    pub id: BatchId,
    pub removals: Vec<NodeRemoval>,
    pub additions: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

/// What a batch actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub id: BatchId,
    pub removed_nodes: Vec<String>,
    pub removed_edges: Vec<String>,
    pub added_nodes: Vec<String>,
    pub added_edges: Vec<String>,
    /// Edges not added because an endpoint is missing or the id already exists.
    pub skipped_edges: Vec<String>,
    /// Surviving containers whose child set changed.
    pub touched_parents: Vec<String>,
}

#[derive(Debug)]
struct InFlight {
    id: BatchId,
    started_at: Duration,
    _processing: LatchGuard,
    incremental: Option<LatchGuard>,
}

#[derive(Debug)]
pub struct MutationSequencer {
    queue: VecDeque<MutationBatch>,
    next_id: BatchId,
    processing: Latch,
    incremental: Latch,
    in_flight: Option<InFlight>,
    placement: PlacementConfig,
}

impl MutationSequencer {
    pub fn new(placement: PlacementConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 1,
            processing: Latch::new(),
            incremental: Latch::new(),
            in_flight: None,
            placement,
        }
    }

    pub fn enqueue(
        &mut self,
        removals: Vec<NodeRemoval>,
        additions: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> BatchId {
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(
            batch = id,
            removals = removals.len(),
            additions = additions.len(),
            edges = edges.len(),
            "mutation batch queued"
        );
        self.queue.push_back(MutationBatch {
            id,
            removals,
            additions,
            edges,
        });
        id
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_held()
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental.is_held()
    }

    pub fn in_flight(&self) -> Option<BatchId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    pub fn in_flight_since(&self) -> Option<Duration> {
        self.in_flight.as_ref().map(|f| f.started_at)
    }

    /// Takes the next batch off the queue unless one is already in flight.
    pub fn begin_next(&mut self, now: Duration) -> Option<MutationBatch> {
        if self.in_flight.is_some() || self.queue.is_empty() {
            return None;
        }
        let guard = self.processing.try_acquire()?;
        let next = self.queue.pop_front()?;
        self.in_flight = Some(InFlight {
            id: next.id,
            started_at: now,
            _processing: guard,
            incremental: None,
        });
        Some(next)
    }

    /// Applies an in-flight batch: removals, then additions, then edges.
    ///
    /// Scene errors abort the batch; the caller is expected to drop all incremental state.
    pub fn apply<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        mutation: &MutationBatch,
    ) -> Result<BatchReport, String> {
        match self.in_flight.as_mut() {
            Some(f) if f.id == mutation.id => {
                if f.incremental.is_none() {
                    f.incremental = self.incremental.try_acquire();
                }
            }
            _ => return Err(format!("batch {} is not in flight", mutation.id)),
        }
        let placement = self.placement;
        batch(adapter, |adapter| apply_mutation(adapter, mutation, &placement))
    }

    /// Finalizes the in-flight batch. Returns `false` when `id` is not the in-flight batch.
    pub fn finish(&mut self, id: BatchId) -> bool {
        match &self.in_flight {
            Some(f) if f.id == id => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Drops the in-flight batch without finishing it.
    pub fn abort(&mut self) -> Option<BatchId> {
        self.in_flight.take().map(|f| f.id)
    }

    /// Drops the in-flight batch and every queued one.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.in_flight = None;
        dropped
    }
}

fn apply_mutation<A: GeometryAdapter + ?Sized>(
    adapter: &mut A,
    mutation: &MutationBatch,
    placement: &PlacementConfig,
) -> Result<BatchReport, String> {
    let mut report = BatchReport {
        id: mutation.id,
        ..BatchReport::default()
    };
    let mut parents: Vec<String> = Vec::new();

    for r in &mutation.removals {
        if !adapter.has_node(&r.id) {
            tracing::debug!(id = r.id.as_str(), "removal of unknown node skipped");
            continue;
        }
        if let Some(p) = r.parent.clone().or_else(|| adapter.parent(&r.id)) {
            parents.push(p);
        }
        let removed = adapter.remove_node(&r.id);
        report.removed_nodes.extend(removed.nodes);
        report.removed_edges.extend(removed.edges);
    }

    let mut placer = Placer::new(&*adapter, &mutation.additions, placement);
    for spec in parent_first(&mutation.additions) {
        let mut spec = spec.clone();
        let center = placer.place(&*adapter, &spec);
        spec.x = center.x;
        spec.y = center.y;
        adapter
            .add_node(&spec)
            .map_err(|e| format!("adding node {}: {e}", spec.id))?;
        if let Some(p) = &spec.parent {
            parents.push(p.clone());
        }
        report.added_nodes.push(spec.id);
    }

    for edge in &mutation.edges {
        if adapter.has_edge(&edge.id) {
            tracing::debug!(id = edge.id.as_str(), "edge already present, skipped");
            report.skipped_edges.push(edge.id.clone());
            continue;
        }
        if !adapter.has_node(&edge.source) || !adapter.has_node(&edge.target) {
            tracing::warn!(
                id = edge.id.as_str(),
                source = edge.source.as_str(),
                target = edge.target.as_str(),
                "edge endpoint missing, skipped"
            );
            report.skipped_edges.push(edge.id.clone());
            continue;
        }
        adapter
            .add_edge(edge)
            .map_err(|e| format!("adding edge {}: {e}", edge.id))?;
        report.added_edges.push(edge.id.clone());
    }

    let mut seen: FxHashSet<String> = FxHashSet::default();
    report.touched_parents = parents
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect();
    Ok(report)
}

/// Orders additions so that a parent added in the same batch precedes its children.
fn parent_first(additions: &[NodeSpec]) -> Vec<&NodeSpec> {
    let in_batch: FxHashSet<&str> = additions.iter().map(|s| s.id.as_str()).collect();
    let mut placed: FxHashSet<&str> = FxHashSet::default();
    let mut out: Vec<&NodeSpec> = Vec::with_capacity(additions.len());
    let mut pending: Vec<&NodeSpec> = additions.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut rest = Vec::new();
        for spec in pending {
            let ready = match spec.parent.as_deref() {
                Some(p) => !in_batch.contains(p) || placed.contains(p),
                None => true,
            };
            if ready {
                placed.insert(spec.id.as_str());
                out.push(spec);
            } else {
                rest.push(spec);
            }
        }
        if rest.len() == before {
            // Parent cycle inside the batch; the scene rejects these.
            out.extend(rest);
            break;
        }
        pending = rest;
    }
    out
}

/// Deterministic grid placement for added nodes.
///
/// The k-th child of a parent that ends up with n children goes to column `k mod ceil(sqrt(n))`
/// and row `k div ceil(sqrt(n))` inside the parent's box. Parentless nodes are lined up to the
/// right of the current graph bounds.
struct Placer {
    config: PlacementConfig,
    /// Per parent: (next slot, total children once the batch is applied).
    slots: FxHashMap<String, (usize, usize)>,
    /// Parent boxes as first seen, so earlier additions do not shift the grid origin.
    parent_boxes: FxHashMap<String, Box2D>,
    graph_bounds: Option<Box2D>,
    next_root: usize,
}

impl Placer {
    fn new<A: GeometryAdapter + ?Sized>(
        adapter: &A,
        additions: &[NodeSpec],
        config: &PlacementConfig,
    ) -> Self {
        let mut slots: FxHashMap<String, (usize, usize)> = FxHashMap::default();
        for spec in additions {
            if let Some(p) = &spec.parent {
                let entry = slots.entry(p.clone()).or_insert_with(|| {
                    let existing = adapter.children(p).into_value().len();
                    (existing, existing)
                });
                entry.1 += 1;
            }
        }
        let graph_bounds = adapter
            .node_ids()
            .iter()
            .filter(|id| adapter.parent(id).is_none())
            .filter_map(|id| adapter.bounding_box(id))
            .reduce(|a, b| a.union(&b));
        Self {
            config: *config,
            slots,
            parent_boxes: FxHashMap::default(),
            graph_bounds,
            next_root: 0,
        }
    }

    fn place<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &A,
        spec: &NodeSpec,
    ) -> Point {
        let (w, h) = (spec.width.max(0.0), spec.height.max(0.0));
        let gap = self.config.gap;
        let pad = self.config.padding;

        if let Some(parent) = &spec.parent {
            if !self.parent_boxes.contains_key(parent) {
                if let Some(b) = adapter.bounding_box(parent) {
                    self.parent_boxes.insert(parent.clone(), b);
                }
            }
            if let (Some(b), Some(slot)) =
                (self.parent_boxes.get(parent), self.slots.get_mut(parent))
            {
                let k = slot.0;
                slot.0 += 1;
                let cols = (slot.1.max(1) as f64).sqrt().ceil() as usize;
                let (col, row) = (k % cols, k / cols);
                return point(
                    b.min.x + pad + col as f64 * (w + gap) + w / 2.0,
                    b.min.y + pad + row as f64 * (h + gap) + h / 2.0,
                );
            }
        }

        let k = self.next_root;
        self.next_root += 1;
        let (left, top) = match &self.graph_bounds {
            Some(b) => (b.max.x + gap, b.min.y),
            None => (0.0, 0.0),
        };
        point(left + k as f64 * (w + gap) + w / 2.0, top + h / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_graph::{SceneGraph, SceneOptions};

    fn scene() -> SceneGraph {
        SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::container("p").at(0.0, 0.0),
                NodeSpec::leaf("old").at(0.0, 0.0).in_parent("p"),
            ],
            vec![],
        )
    }

    #[test]
    fn batches_run_one_at_a_time_in_order() {
        let mut s = MutationSequencer::new(PlacementConfig::default());
        let first = s.enqueue(vec![], vec![NodeSpec::leaf("a")], vec![]);
        let second = s.enqueue(vec![], vec![NodeSpec::leaf("b")], vec![]);
        let batch = s.begin_next(Duration::ZERO).unwrap();
        assert_eq!(batch.id, first);
        assert!(s.is_processing());
        assert!(s.begin_next(Duration::ZERO).is_none());
        assert!(!s.finish(second));
        assert!(s.finish(first));
        assert!(!s.is_processing());
        assert_eq!(s.begin_next(Duration::ZERO).unwrap().id, second);
    }

    #[test]
    fn apply_places_children_inside_their_parent() {
        let mut g = scene();
        let mut s = MutationSequencer::new(PlacementConfig::default());
        s.enqueue(
            vec![],
            vec![
                NodeSpec::leaf("n1").in_parent("p"),
                NodeSpec::leaf("n2").in_parent("p"),
            ],
            vec![EdgeSpec::new("e", "n1", "n2"), EdgeSpec::new("bad", "n1", "ghost")],
        );
        let batch = s.begin_next(Duration::ZERO).unwrap();
        let report = s.apply(&mut g, &batch).unwrap();
        assert!(s.is_incremental());
        assert_eq!(report.added_nodes, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(report.added_edges, vec!["e".to_string()]);
        assert_eq!(report.skipped_edges, vec!["bad".to_string()]);
        assert_eq!(report.touched_parents, vec!["p".to_string()]);
        // Three children in total: a 2-column grid, n1 is slot 1 and n2 is slot 2.
        // Parent box is the old child's box (-20..20) plus 10 padding: -30..30.
        assert_eq!(g.position("n1").unwrap(), point(70.0, 10.0));
        assert_eq!(g.position("n2").unwrap(), point(10.0, 70.0));
        s.finish(batch.id);
        assert!(!s.is_incremental());
    }

    #[test]
    fn removals_report_connected_edges_and_parent() {
        let mut g = scene();
        g.add_node(NodeSpec::leaf("other").at(200.0, 0.0)).unwrap();
        g.add_edge(EdgeSpec::new("link", "old", "other")).unwrap();
        let mut s = MutationSequencer::new(PlacementConfig::default());
        s.enqueue(
            vec![NodeRemoval {
                id: "old".into(),
                parent: None,
            }],
            vec![],
            vec![],
        );
        let batch = s.begin_next(Duration::ZERO).unwrap();
        let report = s.apply(&mut g, &batch).unwrap();
        assert_eq!(report.removed_nodes, vec!["old".to_string()]);
        assert_eq!(report.removed_edges, vec!["link".to_string()]);
        assert_eq!(report.touched_parents, vec!["p".to_string()]);
    }

    #[test]
    fn scene_errors_fail_the_batch_and_clear_releases_latches() {
        let mut g = scene();
        let mut s = MutationSequencer::new(PlacementConfig::default());
        s.enqueue(vec![], vec![NodeSpec::leaf("old")], vec![]);
        s.enqueue(vec![], vec![NodeSpec::leaf("later")], vec![]);
        let batch = s.begin_next(Duration::ZERO).unwrap();
        assert!(s.apply(&mut g, &batch).is_err());
        assert!(s.is_processing());
        assert_eq!(s.clear(), 1);
        assert!(!s.is_processing());
        assert!(!s.is_incremental());
        assert!(!g.in_batch());
    }

    #[test]
    fn parents_added_in_the_same_batch_come_first() {
        let specs = vec![
            NodeSpec::leaf("child").in_parent("fresh"),
            NodeSpec::container("fresh"),
        ];
        let order: Vec<&str> = parent_first(&specs).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["fresh", "child"]);
    }
}
