//! Coverage-driven visibility propagation.
//!
//! A pass starts from the base level (every root) plus the protected selection neighbourhood,
//! then repeatedly reveals the children of every visible compound whose viewport coverage
//! reaches its size-adjusted threshold. Newly revealed compounds are measured in the next round,
//! so revelation proceeds strictly top-down. Edge visibility is derived from the final node
//! visibility afterwards.

use crate::adapter::{GeometryAdapter, batch};
use crate::coverage::CoverageIndex;
use crate::hierarchy::Hierarchy;
use crate::schedule::Latch;
use crate::threshold::AdaptiveThreshold;
use nautilus_graph::StylePatch;
use rustc_hash::{FxHashMap, FxHashSet};

/// z-order step between hierarchy levels, so children render above their containers.
pub const Z_STEP: i32 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeReport {
    pub visible: usize,
    pub hidden: usize,
    /// Edges whose source or target no longer exists.
    pub dangling: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    pub visible_nodes: usize,
    pub hidden_nodes: usize,
    /// Nodes revealed because their parent's coverage reached its threshold.
    pub revealed: usize,
    /// Size of the selection neighbourhood, ancestors included.
    pub protected: usize,
    pub rounds: usize,
    pub edges: EdgeReport,
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityPropagator {
    transitioning: Latch,
}

impl VisibilityPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.is_held()
    }

    /// Runs one coverage-driven pass.
    ///
    /// Returns `None` when another pass is already running; the pass is dropped, not queued.
    pub fn propagate<A: GeometryAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        threshold: &AdaptiveThreshold,
    ) -> Option<PropagationReport> {
        let Some(_guard) = self.transitioning.try_acquire() else {
            tracing::debug!("visibility pass dropped, another pass is running");
            return None;
        };

        let protected = protected_set(adapter, hierarchy);
        let mut visible: FxHashSet<String> = hierarchy.roots().iter().cloned().collect();
        visible.extend(protected.iter().cloned());
        apply_node_visibility(adapter, hierarchy, &visible);

        let viewport = adapter.viewport();
        let mut index = CoverageIndex::visible(adapter);
        let mut revealed = 0usize;
        let mut rounds = 0usize;
        let mut expanded: FxHashSet<String> = FxHashSet::default();
        let mut frontier: Vec<String> = hierarchy
            .compounds()
            .filter(|id| visible.contains(*id))
            .map(str::to_string)
            .collect();

        while !frontier.is_empty() {
            rounds += 1;
            let percent: FxHashMap<String, (f64, f64)> = index
                .coverage(&viewport)
                .into_iter()
                .map(|c| (c.id, (c.percent, c.area)))
                .collect();

            let mut next: Vec<String> = Vec::new();
            let mut newly: Vec<String> = Vec::new();
            for id in &frontier {
                if !expanded.insert(id.clone()) {
                    continue;
                }
                let Some(&(pct, area)) = percent.get(id) else {
                    continue;
                };
                let needed = threshold.threshold(area);
                if pct < needed {
                    continue;
                }
                tracing::trace!(id = id.as_str(), pct, needed, "revealing children");
                for child in hierarchy.children(id) {
                    if visible.insert(child.clone()) {
                        newly.push(child.clone());
                        revealed += 1;
                    }
                    if hierarchy.is_compound(child) {
                        next.push(child.clone());
                    }
                }
            }
            if !newly.is_empty() {
                batch(adapter, |adapter| {
                    for id in &newly {
                        show(adapter, hierarchy, id);
                    }
                });
                for id in &newly {
                    index.insert(adapter, id);
                }
            }
            frontier = next;
        }

        let edges = update_edges(adapter);
        let report = PropagationReport {
            visible_nodes: visible.len(),
            hidden_nodes: hierarchy.len().saturating_sub(visible.len()),
            revealed,
            protected: protected.len(),
            rounds,
            edges,
        };
        tracing::debug!(
            visible = report.visible_nodes,
            revealed = report.revealed,
            rounds = report.rounds,
            "visibility propagated"
        );
        Some(report)
    }

    /// Shows every node down to `level` (roots are level 0), ignoring coverage.
    pub fn show_to_depth<A: GeometryAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        level: usize,
    ) -> Option<PropagationReport> {
        let Some(_guard) = self.transitioning.try_acquire() else {
            tracing::debug!("depth change dropped, another pass is running");
            return None;
        };
        let protected = protected_set(adapter, hierarchy);
        let mut visible: FxHashSet<String> = hierarchy
            .ids()
            .filter(|id| hierarchy.depth(id).is_some_and(|d| d <= level))
            .map(str::to_string)
            .collect();
        visible.extend(protected.iter().cloned());
        apply_node_visibility(adapter, hierarchy, &visible);
        let edges = update_edges(adapter);
        tracing::debug!(level, visible = visible.len(), "depth level applied");
        Some(PropagationReport {
            visible_nodes: visible.len(),
            hidden_nodes: hierarchy.len().saturating_sub(visible.len()),
            revealed: 0,
            protected: protected.len(),
            rounds: 0,
            edges,
        })
    }

    /// Reveals every node and edge.
    pub fn reveal_all<A: GeometryAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
    ) -> Option<PropagationReport> {
        self.show_to_depth(adapter, hierarchy, usize::MAX)
    }
}

/// Selected nodes, their direct neighbours and every ancestor of either.
pub fn protected_set<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    hierarchy: &Hierarchy,
) -> FxHashSet<String> {
    let mut out: FxHashSet<String> = FxHashSet::default();
    for id in hierarchy.ids() {
        if !adapter.is_selected(id) {
            continue;
        }
        out.insert(id.to_string());
        for edge in adapter.connected_edges(id) {
            let Some((s, t)) = adapter.edge_endpoints(&edge) else {
                continue;
            };
            let other = if s == id { t } else { s };
            if hierarchy.contains(&other) {
                out.insert(other);
            }
        }
    }
    let seeds: Vec<String> = out.iter().cloned().collect();
    for id in seeds {
        out.extend(hierarchy.ancestors(&id));
    }
    out
}

/// Re-derives every edge's visibility from its endpoints.
///
/// An edge is shown when both endpoints are visible, when it is hovered or selected, or when
/// either endpoint is selected. Edges with a missing endpoint are hidden.
pub fn update_edges<A: GeometryAdapter + ?Sized>(adapter: &mut A) -> EdgeReport {
    let mut report = EdgeReport::default();
    let mut plan: Vec<(String, bool)> = Vec::new();
    for id in adapter.edge_ids() {
        let visible = match adapter.edge_endpoints(&id) {
            Some((s, t)) if adapter.has_node(&s) && adapter.has_node(&t) => {
                (adapter.is_visible(&s) && adapter.is_visible(&t))
                    || adapter.edge_interaction_override(&id)
                    || adapter.is_selected(&s)
                    || adapter.is_selected(&t)
            }
            _ => {
                tracing::warn!(id = id.as_str(), "edge has a missing endpoint, hiding it");
                report.dangling.push(id.clone());
                false
            }
        };
        if visible {
            report.visible += 1;
        } else {
            report.hidden += 1;
        }
        plan.push((id, visible));
    }
    batch(adapter, |adapter| {
        for (id, visible) in &plan {
            if adapter.is_edge_visible(id) == *visible {
                continue;
            }
            let patch = if *visible {
                StylePatch::show()
            } else {
                StylePatch::hide()
            };
            adapter.set_edge_style(id, &patch);
        }
    });
    report
}

fn apply_node_visibility<A: GeometryAdapter + ?Sized>(
    adapter: &mut A,
    hierarchy: &Hierarchy,
    visible: &FxHashSet<String>,
) {
    batch(adapter, |adapter| {
        for id in hierarchy.ids() {
            if visible.contains(id) {
                show(adapter, hierarchy, id);
            } else if adapter.is_visible(id) {
                adapter.set_node_style(id, &StylePatch::hide());
            }
        }
    });
}

fn show<A: GeometryAdapter + ?Sized>(adapter: &mut A, hierarchy: &Hierarchy, id: &str) {
    let depth = hierarchy.depth(id).unwrap_or(0);
    let z = i32::try_from(depth).unwrap_or(i32::MAX).saturating_mul(Z_STEP);
    adapter.set_node_style(id, &StylePatch::show().z_index(z));
}
