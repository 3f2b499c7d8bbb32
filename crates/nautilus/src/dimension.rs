//! Container dimension locking.
//!
//! A container's natural size is the union of its visible children. Once the graph is fully
//! expanded, every compound node is measured and its width/height pinned through the fixed,
//! min and max size constraints, so hiding children later cannot shrink it.

use crate::adapter::{GeometryAdapter, batch};
use crate::hierarchy::Hierarchy;
use indexmap::IndexMap;
use nautilus_graph::StylePatch;
use nautilus_graph::geom::{Size, size};
use rustc_hash::{FxBuildHasher, FxHashSet};
use std::time::Duration;

/// Largest difference between a locked size and the measured box that
/// [`DimensionLock::verify`] accepts.
pub const VERIFY_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionEntry {
    pub width: f64,
    pub height: f64,
    /// Session time of the measurement.
    pub captured_at: Duration,
}

impl DimensionEntry {
    pub fn size(&self) -> Size {
        size(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DimensionLock {
    cache: IndexMap<String, DimensionEntry, FxBuildHasher>,
    locked: FxHashSet<String>,
}

impl DimensionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, id: &str) -> Option<&DimensionEntry> {
        self.cache.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &DimensionEntry)> {
        self.cache.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locked.contains(id)
    }

    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// Measures and pins every compound node, innermost first.
    ///
    /// Containers without children are demoted instead of being locked to a degenerate size.
    /// The caller is expected to have revealed the whole graph beforehand.
    pub fn capture_and_lock<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        now: Duration,
    ) -> Vec<String> {
        let mut locked = Vec::new();
        batch(adapter, |adapter| {
            for id in hierarchy.post_order() {
                if !hierarchy.is_compound(&id) {
                    if self.is_locked(&id) || self.cache.contains_key(&id) {
                        self.demote(adapter, &id);
                    }
                    continue;
                }
                if self.measure_and_lock(adapter, &id, now) {
                    locked.push(id);
                }
            }
        });
        tracing::debug!(count = locked.len(), "container dimensions locked");
        locked
    }

    /// Releases the constraints of one node, or of every locked node. Cache entries are kept.
    pub fn unlock<A: GeometryAdapter + ?Sized>(&mut self, adapter: &mut A, id: Option<&str>) {
        let targets: Vec<String> = match id {
            Some(id) => self.locked.iter().filter(|l| *l == id).cloned().collect(),
            None => self.locked.iter().cloned().collect(),
        };
        if targets.is_empty() {
            return;
        }
        batch(adapter, |adapter| {
            for id in &targets {
                adapter.set_node_style(id, &StylePatch::new().unlock_size());
                self.locked.remove(id);
            }
        });
    }

    /// Re-measures a container after its child set changed structurally.
    ///
    /// Constraints are cleared, hidden descendants are revealed for the measurement and hidden
    /// again afterwards, then the new size is pinned.
    pub fn recalculate<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        id: &str,
        now: Duration,
    ) -> Option<DimensionEntry> {
        if !hierarchy.is_compound(id) {
            self.demote(adapter, id);
            return None;
        }
        let hidden: Vec<String> = hierarchy
            .descendants(id)
            .into_iter()
            .filter(|d| !adapter.is_visible(d))
            .collect();
        batch(adapter, |adapter| {
            self.unlock(adapter, Some(id));
            // Nested locked containers keep their own pinned sizes.
            for d in &hidden {
                adapter.set_node_style(d, &StylePatch::show());
            }
        });
        batch(adapter, |adapter| {
            self.measure_and_lock(adapter, id, now);
            for d in &hidden {
                adapter.set_node_style(d, &StylePatch::hide());
            }
        });
        tracing::debug!(id, "container dimensions recalculated");
        self.cache.get(id).copied()
    }

    /// Incremental counterpart of [`Self::capture_and_lock`] for the parents touched by a
    /// mutation batch: cached sizes are trusted and only nodes without a cache entry are measured.
    pub fn apply_incremental<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        ids: &[String],
        now: Duration,
    ) {
        batch(adapter, |adapter| {
            for id in ids {
                if !adapter.has_node(id) {
                    self.forget(id);
                    continue;
                }
                if !hierarchy.is_compound(id) {
                    self.demote(adapter, id);
                    continue;
                }
                match self.cache.get(id).copied() {
                    Some(entry) => {
                        if adapter.fixed_size(id) != Some(entry.size()) {
                            adapter.set_node_style(id, &StylePatch::new().lock_size(entry.size()));
                        }
                        self.locked.insert(id.clone());
                    }
                    None => {
                        self.measure_and_lock(adapter, id, now);
                    }
                }
            }
        });
    }

    /// Re-applies any locked size the rendering layer no longer honours.
    ///
    /// Returns the ids that had to be repaired.
    pub fn verify<A: GeometryAdapter + ?Sized>(&mut self, adapter: &mut A) -> Vec<String> {
        let mut locked: Vec<String> = self.locked.iter().cloned().collect();
        locked.sort();
        let mut repaired = Vec::new();
        for id in locked {
            let Some(entry) = self.cache.get(&id).copied() else {
                self.locked.remove(&id);
                continue;
            };
            let Some(b) = adapter.bounding_box(&id) else {
                self.forget(&id);
                continue;
            };
            let s = b.size();
            if (s.width - entry.width).abs() > VERIFY_TOLERANCE
                || (s.height - entry.height).abs() > VERIFY_TOLERANCE
            {
                tracing::warn!(
                    id = id.as_str(),
                    expected_w = entry.width,
                    expected_h = entry.height,
                    actual_w = s.width,
                    actual_h = s.height,
                    "locked dimensions drifted, re-applying"
                );
                adapter.set_node_style(&id, &StylePatch::new().lock_size(entry.size()));
                repaired.push(id);
            }
        }
        repaired
    }

    /// Clears the compound treatment of a node that has no children left.
    pub fn demote<A: GeometryAdapter + ?Sized>(&mut self, adapter: &mut A, id: &str) {
        if self.locked.remove(id) {
            adapter.set_node_style(id, &StylePatch::new().unlock_size());
        }
        if self.cache.shift_remove(id).is_some() {
            tracing::debug!(id, "childless container demoted");
        }
    }

    /// Drops all state for a node that left the graph.
    pub fn forget(&mut self, id: &str) {
        self.locked.remove(id);
        self.cache.shift_remove(id);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.locked.clear();
    }

    fn measure_and_lock<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        id: &str,
        now: Duration,
    ) -> bool {
        let Some(b) = adapter.bounding_box(id) else {
            return false;
        };
        let s = b.size();
        if !(s.width > 0.0 && s.height > 0.0) {
            tracing::warn!(id, "refusing to lock a degenerate container size");
            return false;
        }
        // Pin the box where it is now: the fixed size is centred on the position.
        adapter.set_position(id, b.center());
        adapter.set_node_style(id, &StylePatch::new().lock_size(s));
        self.cache.insert(
            id.to_string(),
            DimensionEntry {
                width: s.width,
                height: s.height,
                captured_at: now,
            },
        );
        self.locked.insert(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_graph::geom::point;
    use nautilus_graph::{NodeSpec, SceneGraph, SceneOptions};

    fn scene() -> SceneGraph {
        SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::container("c").at(0.0, 0.0),
                NodeSpec::leaf("a").at(-50.0, 0.0).sized(20.0, 20.0).in_parent("c"),
                NodeSpec::leaf("b").at(50.0, 40.0).sized(20.0, 20.0).in_parent("c"),
                NodeSpec::container("empty").at(300.0, 0.0),
            ],
            vec![],
        )
    }

    #[test]
    fn locked_container_keeps_its_size_when_children_hide() {
        let mut g = scene();
        let h = Hierarchy::build(&g);
        let mut dims = DimensionLock::new();
        let locked = dims.capture_and_lock(&mut g, &h, Duration::ZERO);
        assert_eq!(locked, vec!["c".to_string()]);

        let before = g.bounding_box("c").unwrap();
        g.set_style("a", &StylePatch::hide());
        g.set_style("b", &StylePatch::hide());
        assert_eq!(g.bounding_box("c").unwrap(), before);
        assert_eq!(g.position("c"), Some(point(0.0, 20.0)));
    }

    #[test]
    fn childless_container_is_not_locked() {
        let mut g = scene();
        let h = Hierarchy::build(&g);
        let mut dims = DimensionLock::new();
        dims.capture_and_lock(&mut g, &h, Duration::ZERO);
        assert!(!dims.is_locked("empty"));
        assert!(dims.entry("empty").is_none());
    }

    #[test]
    fn lock_unlock_lock_is_idempotent() {
        let mut g = scene();
        let h = Hierarchy::build(&g);
        let mut dims = DimensionLock::new();
        dims.capture_and_lock(&mut g, &h, Duration::ZERO);
        let first = *dims.entry("c").unwrap();
        dims.unlock(&mut g, None);
        assert!(!dims.is_locked("c"));
        dims.capture_and_lock(&mut g, &h, Duration::from_secs(1));
        let second = *dims.entry("c").unwrap();
        assert!((first.width - second.width).abs() < 1e-6);
        assert!((first.height - second.height).abs() < 1e-6);
    }

    #[test]
    fn verify_repairs_externally_cleared_constraints() {
        let mut g = scene();
        let h = Hierarchy::build(&g);
        let mut dims = DimensionLock::new();
        dims.capture_and_lock(&mut g, &h, Duration::ZERO);
        g.set_style("c", &StylePatch::new().unlock_size());
        g.set_style("b", &StylePatch::hide());
        assert_eq!(dims.verify(&mut g), vec!["c".to_string()]);
        assert!(dims.verify(&mut g).is_empty());
    }

    #[test]
    fn recalculate_measures_hidden_content() {
        let mut g = scene();
        let mut h = Hierarchy::build(&g);
        let mut dims = DimensionLock::new();
        dims.capture_and_lock(&mut g, &h, Duration::ZERO);
        g.set_style("a", &StylePatch::hide());
        g.add_node(NodeSpec::leaf("z").at(150.0, 0.0).sized(20.0, 20.0).in_parent("c"))
            .unwrap();
        h.recompute(&g);

        let entry = dims
            .recalculate(&mut g, &h, "c", Duration::from_secs(2))
            .unwrap();
        // a (-60..-40) through z (140..160), plus padding on both sides.
        assert_eq!(entry.width, 240.0);
        assert!(!g.style("a").unwrap().is_visible());
        assert!(dims.is_locked("c"));
    }
}
