//! Position lock and drift guard.
//!
//! After the first layout settles every node position is cached. Position events are then
//! compared with the cache and any move larger than the tolerance that is not part of a user
//! drag is reverted. A grab/release bracket suspends the guard for the dragged subtree; on
//! release the new positions become the cached ones.

use crate::adapter::GeometryAdapter;
use crate::hierarchy::Hierarchy;
use nautilus_graph::SceneEvent;
use nautilus_graph::geom::Point;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftVerdict {
    /// The node is not tracked or the move stayed within tolerance.
    Accepted,
    /// The move happened inside a grab/release bracket.
    UserMove,
    /// The move was undone.
    Reverted,
}

#[derive(Debug, Clone)]
pub struct PositionLock {
    cache: FxHashMap<String, Point>,
    grabbed: FxHashSet<String>,
    tolerance: f64,
    reverted: usize,
}

impl PositionLock {
    pub fn new(tolerance: f64) -> Self {
        Self {
            cache: FxHashMap::default(),
            grabbed: FxHashSet::default(),
            tolerance,
            reverted: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.cache.is_empty()
    }

    pub fn cached(&self, id: &str) -> Option<Point> {
        self.cache.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn is_grabbed(&self, id: &str) -> bool {
        self.grabbed.contains(id)
    }

    /// Total number of reverted moves since the lock was created.
    pub fn reverted(&self) -> usize {
        self.reverted
    }

    /// Snapshots every node position.
    pub fn lock_all<A: GeometryAdapter + ?Sized>(&mut self, adapter: &A) {
        self.cache.clear();
        for id in adapter.node_ids() {
            if let Some(p) = adapter.position(&id) {
                self.cache.insert(id, p);
            }
        }
        tracing::debug!(count = self.cache.len(), "node positions locked");
    }

    /// Snapshots (or refreshes) the given nodes.
    pub fn lock<A: GeometryAdapter + ?Sized>(&mut self, adapter: &A, ids: &[String]) {
        for id in ids {
            match adapter.position(id) {
                Some(p) => {
                    self.cache.insert(id.clone(), p);
                }
                None => {
                    self.cache.remove(id);
                }
            }
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.cache.remove(id);
        self.grabbed.remove(id);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.grabbed.clear();
    }

    /// Feeds one scene event through the guard.
    pub fn observe<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        event: &SceneEvent,
    ) -> DriftVerdict {
        match event {
            SceneEvent::Grab { id } => {
                self.grabbed.insert(id.clone());
                DriftVerdict::UserMove
            }
            SceneEvent::Release { id } => {
                self.grabbed.remove(id);
                if self.is_locked() {
                    let mut moved = vec![id.clone()];
                    moved.extend(hierarchy.descendants(id));
                    self.lock(adapter, &moved);
                    tracing::debug!(id = id.as_str(), nodes = moved.len(), "user move committed");
                }
                DriftVerdict::UserMove
            }
            SceneEvent::Position { id, .. } => self.check(adapter, hierarchy, id),
            SceneEvent::Viewport(_) | SceneEvent::RenderTick => DriftVerdict::Accepted,
        }
    }

    fn check<A: GeometryAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        hierarchy: &Hierarchy,
        id: &str,
    ) -> DriftVerdict {
        if self.under_grab(hierarchy, id) {
            return DriftVerdict::UserMove;
        }
        let Some(cached) = self.cache.get(id).copied() else {
            return DriftVerdict::Accepted;
        };
        // Events are polled after the fact; compare the current position, not the reported one.
        let Some(current) = adapter.position(id) else {
            return DriftVerdict::Accepted;
        };
        if (current - cached).length() <= self.tolerance {
            return DriftVerdict::Accepted;
        }
        tracing::debug!(
            id,
            from_x = cached.x,
            from_y = cached.y,
            to_x = current.x,
            to_y = current.y,
            "position drift reverted"
        );
        adapter.set_position(id, cached);
        self.reverted += 1;
        DriftVerdict::Reverted
    }

    fn under_grab(&self, hierarchy: &Hierarchy, id: &str) -> bool {
        if self.grabbed.is_empty() {
            return false;
        }
        self.grabbed.contains(id)
            || hierarchy
                .ancestors(id)
                .iter()
                .any(|a| self.grabbed.contains(a))
    }
}
