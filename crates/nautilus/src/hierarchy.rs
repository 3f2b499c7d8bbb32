//! Parent/child structure snapshot with healing of malformed input.
//!
//! The snapshot is rebuilt from the adapter whenever the node set changes. Parent references to
//! missing nodes are dropped, parent cycles are broken, and nodes whose children cannot be
//! listed completely are kept out of compound treatment. Every repair is recorded as a
//! [`Healing`] and logged once per rebuild.

use crate::adapter::GeometryAdapter;
use indexmap::IndexMap;
use nautilus_graph::NodeKind;
use rustc_hash::{FxBuildHasher, FxHashSet};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub depth: usize,
    pub kind: NodeKind,
    pub is_compound: bool,
    pub child_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Healing {
    /// The parent reference named a node that does not exist; the node became a root.
    DanglingParent { id: String, parent: String },
    /// Following parents from `id` led back to `id`; its parent link was cut.
    ParentCycle { id: String, parent: String },
    /// The adapter could only partly list the node's children.
    PartialChildren { id: String },
    /// A container without children is treated as a leaf.
    DemotedContainer { id: String },
}

#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    nodes: IndexMap<String, NodeInfo, FxBuildHasher>,
    roots: Vec<String>,
    healings: Vec<Healing>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<A: GeometryAdapter + ?Sized>(adapter: &A) -> Self {
        let mut h = Self::new();
        h.recompute(adapter);
        h
    }

    /// Rebuilds the snapshot from the adapter.
    pub fn recompute<A: GeometryAdapter + ?Sized>(&mut self, adapter: &A) {
        let ids = adapter.node_ids();
        let mut healings: Vec<Healing> = Vec::new();

        let mut parents: IndexMap<String, Option<String>, FxBuildHasher> = IndexMap::default();
        for id in &ids {
            let parent = match adapter.parent(id) {
                Some(p) if p == *id => {
                    healings.push(Healing::ParentCycle {
                        id: id.clone(),
                        parent: p,
                    });
                    None
                }
                Some(p) if adapter.has_node(&p) => Some(p),
                Some(p) => {
                    healings.push(Healing::DanglingParent {
                        id: id.clone(),
                        parent: p,
                    });
                    None
                }
                None => None,
            };
            parents.insert(id.clone(), parent);
        }

        break_cycles(&ids, &mut parents, &mut healings);

        let mut nodes: IndexMap<String, NodeInfo, FxBuildHasher> = IndexMap::default();
        for id in &ids {
            nodes.insert(
                id.clone(),
                NodeInfo {
                    parent: parents.get(id).cloned().flatten(),
                    children: Vec::new(),
                    depth: 0,
                    kind: adapter.node_kind(id).unwrap_or_default(),
                    is_compound: false,
                    child_count: 0,
                },
            );
        }
        for id in &ids {
            if let Some(Some(p)) = parents.get(id) {
                if let Some(info) = nodes.get_mut(p) {
                    info.children.push(id.clone());
                }
            }
        }

        for (id, info) in nodes.iter_mut() {
            info.child_count = info.children.len();
            let complete = adapter.children(id).is_complete();
            if !complete {
                healings.push(Healing::PartialChildren { id: id.clone() });
            }
            info.is_compound = info.child_count > 0 && complete;
            if info.kind == NodeKind::Container && info.child_count == 0 {
                healings.push(Healing::DemotedContainer { id: id.clone() });
            }
        }

        let roots: Vec<String> = nodes
            .iter()
            .filter(|(_, info)| info.parent.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        let mut queue: VecDeque<(String, usize)> = roots.iter().map(|r| (r.clone(), 0)).collect();
        while let Some((id, depth)) = queue.pop_front() {
            let children = match nodes.get_mut(&id) {
                Some(info) => {
                    info.depth = depth;
                    info.children.clone()
                }
                None => continue,
            };
            queue.extend(children.into_iter().map(|c| (c, depth + 1)));
        }

        for h in &healings {
            match h {
                Healing::DemotedContainer { .. } => tracing::debug!(?h, "hierarchy healed"),
                _ => tracing::warn!(?h, "hierarchy healed"),
            }
        }

        self.nodes = nodes;
        self.roots = roots;
        self.healings = healings;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn healings(&self) -> &[Healing] {
        &self.healings
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.parent.as_deref())
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn depth(&self, id: &str) -> Option<usize> {
        self.nodes.get(id).map(|n| n.depth)
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn is_compound(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.is_compound)
    }

    pub fn child_count(&self, id: &str) -> usize {
        self.nodes.get(id).map_or(0, |n| n.child_count)
    }

    pub fn compounds(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.is_compound)
            .map(|(id, _)| id.as_str())
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p.to_string());
            cur = self.parent(p);
        }
        out
    }

    /// Breadth-first descendants of `id`, excluding `id`.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = self.children(id).iter().map(String::as_str).collect();
        while let Some(cur) = queue.pop_front() {
            out.push(cur.to_string());
            queue.extend(self.children(cur).iter().map(String::as_str));
        }
        out
    }

    /// True when `a` and `b` are the same node or one contains the other.
    pub fn is_related(&self, a: &str, b: &str) -> bool {
        a == b || self.is_ancestor(a, b) || self.is_ancestor(b, a)
    }

    pub fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut cur = self.parent(of);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Nodes grouped by depth, roots first.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut frontier: Vec<String> = self.roots.clone();
        while !frontier.is_empty() {
            let next: Vec<String> = frontier
                .iter()
                .flat_map(|id| self.children(id).iter().cloned())
                .collect();
            levels.push(frontier);
            frontier = next;
        }
        levels
    }

    /// Every node after all of its descendants.
    pub fn post_order(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for level in self.levels().into_iter().rev() {
            out.extend(level);
        }
        out
    }
}

fn break_cycles(
    ids: &[String],
    parents: &mut IndexMap<String, Option<String>, FxBuildHasher>,
    healings: &mut Vec<Healing>,
) {
    let mut resolved: FxHashSet<String> = FxHashSet::default();
    for id in ids {
        if resolved.contains(id) {
            continue;
        }
        let mut path: Vec<String> = vec![id.clone()];
        let mut cur = id.clone();
        loop {
            let Some(Some(p)) = parents.get(&cur).cloned() else {
                break;
            };
            if resolved.contains(&p) {
                break;
            }
            if path.contains(&p) {
                parents.insert(cur.clone(), None);
                healings.push(Healing::ParentCycle {
                    id: cur.clone(),
                    parent: p,
                });
                break;
            }
            path.push(p.clone());
            cur = p;
        }
        resolved.extend(path);
    }
}
