//! Retained compound scene graph.
//!
//! The graph owns every node and edge together with their geometry and style. Containers are
//! ordinary nodes that have children; their bounding box is derived from the boxes of their
//! visible children unless a fixed size has been applied.
//!
//! Observers poll [`SceneEvent`]s with [`SceneGraph::drain_events`]. Mutations made between
//! [`SceneGraph::begin_batch`] and the matching [`SceneGraph::end_batch`] are committed together:
//! container re-centring runs once and the events become observable only after the outermost
//! batch ends.

use crate::error::{Error, Result};
use crate::geom::{Box2D, Point, Size, Vector, centered_box, point, size};
use crate::viewport::Viewport;
use rustc_hash::FxBuildHasher;

mod entries;
mod events;
mod lookup;
mod style;

use entries::{EdgeEntry, NodeEntry};
pub use events::SceneEvent;
pub use lookup::Lookup;
pub use style::{Style, StylePatch};

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;
type HashSet<T> = hashbrown::HashSet<T, FxBuildHasher>;

/// Guards recursive box computation against parent cycles in loaded data.
const MAX_NESTING: usize = 256;

/// Container vs leaf classification supplied by the graph source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Container,
    #[default]
    Leaf,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_node_extent")]
    pub width: f64,
    #[serde(default = "default_node_extent")]
    pub height: f64,
    #[serde(default)]
    pub selected: bool,
}

fn default_node_extent() -> f64 {
    40.0
}

impl NodeSpec {
    pub fn leaf(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            kind: NodeKind::Leaf,
            x: 0.0,
            y: 0.0,
            width: default_node_extent(),
            height: default_node_extent(),
            selected: false,
        }
    }

    pub fn container(id: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Container,
            ..Self::leaf(id)
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn in_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl EdgeSpec {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SceneOptions {
    /// Space between a container's border and the union of its visible children.
    pub compound_padding: f64,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            compound_padding: 10.0,
        }
    }
}

/// Everything removed by [`SceneGraph::remove_node`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    options: SceneOptions,

    nodes: Vec<NodeEntry>,
    node_index: HashMap<String, usize>,

    edges: Vec<EdgeEntry>,
    edge_index: HashMap<String, usize>,

    parent: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,

    viewport: Viewport,

    batch_depth: usize,
    // Containers whose content visibility changed inside the current commit.
    dirty: HashSet<String>,
    pending: Vec<SceneEvent>,
    events: Vec<SceneEvent>,
    grabbed: HashSet<String>,
}

impl SceneGraph {
    pub fn new(options: SceneOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Builds a scene from externally supplied data without validating it.
    ///
    /// Duplicate node ids keep their first occurrence. Parent references to unknown nodes,
    /// parent cycles and edges with missing endpoints are stored as given; consumers are
    /// expected to heal them.
    pub fn load(options: SceneOptions, nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Self {
        let mut g = Self::new(options);
        for spec in nodes {
            if g.node_index.contains_key(&spec.id) {
                continue;
            }
            let parent = spec.parent.clone();
            let id = spec.id.clone();
            g.push_node(spec);
            if let Some(parent) = parent {
                g.link_parent(&id, &parent);
            }
        }
        for spec in edges {
            if g.edge_index.contains_key(&spec.id) {
                continue;
            }
            g.push_edge(spec);
        }
        g
    }

    pub fn options(&self) -> SceneOptions {
        self.options
    }

    fn push_node(&mut self, spec: NodeSpec) {
        let idx = self.nodes.len();
        self.node_index.insert(spec.id.clone(), idx);
        self.nodes.push(NodeEntry {
            id: spec.id,
            kind: spec.kind,
            position: point(spec.x, spec.y),
            size: size(spec.width.max(0.0), spec.height.max(0.0)),
            style: Style::default(),
            selected: spec.selected,
        });
    }

    fn push_edge(&mut self, spec: EdgeSpec) {
        let idx = self.edges.len();
        self.edge_index.insert(spec.id.clone(), idx);
        self.edges.push(EdgeEntry {
            id: spec.id,
            source: spec.source,
            target: spec.target,
            style: Style::default(),
            hovered: false,
            selected: false,
        });
    }

    fn link_parent(&mut self, child: &str, parent: &str) {
        self.parent.insert(child.to_string(), parent.to_string());
        let entry = self.children.entry(parent.to_string()).or_default();
        if !entry.iter().any(|c| c == child) {
            entry.push(child.to_string());
        }
    }

    // ---------------------------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------------------------

    pub fn add_node(&mut self, spec: NodeSpec) -> Result<()> {
        if self.node_index.contains_key(&spec.id) {
            return Err(Error::DuplicateNode { id: spec.id });
        }
        if let Some(parent) = spec.parent.as_deref() {
            if !self.node_index.contains_key(parent) {
                return Err(Error::UnknownParent {
                    id: spec.id.clone(),
                    parent: parent.to_string(),
                });
            }
        }
        let parent = spec.parent.clone();
        let id = spec.id.clone();
        self.push_node(spec);
        if let Some(parent) = parent {
            self.link_parent(&id, &parent);
            self.mark_dirty_from(&id);
        }
        self.commit();
        Ok(())
    }

    pub fn add_edge(&mut self, spec: EdgeSpec) -> Result<()> {
        if self.edge_index.contains_key(&spec.id) {
            return Err(Error::DuplicateEdge { id: spec.id });
        }
        if !self.node_index.contains_key(&spec.source)
            || !self.node_index.contains_key(&spec.target)
        {
            return Err(Error::MissingEndpoint { id: spec.id });
        }
        self.push_edge(spec);
        Ok(())
    }

    /// Removes a node, its whole subtree and every edge connected to any removed node.
    pub fn remove_node(&mut self, id: &str) -> Removal {
        if !self.node_index.contains_key(id) {
            return Removal::default();
        }
        let mut doomed = vec![id.to_string()];
        doomed.extend(self.descendants(id).into_value());
        let doomed_set: HashSet<String> = doomed.iter().cloned().collect();

        let removed_edges: Vec<String> = self
            .edges
            .iter()
            .filter(|e| {
                doomed_set.contains(e.source.as_str()) || doomed_set.contains(e.target.as_str())
            })
            .map(|e| e.id.clone())
            .collect();
        if !removed_edges.is_empty() {
            self.edges.retain(|e| {
                !doomed_set.contains(e.source.as_str()) && !doomed_set.contains(e.target.as_str())
            });
            self.reindex_edges();
        }

        self.mark_dirty_from(id);
        if let Some(parent) = self.parent.get(id).cloned() {
            if let Some(ch) = self.children.get_mut(&parent) {
                ch.retain(|c| c != id);
            }
        }
        for n in &doomed {
            self.parent.remove(n);
            self.children.remove(n);
            self.grabbed.remove(n);
            self.dirty.remove(n);
        }
        self.nodes.retain(|n| !doomed_set.contains(n.id.as_str()));
        self.reindex_nodes();
        self.commit();

        Removal {
            nodes: doomed,
            edges: removed_edges,
        }
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let Some(idx) = self.edge_index.get(id).copied() else {
            return false;
        };
        self.edges.remove(idx);
        self.reindex_edges();
        true
    }

    fn reindex_nodes(&mut self) {
        self.node_index.clear();
        for (i, n) in self.nodes.iter().enumerate() {
            self.node_index.insert(n.id.clone(), i);
        }
    }

    fn reindex_edges(&mut self) {
        self.edge_index.clear();
        for (i, e) in self.edges.iter().enumerate() {
            self.edge_index.insert(e.id.clone(), i);
        }
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn has_edge(&self, id: &str) -> bool {
        self.edge_index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn edges(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|e| e.id.as_str())
    }

    pub fn kind(&self, id: &str) -> Option<NodeKind> {
        self.node(id).map(|n| n.kind)
    }

    /// Raw parent reference; may name a node that does not exist in loaded data.
    pub fn parent(&self, id: &str) -> Option<&str> {
        self.parent.get(id).map(String::as_str)
    }

    pub fn children(&self, id: &str) -> Vec<&str> {
        self.children
            .get(id)
            .map(|v| {
                v.iter()
                    .filter(|c| self.node_index.contains_key(c.as_str()))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes without a parent reference, in insertion order.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| !self.parent.contains_key(&n.id))
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Breadth-first descendants of `id` (excluding `id`).
    pub fn descendants(&self, id: &str) -> Lookup<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        let mut broken: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::default();
        seen.insert(id);
        let mut queue: std::collections::VecDeque<&str> = self.children(id).into_iter().collect();
        while let Some(cur) = queue.pop_front() {
            if !seen.insert(cur) {
                broken.push(cur.to_string());
                continue;
            }
            out.push(cur.to_string());
            queue.extend(self.children(cur));
        }
        if broken.is_empty() {
            Lookup::Complete(out)
        } else {
            Lookup::Partial { value: out, broken }
        }
    }

    pub fn edge_endpoints(&self, id: &str) -> Option<(&str, &str)> {
        self.edge(id)
            .map(|e| (e.source.as_str(), e.target.as_str()))
    }

    pub fn connected_edges(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == node || e.target == node)
            .map(|e| e.id.as_str())
            .collect()
    }

    /// Nodes sharing an edge with `node`, deduplicated, in edge order.
    pub fn neighbors(&self, node: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in &self.edges {
            let other = if e.source == node {
                e.target.as_str()
            } else if e.target == node {
                e.source.as_str()
            } else {
                continue;
            };
            if other != node && self.node_index.contains_key(other) && !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    fn node(&self, id: &str) -> Option<&NodeEntry> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut NodeEntry> {
        self.node_index
            .get(id)
            .copied()
            .map(move |idx| &mut self.nodes[idx])
    }

    fn edge(&self, id: &str) -> Option<&EdgeEntry> {
        self.edge_index.get(id).map(|&idx| &self.edges[idx])
    }

    fn edge_mut(&mut self, id: &str) -> Option<&mut EdgeEntry> {
        self.edge_index
            .get(id)
            .copied()
            .map(move |idx| &mut self.edges[idx])
    }

    // ---------------------------------------------------------------------------------------
    // Geometry
    // ---------------------------------------------------------------------------------------

    pub fn position(&self, id: &str) -> Option<Point> {
        self.node(id).map(|n| n.position)
    }

    /// Intrinsic size as supplied when the node was created.
    pub fn intrinsic_size(&self, id: &str) -> Option<Size> {
        self.node(id).map(|n| n.size)
    }

    pub fn bounding_box(&self, id: &str) -> Option<Box2D> {
        let idx = *self.node_index.get(id)?;
        let mut visiting: Vec<usize> = Vec::new();
        Some(self.box_at(idx, &mut visiting))
    }

    fn box_at(&self, idx: usize, visiting: &mut Vec<usize>) -> Box2D {
        let n = &self.nodes[idx];
        if let Some(fixed) = n.style.fixed_size {
            return centered_box(n.position, fixed);
        }

        let mut content: Option<Box2D> = None;
        if visiting.len() < MAX_NESTING && !visiting.contains(&idx) {
            visiting.push(idx);
            if let Some(children) = self.children.get(&n.id) {
                for c in children {
                    let Some(&ci) = self.node_index.get(c) else {
                        continue;
                    };
                    if !self.nodes[ci].style.is_visible() {
                        continue;
                    }
                    let b = self.box_at(ci, visiting);
                    content = Some(match content {
                        Some(acc) => acc.union(&b),
                        None => b,
                    });
                }
            }
            visiting.pop();
        }

        let natural = match content {
            Some(b) => {
                let pad = self.options.compound_padding;
                b.inflate(pad, pad)
            }
            None => centered_box(n.position, n.size),
        };
        clamp_box(natural, n.style.min_size, n.style.max_size)
    }

    pub fn set_position(&mut self, id: &str, to: Point) -> bool {
        let Some(n) = self.node_mut(id) else {
            return false;
        };
        let from = n.position;
        if from == to {
            return true;
        }
        n.position = to;
        let id = id.to_string();
        self.pending.push(SceneEvent::Position { id, from, to });
        self.commit();
        true
    }

    /// Moves `id` and all of its descendants by `delta`.
    pub fn translate(&mut self, id: &str, delta: Vector) -> bool {
        if !self.node_index.contains_key(id) {
            return false;
        }
        if delta.x == 0.0 && delta.y == 0.0 {
            return true;
        }
        let mut subtree = vec![id.to_string()];
        subtree.extend(self.descendants(id).into_value());
        for n_id in subtree {
            if let Some(n) = self.node_mut(&n_id) {
                let from = n.position;
                n.position = from + delta;
                let to = n.position;
                self.pending.push(SceneEvent::Position { id: n_id, from, to });
            }
        }
        self.commit();
        true
    }

    // ---------------------------------------------------------------------------------------
    // Style and flags
    // ---------------------------------------------------------------------------------------

    pub fn style(&self, id: &str) -> Option<&Style> {
        self.node(id).map(|n| &n.style)
    }

    pub fn edge_style(&self, id: &str) -> Option<&Style> {
        self.edge(id).map(|e| &e.style)
    }

    pub fn set_style(&mut self, id: &str, patch: &StylePatch) -> bool {
        let Some(n) = self.node_mut(id) else {
            return false;
        };
        let opacity_changed = n.style.apply(patch);
        let resized = patch.fixed_size.is_some();
        if opacity_changed {
            self.mark_dirty_from(id);
        }
        if resized {
            self.dirty.insert(id.to_string());
        }
        self.commit();
        true
    }

    pub fn set_edge_style(&mut self, id: &str, patch: &StylePatch) -> bool {
        let Some(e) = self.edge_mut(id) else {
            return false;
        };
        e.style.apply(patch);
        true
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.node(id).is_some_and(|n| n.selected)
    }

    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.node_mut(id) {
            Some(n) => {
                n.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_edge_hovered(&mut self, id: &str, hovered: bool) -> bool {
        match self.edge_mut(id) {
            Some(e) => {
                e.hovered = hovered;
                true
            }
            None => false,
        }
    }

    pub fn set_edge_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.edge_mut(id) {
            Some(e) => {
                e.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Whether the edge is hovered or selected.
    pub fn edge_highlighted(&self, id: &str) -> bool {
        self.edge(id).is_some_and(|e| e.hovered || e.selected)
    }

    // ---------------------------------------------------------------------------------------
    // Viewport and user interaction
    // ---------------------------------------------------------------------------------------

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport == viewport {
            return;
        }
        self.viewport = viewport;
        self.pending.push(SceneEvent::Viewport(viewport));
        self.commit();
    }

    pub fn grab(&mut self, id: &str) -> bool {
        if !self.node_index.contains_key(id) {
            return false;
        }
        self.grabbed.insert(id.to_string());
        self.pending.push(SceneEvent::Grab { id: id.to_string() });
        self.commit();
        true
    }

    /// Drags a grabbed node (and its subtree) so that its position becomes `to`.
    pub fn drag(&mut self, id: &str, to: Point) -> bool {
        if !self.grabbed.contains(id) {
            return false;
        }
        let Some(from) = self.position(id) else {
            return false;
        };
        self.translate(id, to - from)
    }

    pub fn release(&mut self, id: &str) -> bool {
        if !self.grabbed.remove(id) {
            return false;
        }
        self.pending.push(SceneEvent::Release { id: id.to_string() });
        self.commit();
        true
    }

    pub fn render_tick(&mut self) {
        self.pending.push(SceneEvent::RenderTick);
        self.commit();
    }

    // ---------------------------------------------------------------------------------------
    // Batching and events
    // ---------------------------------------------------------------------------------------

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    pub fn end_batch(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.commit();
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    fn mark_dirty_from(&mut self, id: &str) {
        let mut cur = self.parent.get(id).cloned();
        let mut guard = 0usize;
        while let Some(p) = cur {
            guard += 1;
            if guard > MAX_NESTING || !self.dirty.insert(p.clone()) {
                break;
            }
            cur = self.parent.get(&p).cloned();
        }
    }

    fn commit(&mut self) {
        if self.batch_depth > 0 {
            return;
        }
        self.recenter_dirty_containers();
        self.events.append(&mut self.pending);
    }

    /// Unlocked containers follow their visible content, the way compound nodes of retained
    /// graph libraries re-centre when children appear or disappear.
    fn recenter_dirty_containers(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let mut ids: Vec<String> = self.dirty.drain().collect();
        ids.sort();
        for id in ids {
            let Some(&idx) = self.node_index.get(&id) else {
                continue;
            };
            let n = &self.nodes[idx];
            if n.style.fixed_size.is_some() {
                continue;
            }
            let has_visible_child = self
                .children(&id)
                .iter()
                .any(|c| self.style(c).is_some_and(Style::is_visible));
            if !has_visible_child {
                continue;
            }
            let mut visiting = Vec::new();
            let to = self.box_at(idx, &mut visiting).center();
            let from = self.nodes[idx].position;
            if (to - from).length() > 1e-9 {
                self.nodes[idx].position = to;
                self.pending.push(SceneEvent::Position { id, from, to });
            }
        }
    }
}

fn clamp_box(b: Box2D, min: Option<Size>, max: Option<Size>) -> Box2D {
    if min.is_none() && max.is_none() {
        return b;
    }
    let mut s = b.size();
    if let Some(m) = min {
        s.width = s.width.max(m.width);
        s.height = s.height.max(m.height);
    }
    if let Some(m) = max {
        s.width = s.width.min(m.width);
        s.height = s.height.min(m.height);
    }
    centered_box(b.center(), s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> SceneGraph {
        let mut g = SceneGraph::new(SceneOptions {
            compound_padding: 10.0,
        });
        g.add_node(NodeSpec::container("root").at(0.0, 0.0)).unwrap();
        g.add_node(NodeSpec::leaf("a").at(-50.0, 0.0).sized(20.0, 20.0).in_parent("root"))
            .unwrap();
        g.add_node(NodeSpec::leaf("b").at(50.0, 0.0).sized(20.0, 20.0).in_parent("root"))
            .unwrap();
        g.add_edge(EdgeSpec::new("e", "a", "b")).unwrap();
        g
    }

    #[test]
    fn container_box_wraps_visible_children() {
        let g = nested();
        let b = g.bounding_box("root").unwrap();
        assert_eq!(b.min, point(-70.0, -20.0));
        assert_eq!(b.max, point(70.0, 20.0));
    }

    #[test]
    fn hiding_a_child_shrinks_an_unlocked_container() {
        let mut g = nested();
        g.set_style("b", &StylePatch::hide());
        let b = g.bounding_box("root").unwrap();
        assert_eq!(b.max.x, -30.0);
        // The container followed its content.
        assert_eq!(g.position("root"), Some(point(-50.0, 0.0)));
    }

    #[test]
    fn fixed_size_wins_over_content() {
        let mut g = nested();
        g.set_style("root", &StylePatch::new().lock_size(size(140.0, 40.0)));
        g.set_style("a", &StylePatch::hide());
        g.set_style("b", &StylePatch::hide());
        let b = g.bounding_box("root").unwrap();
        assert_eq!(b.size(), size(140.0, 40.0));
    }

    #[test]
    fn remove_node_drops_subtree_and_edges() {
        let mut g = nested();
        let removed = g.remove_node("root");
        assert_eq!(removed.nodes.len(), 3);
        assert_eq!(removed.edges, vec!["e".to_string()]);
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn removing_a_child_reports_it_and_keeps_unrelated_edges() {
        let mut g = nested();
        g.add_node(NodeSpec::leaf("c").at(200.0, 0.0)).unwrap();
        g.add_edge(EdgeSpec::new("bc", "b", "c")).unwrap();
        let removed = g.remove_node("a");
        assert_eq!(removed.nodes, vec!["a".to_string()]);
        assert_eq!(removed.edges, vec!["e".to_string()]);
        assert!(g.has_edge("bc"));
        assert_eq!(g.edge_endpoints("bc"), Some(("b", "c")));
    }

    #[test]
    fn removing_last_child_leaves_parent_without_children() {
        let mut g = nested();
        g.remove_node("a");
        g.remove_node("b");
        assert!(g.children("root").is_empty());
        assert!(g.has_node("root"));
    }

    #[test]
    fn batch_defers_events_until_outermost_end() {
        let mut g = nested();
        g.drain_events();
        g.begin_batch();
        g.set_position("a", point(0.0, 100.0));
        g.begin_batch();
        g.set_position("b", point(0.0, 200.0));
        g.end_batch();
        assert!(g.drain_events().is_empty());
        g.end_batch();
        let events = g.drain_events();
        assert!(events.len() >= 2);
    }

    #[test]
    fn descendants_report_parent_cycles_as_partial() {
        let g = SceneGraph::load(
            SceneOptions::default(),
            vec![
                NodeSpec::container("x").in_parent("y"),
                NodeSpec::container("y").in_parent("x"),
            ],
            vec![],
        );
        let d = g.descendants("x");
        assert!(!d.is_complete());
        assert_eq!(d.value(), &vec!["y".to_string()]);
        // Bounding boxes still terminate.
        assert!(g.bounding_box("x").is_some());
    }

    #[test]
    fn drag_requires_grab_and_emits_bracketed_events() {
        let mut g = nested();
        g.drain_events();
        assert!(!g.drag("a", point(0.0, 0.0)));
        g.grab("a");
        g.drag("a", point(-60.0, 5.0));
        g.release("a");
        let events = g.drain_events();
        assert!(matches!(events.first(), Some(SceneEvent::Grab { .. })));
        assert!(matches!(events.last(), Some(SceneEvent::Release { .. })));
    }

    #[test]
    fn add_edge_rejects_missing_endpoint() {
        let mut g = nested();
        let err = g.add_edge(EdgeSpec::new("bad", "a", "ghost")).unwrap_err();
        assert_eq!(err, Error::MissingEndpoint { id: "bad".to_string() });
    }
}
