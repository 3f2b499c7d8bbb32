use super::GeometryAdapter;
use crate::geom::{Box2D, Point, Size, Vector};
use nautilus_graph::{
    EdgeSpec, Lookup, NodeKind, NodeSpec, Removal, SceneEvent, SceneGraph, StylePatch, Viewport,
};

fn owned(ids: Vec<&str>) -> Vec<String> {
    ids.into_iter().map(str::to_string).collect()
}

impl GeometryAdapter for SceneGraph {
    type Error = nautilus_graph::Error;

    fn node_ids(&self) -> Vec<String> {
        self.nodes().map(str::to_string).collect()
    }

    fn edge_ids(&self) -> Vec<String> {
        self.edges().map(str::to_string).collect()
    }

    fn has_node(&self, id: &str) -> bool {
        SceneGraph::has_node(self, id)
    }

    fn has_edge(&self, id: &str) -> bool {
        SceneGraph::has_edge(self, id)
    }

    fn node_kind(&self, id: &str) -> Option<NodeKind> {
        self.kind(id)
    }

    fn parent(&self, id: &str) -> Option<String> {
        SceneGraph::parent(self, id).map(str::to_string)
    }

    fn children(&self, id: &str) -> Lookup<Vec<String>> {
        // A node that is its own descendant cannot give a trustworthy child list.
        let children = owned(SceneGraph::children(self, id));
        let descendants = SceneGraph::descendants(self, id);
        if descendants.broken().iter().any(|b| b == id) {
            Lookup::Partial {
                value: children,
                broken: vec![id.to_string()],
            }
        } else {
            Lookup::Complete(children)
        }
    }

    fn descendants(&self, id: &str) -> Lookup<Vec<String>> {
        SceneGraph::descendants(self, id)
    }

    fn edge_endpoints(&self, id: &str) -> Option<(String, String)> {
        SceneGraph::edge_endpoints(self, id).map(|(s, t)| (s.to_string(), t.to_string()))
    }

    fn connected_edges(&self, node: &str) -> Vec<String> {
        owned(SceneGraph::connected_edges(self, node))
    }

    fn bounding_box(&self, id: &str) -> Option<Box2D> {
        SceneGraph::bounding_box(self, id)
    }

    fn position(&self, id: &str) -> Option<Point> {
        SceneGraph::position(self, id)
    }

    fn opacity(&self, id: &str) -> Option<f64> {
        self.style(id).map(|s| s.opacity)
    }

    fn edge_opacity(&self, id: &str) -> Option<f64> {
        self.edge_style(id).map(|s| s.opacity)
    }

    fn fixed_size(&self, id: &str) -> Option<Size> {
        self.style(id).and_then(|s| s.fixed_size)
    }

    fn is_selected(&self, id: &str) -> bool {
        SceneGraph::is_selected(self, id)
    }

    fn edge_interaction_override(&self, id: &str) -> bool {
        self.edge_highlighted(id)
    }

    fn viewport(&self) -> Viewport {
        SceneGraph::viewport(self)
    }

    fn set_position(&mut self, id: &str, to: Point) -> bool {
        SceneGraph::set_position(self, id, to)
    }

    fn translate(&mut self, id: &str, delta: Vector) -> bool {
        SceneGraph::translate(self, id, delta)
    }

    fn set_node_style(&mut self, id: &str, patch: &StylePatch) -> bool {
        self.set_style(id, patch)
    }

    fn set_edge_style(&mut self, id: &str, patch: &StylePatch) -> bool {
        SceneGraph::set_edge_style(self, id, patch)
    }

    fn begin_batch(&mut self) {
        SceneGraph::begin_batch(self)
    }

    fn end_batch(&mut self) {
        SceneGraph::end_batch(self)
    }

    fn add_node(&mut self, spec: &NodeSpec) -> Result<(), Self::Error> {
        SceneGraph::add_node(self, spec.clone())
    }

    fn add_edge(&mut self, spec: &EdgeSpec) -> Result<(), Self::Error> {
        SceneGraph::add_edge(self, spec.clone())
    }

    fn remove_node(&mut self, id: &str) -> Removal {
        SceneGraph::remove_node(self, id)
    }

    fn remove_edge(&mut self, id: &str) -> bool {
        SceneGraph::remove_edge(self, id)
    }

    fn drain_events(&mut self) -> Vec<SceneEvent> {
        SceneGraph::drain_events(self)
    }
}
