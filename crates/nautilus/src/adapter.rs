//! The capability surface the engine needs from a retained rendering graph.
//!
//! The engine never touches a concrete graph library. Each rendering backend implements
//! [`GeometryAdapter`] once; `nautilus_graph::SceneGraph` is the in-memory reference backend.

use crate::geom::{Box2D, Point, Size, Vector};
use nautilus_graph::{
    EdgeSpec, Lookup, NodeKind, NodeSpec, Removal, SceneEvent, StylePatch, Viewport,
};

mod scene;

pub trait GeometryAdapter {
    /// Backend error for structural mutations.
    type Error: std::error::Error + Send + Sync + 'static;

    // -- queries ------------------------------------------------------------------------------

    /// Every node id in a stable order.
    fn node_ids(&self) -> Vec<String>;
    fn edge_ids(&self) -> Vec<String>;
    fn has_node(&self, id: &str) -> bool;
    fn has_edge(&self, id: &str) -> bool;
    fn node_kind(&self, id: &str) -> Option<NodeKind>;
    /// Raw parent reference. It may name a node that no longer exists.
    fn parent(&self, id: &str) -> Option<String>;
    fn children(&self, id: &str) -> Lookup<Vec<String>>;
    fn descendants(&self, id: &str) -> Lookup<Vec<String>>;
    fn edge_endpoints(&self, id: &str) -> Option<(String, String)>;
    fn connected_edges(&self, node: &str) -> Vec<String>;
    fn bounding_box(&self, id: &str) -> Option<Box2D>;
    fn position(&self, id: &str) -> Option<Point>;
    fn opacity(&self, id: &str) -> Option<f64>;
    fn edge_opacity(&self, id: &str) -> Option<f64>;
    fn fixed_size(&self, id: &str) -> Option<Size>;
    fn is_selected(&self, id: &str) -> bool;
    /// Hovered or selected edges stay visible regardless of their endpoints.
    fn edge_interaction_override(&self, id: &str) -> bool;
    fn viewport(&self) -> Viewport;

    // -- mutations ----------------------------------------------------------------------------

    fn set_position(&mut self, id: &str, to: Point) -> bool;
    /// Moves a node together with its descendants.
    fn translate(&mut self, id: &str, delta: Vector) -> bool;
    fn set_node_style(&mut self, id: &str, patch: &StylePatch) -> bool;
    fn set_edge_style(&mut self, id: &str, patch: &StylePatch) -> bool;
    fn begin_batch(&mut self);
    fn end_batch(&mut self);
    fn add_node(&mut self, spec: &NodeSpec) -> Result<(), Self::Error>;
    fn add_edge(&mut self, spec: &EdgeSpec) -> Result<(), Self::Error>;
    /// Removes a node, its subtree and every connected edge.
    fn remove_node(&mut self, id: &str) -> Removal;
    fn remove_edge(&mut self, id: &str) -> bool;

    // -- events -------------------------------------------------------------------------------

    fn drain_events(&mut self) -> Vec<SceneEvent>;

    // -- provided -----------------------------------------------------------------------------

    fn is_visible(&self, id: &str) -> bool {
        self.opacity(id).is_some_and(|o| o > 0.5)
    }

    fn is_edge_visible(&self, id: &str) -> bool {
        self.edge_opacity(id).is_some_and(|o| o > 0.5)
    }
}

/// Runs `f` inside a batch so observers see its mutations as one commit.
pub fn batch<A, R>(adapter: &mut A, f: impl FnOnce(&mut A) -> R) -> R
where
    A: GeometryAdapter + ?Sized,
{
    adapter.begin_batch();
    let out = f(adapter);
    adapter.end_batch();
    out
}
