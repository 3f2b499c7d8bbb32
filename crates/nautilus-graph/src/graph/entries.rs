//! Internal storage entries for [`SceneGraph`](super::SceneGraph).

use super::style::Style;
use crate::geom::{Point, Size};
use crate::graph::NodeKind;

#[derive(Debug, Clone)]
pub(in crate::graph) struct NodeEntry {
    pub(in crate::graph) id: String,
    pub(in crate::graph) kind: NodeKind,
    pub(in crate::graph) position: Point,
    /// Intrinsic size; used for leaves and for containers with nothing visible inside.
    pub(in crate::graph) size: Size,
    pub(in crate::graph) style: Style,
    pub(in crate::graph) selected: bool,
}

#[derive(Debug, Clone)]
pub(in crate::graph) struct EdgeEntry {
    pub(in crate::graph) id: String,
    pub(in crate::graph) source: String,
    pub(in crate::graph) target: String,
    pub(in crate::graph) style: Style,
    pub(in crate::graph) hovered: bool,
    pub(in crate::graph) selected: bool,
}
