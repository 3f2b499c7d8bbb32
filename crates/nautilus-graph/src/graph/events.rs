//! Observable scene events.
//!
//! Events are buffered and polled by the owner (`SceneGraph::drain_events`) rather than pushed
//! through callbacks. Events raised inside a batch become observable when the outermost batch
//! ends.

use crate::geom::Point;
use crate::viewport::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A node's position changed, whatever the cause.
    Position { id: String, from: Point, to: Point },
    /// The user started dragging a node.
    Grab { id: String },
    /// The user released a dragged node.
    Release { id: String },
    /// Pan and/or zoom changed.
    Viewport(Viewport),
    /// A frame was rendered.
    RenderTick,
}
