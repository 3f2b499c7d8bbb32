//! Viewport coverage of visible nodes.
//!
//! Coverage is the share of the viewport's graph-space rectangle occupied by a node's bounding
//! box. Visible nodes are indexed in an R-tree so nodes outside the viewport are culled without
//! being scored.

use crate::adapter::GeometryAdapter;
use nautilus_graph::Viewport;
use nautilus_graph::geom::Box2D;
use rstar::{AABB, RTree, RTreeObject};

#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub id: String,
    /// Intersection area as a percentage of the viewport area.
    pub percent: f64,
    /// Distance between the node centre and the viewport centre, in graph units.
    pub distance_from_center: f64,
    pub area: f64,
}

#[derive(Debug, Clone)]
struct IndexedBox {
    id: String,
    bounds: Box2D,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min.x, self.bounds.min.y],
            [self.bounds.max.x, self.bounds.max.y],
        )
    }
}

/// Coverage of a single box, or `None` when it does not intersect the viewport.
pub fn coverage_of(id: &str, bounds: &Box2D, viewport: &Viewport) -> Option<Coverage> {
    let view = viewport.graph_rect();
    let view_area = view.area();
    if view_area <= 0.0 {
        return None;
    }
    let hit = bounds.intersection(&view)?;
    Some(Coverage {
        id: id.to_string(),
        percent: hit.area() / view_area * 100.0,
        distance_from_center: (bounds.center() - viewport.graph_center()).length(),
        area: bounds.area(),
    })
}

/// R-tree over the boxes of visible nodes.
pub struct CoverageIndex {
    tree: RTree<IndexedBox>,
}

impl CoverageIndex {
    /// Indexes every node that is visible right now.
    pub fn visible<A: GeometryAdapter + ?Sized>(adapter: &A) -> Self {
        let items: Vec<IndexedBox> = adapter
            .node_ids()
            .into_iter()
            .filter(|id| adapter.is_visible(id))
            .filter_map(|id| {
                let bounds = adapter.bounding_box(&id)?;
                Some(IndexedBox { id, bounds })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Adds a node that became visible after the index was built.
    pub fn insert<A: GeometryAdapter + ?Sized>(&mut self, adapter: &A, id: &str) -> bool {
        let Some(bounds) = adapter.bounding_box(id) else {
            return false;
        };
        self.tree.insert(IndexedBox {
            id: id.to_string(),
            bounds,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Coverage of every indexed node intersecting the viewport, nearest to the centre first.
    pub fn coverage(&self, viewport: &Viewport) -> Vec<Coverage> {
        let view = viewport.graph_rect();
        let search = AABB::from_corners([view.min.x, view.min.y], [view.max.x, view.max.y]);
        let mut out: Vec<Coverage> = self
            .tree
            .locate_in_envelope_intersecting(&search)
            .filter_map(|item| coverage_of(&item.id, &item.bounds, viewport))
            .collect();
        sort(&mut out);
        out
    }
}

/// Coverage of every visible node intersecting the viewport, nearest to the centre first.
pub fn visible_coverage<A: GeometryAdapter + ?Sized>(adapter: &A) -> Vec<Coverage> {
    CoverageIndex::visible(adapter).coverage(&adapter.viewport())
}

fn sort(out: &mut [Coverage]) {
    out.sort_by(|a, b| {
        a.distance_from_center
            .total_cmp(&b.distance_from_center)
            .then_with(|| a.id.cmp(&b.id))
    });
}
