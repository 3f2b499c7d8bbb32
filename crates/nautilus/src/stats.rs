use crate::adapter::GeometryAdapter;

/// Areas below this are clamped so the logarithmic normalization stays finite.
pub const MIN_AREA: f64 = 1.0;

/// Distribution of node bounding-box areas across the whole graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSizeStatistics {
    pub min_area: f64,
    pub median_area: f64,
    pub max_area: f64,
    pub count: usize,
}

impl NodeSizeStatistics {
    pub fn from_areas(areas: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut areas: Vec<f64> = areas
            .into_iter()
            .filter(|a| a.is_finite())
            .map(|a| a.max(MIN_AREA))
            .collect();
        if areas.is_empty() {
            return None;
        }
        areas.sort_by(f64::total_cmp);
        let n = areas.len();
        let median_area = if n % 2 == 1 {
            areas[n / 2]
        } else {
            (areas[n / 2 - 1] + areas[n / 2]) / 2.0
        };
        Some(Self {
            min_area: areas[0],
            median_area,
            max_area: areas[n - 1],
            count: n,
        })
    }

    pub fn collect<A: GeometryAdapter + ?Sized>(adapter: &A) -> Option<Self> {
        let areas: Vec<f64> = adapter
            .node_ids()
            .iter()
            .filter_map(|id| adapter.bounding_box(id))
            .map(|b| b.area())
            .collect();
        Self::from_areas(areas)
    }

    /// True when every node has (nearly) the same area.
    pub fn is_degenerate(&self) -> bool {
        self.max_area <= self.min_area
    }
}
