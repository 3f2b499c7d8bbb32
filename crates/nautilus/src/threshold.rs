//! Size-adaptive coverage thresholds.
//!
//! Small nodes open as soon as they cover a small share of the viewport; large nodes need to
//! fill a larger share before their content is revealed. Areas are normalized on a logarithmic
//! scale between the smallest and largest node in the graph, then shaped by a power curve:
//!
//! `threshold(a) = min + (max - min) * norm(a) ^ power`

use crate::config::ThresholdConfig;
use crate::stats::{MIN_AREA, NodeSizeStatistics};

#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    config: ThresholdConfig,
    stats: Option<NodeSizeStatistics>,
}

impl AdaptiveThreshold {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            stats: None,
        }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn stats(&self) -> Option<&NodeSizeStatistics> {
        self.stats.as_ref()
    }

    pub fn set_stats(&mut self, stats: Option<NodeSizeStatistics>) {
        if let Some(s) = &stats {
            tracing::debug!(
                min = s.min_area,
                median = s.median_area,
                max = s.max_area,
                count = s.count,
                "node size statistics updated"
            );
        }
        self.stats = stats;
    }

    /// Position of `area` between the smallest and largest node, in `[0, 1]`.
    pub fn normalize(&self, area: f64) -> f64 {
        let Some(s) = &self.stats else {
            return 1.0;
        };
        if s.is_degenerate() {
            return 1.0;
        }
        let lo = s.min_area.ln();
        let hi = s.max_area.ln();
        let a = area.max(MIN_AREA).ln();
        ((a - lo) / (hi - lo)).clamp(0.0, 1.0)
    }

    /// Coverage percentage `area` must reach before its children are revealed.
    ///
    /// Without statistics every node uses the maximum threshold.
    pub fn threshold(&self, area: f64) -> f64 {
        if self.stats.is_none() {
            return self.config.max_percent;
        }
        let n = self.normalize(area);
        let span = self.config.max_percent - self.config.min_percent;
        self.config.min_percent + span * n.powf(self.config.power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_range(min: f64, max: f64) -> AdaptiveThreshold {
        let mut t = AdaptiveThreshold::new(ThresholdConfig::default());
        t.set_stats(NodeSizeStatistics::from_areas([min, max]));
        t
    }

    #[test]
    fn endpoints_map_to_configured_range() {
        let t = with_range(100.0, 1_000_000.0);
        assert!((t.threshold(100.0) - 2.0).abs() < 1e-9);
        assert!((t.threshold(1_000_000.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_monotone_in_area() {
        let t = with_range(10.0, 1e7);
        let mut prev = f64::NEG_INFINITY;
        let mut a = 1.0;
        while a < 1e8 {
            let v = t.threshold(a);
            assert!(v >= prev);
            assert!((2.0..=20.0).contains(&v));
            prev = v;
            a *= 3.7;
        }
    }

    #[test]
    fn uniform_sizes_use_the_maximum() {
        let t = with_range(500.0, 500.0);
        assert_eq!(t.threshold(500.0), 20.0);
    }

    #[test]
    fn missing_statistics_use_the_maximum() {
        let t = AdaptiveThreshold::new(ThresholdConfig::default());
        assert_eq!(t.threshold(1.0), 20.0);
    }
}
