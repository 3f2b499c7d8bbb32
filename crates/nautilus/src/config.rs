//! Engine configuration.
//!
//! Every constant the engine relies on is tuned empirically; they are exposed here as defaults
//! rather than fixed values. The JSON form uses camelCase keys and every field is optional:
//!
//! ```json
//! { "threshold": { "power": 3.0 }, "timing": { "debounceMs": 100 } }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub threshold: ThresholdConfig,
    pub timing: TimingConfig,
    pub drift: DriftConfig,
    pub overlap: OverlapConfig,
    pub compaction: CompactionConfig,
    pub placement: PlacementConfig,
    /// Capture and pin container sizes once the first layout settles.
    pub lock_dimensions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            timing: TimingConfig::default(),
            drift: DriftConfig::default(),
            overlap: OverlapConfig::default(),
            compaction: CompactionConfig::default(),
            placement: PlacementConfig::default(),
            lock_dimensions: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.threshold;
        if !(t.min_percent.is_finite() && t.max_percent.is_finite() && t.power.is_finite()) {
            return Err(invalid("threshold values must be finite"));
        }
        if t.min_percent < 0.0 || t.max_percent > 100.0 || t.min_percent > t.max_percent {
            return Err(invalid(format!(
                "threshold range must satisfy 0 <= min <= max <= 100 (got {}..{})",
                t.min_percent, t.max_percent
            )));
        }
        if t.power <= 0.0 {
            return Err(invalid("threshold power must be positive"));
        }
        if self.overlap.max_iterations == 0 {
            return Err(invalid("overlap.maxIterations must be at least 1"));
        }
        if self.timing.batch_timeout_ms == 0 {
            return Err(invalid("timing.batchTimeoutMs must be non-zero"));
        }
        let non_negative = [
            ("drift.tolerance", self.drift.tolerance),
            ("overlap.spacing", self.overlap.spacing),
            ("overlap.compoundSpacing", self.overlap.compound_spacing),
            ("compaction.minSpacing", self.compaction.min_spacing),
            ("compaction.maxShift", self.compaction.max_shift),
            ("compaction.clusterTolerance", self.compaction.cluster_tolerance),
            ("compaction.padding", self.compaction.padding),
            ("compaction.gridGap", self.compaction.grid_gap),
            ("placement.gap", self.placement.gap),
            ("placement.padding", self.placement.padding),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(invalid(format!("{name} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdConfig {
    /// Coverage (percent of viewport) needed by the smallest nodes.
    pub min_percent: f64,
    /// Coverage (percent of viewport) needed by the largest nodes.
    pub max_percent: f64,
    /// Exponent applied to the log-normalized area.
    pub power: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_percent: 2.0,
            max_percent: 20.0,
            power: 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingConfig {
    /// Quiet period after the last pan/zoom before a propagation pass runs.
    pub debounce_ms: u64,
    /// Delay between the first layout completing and the first visibility pass.
    pub settle_delay_ms: u64,
    /// Delay between applying a mutation batch and finalizing it.
    pub batch_settle_ms: u64,
    /// Hard ceiling after which an unfinished batch is forcibly finalized.
    pub batch_timeout_ms: u64,
    /// Minimum interval between dimension consistency checks on render ticks.
    pub dimension_check_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            settle_delay_ms: 300,
            batch_settle_ms: 50,
            batch_timeout_ms: 10_000,
            dimension_check_interval_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn batch_settle(&self) -> Duration {
        Duration::from_millis(self.batch_settle_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn dimension_check_interval(&self) -> Duration {
        Duration::from_millis(self.dimension_check_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriftConfig {
    /// Largest unexplained move (graph units) tolerated before a position is reverted.
    pub tolerance: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { tolerance: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlapConfig {
    pub spacing: f64,
    /// Added to `spacing` when either node of a pair is a container.
    pub compound_spacing: f64,
    pub max_iterations: usize,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            spacing: 20.0,
            compound_spacing: 20.0,
            max_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactionConfig {
    /// Gaps up to this size are left alone.
    pub min_spacing: f64,
    /// Cap on how far a single row or column may move in one pass.
    pub max_shift: f64,
    /// Centres closer than this along an axis belong to the same row/column.
    pub cluster_tolerance: f64,
    /// Inset of the child grid inside its container.
    pub padding: f64,
    pub grid_gap: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            min_spacing: 20.0,
            max_shift: 50.0,
            cluster_tolerance: 40.0,
            padding: 20.0,
            grid_gap: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlacementConfig {
    pub gap: f64,
    pub padding: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            gap: 20.0,
            padding: 20.0,
        }
    }
}
