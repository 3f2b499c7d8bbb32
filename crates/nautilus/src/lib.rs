#![forbid(unsafe_code)]

//! Semantic-zoom visibility engine and compound-graph layout stabilizer.
//!
//! `nautilus` decides which nodes and edges of a large nested graph are visible for the current
//! viewport, and keeps the nested layout stable while visibility changes: container sizes are
//! locked, unexplained moves are reverted, overlaps are pushed apart and excess whitespace is
//! compacted once per settle. The rendering backend is reached only through
//! [`GeometryAdapter`]; `nautilus_graph::SceneGraph` implements it.

pub mod adapter;
pub mod compact;
pub mod config;
pub mod coverage;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod overlap;
pub mod position;
pub mod schedule;
pub mod sequencer;
pub mod stats;
pub mod threshold;
pub mod visibility;

pub use nautilus_graph::geom;

pub use adapter::GeometryAdapter;
pub use config::EngineConfig;
pub use engine::{Engine, TickReport};
pub use error::{Error, Result};
pub use hierarchy::{Healing, Hierarchy};
pub use sequencer::{BatchId, BatchReport};
pub use stats::NodeSizeStatistics;
pub use threshold::AdaptiveThreshold;
pub use visibility::{EdgeReport, PropagationReport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
