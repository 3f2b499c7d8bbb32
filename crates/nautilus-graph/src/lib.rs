#![forbid(unsafe_code)]

//! Retained compound scene graph used by `nautilus`.
//!
//! The container stores nodes (leaves and nested containers), edges, per-element style and the
//! current viewport, answers geometry queries and exposes changes as polled events. It knows
//! nothing about semantic zoom; `nautilus` drives it through its `GeometryAdapter` trait.

pub mod error;
pub mod geom;
pub mod graph;
pub mod viewport;

pub use error::{Error, Result};
pub use graph::{
    EdgeSpec, Lookup, NodeKind, NodeSpec, Removal, SceneEvent, SceneGraph, SceneOptions, Style,
    StylePatch,
};
pub use viewport::Viewport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
