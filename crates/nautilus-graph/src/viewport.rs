//! Pan/zoom viewport and the screen <-> graph transforms.
//!
//! Screen coordinates follow the usual retained-graph convention:
//! `screen = graph * zoom + pan`.

use crate::geom::{Box2D, Point, Vector, point, vector};

/// Smallest zoom accepted; a zero or negative zoom would make the inverse transform undefined.
pub const MIN_ZOOM: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    /// Screen-space translation in pixels.
    pub pan: Vector,
    pub zoom: f64,
    /// Pixel width of the drawing surface.
    pub width: f64,
    /// Pixel height of the drawing surface.
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: vector(0.0, 0.0),
            zoom: 1.0,
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_pan(mut self, x: f64, y: f64) -> Self {
        self.pan = vector(x, y);
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    fn effective_zoom(&self) -> f64 {
        if self.zoom.is_finite() && self.zoom > MIN_ZOOM {
            self.zoom
        } else {
            MIN_ZOOM
        }
    }

    pub fn to_graph(&self, screen: Point) -> Point {
        let z = self.effective_zoom();
        point((screen.x - self.pan.x) / z, (screen.y - self.pan.y) / z)
    }

    pub fn to_screen(&self, graph: Point) -> Point {
        let z = self.effective_zoom();
        point(graph.x * z + self.pan.x, graph.y * z + self.pan.y)
    }

    /// The pixel rectangle mapped back into graph coordinates.
    pub fn graph_rect(&self) -> Box2D {
        Box2D::new(
            self.to_graph(point(0.0, 0.0)),
            self.to_graph(point(self.width.max(0.0), self.height.max(0.0))),
        )
    }

    pub fn graph_center(&self) -> Point {
        self.to_graph(point(self.width / 2.0, self.height / 2.0))
    }

    pub fn graph_area(&self) -> f64 {
        let r = self.graph_rect();
        (r.max.x - r.min.x) * (r.max.y - r.min.y)
    }

    /// Centre the viewport on `graph` without changing zoom.
    pub fn center_on(&mut self, graph: Point) {
        let z = self.effective_zoom();
        self.pan = vector(
            self.width / 2.0 - graph.x * z,
            self.height / 2.0 - graph.y * z,
        );
    }
}
