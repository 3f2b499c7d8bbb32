//! Graph-space geometry primitives.
//!
//! Box operations (union, intersection, inflation, overlap tests) are the `euclid::Box2D`
//! methods; only constructors live here.

pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Vector = euclid::Vector2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
pub type Box2D = euclid::Box2D<f64, Unit>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn vector(x: f64, y: f64) -> Vector {
    euclid::vec2(x, y)
}

pub fn size(width: f64, height: f64) -> Size {
    euclid::size2(width, height)
}

/// Axis-aligned box of `size` centred on `center`.
pub fn centered_box(center: Point, size: Size) -> Box2D {
    let half = vector(size.width / 2.0, size.height / 2.0);
    Box2D::new(center - half, center + half)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_boxes_is_none() {
        let a = centered_box(point(0.0, 0.0), size(10.0, 10.0));
        let b = centered_box(point(20.0, 0.0), size(10.0, 10.0));
        assert!(a.intersection(&b).is_none());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = centered_box(point(0.0, 0.0), size(10.0, 10.0));
        let b = centered_box(point(10.0, 0.0), size(10.0, 10.0));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn intersection_area_matches_overlap() {
        let a = centered_box(point(0.0, 0.0), size(10.0, 10.0));
        let b = centered_box(point(5.0, 5.0), size(10.0, 10.0));
        let i = a.intersection(&b).unwrap();
        assert_eq!(i.area(), 25.0);
        assert_eq!(i.center(), point(2.5, 2.5));
    }
}
