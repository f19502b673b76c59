//! Planar geometry for the layout solver
//!
//! Coordinates are canvas dots. The two-circle intersection is the only
//! non-trivial primitive; everything else is plain 2-D arithmetic.

use serde::{Deserialize, Serialize};

/// Tolerance below which a squared half-chord counts as zero (tangency).
const EPS: f64 = 1e-9;

/// A point on the canvas, in dots.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Outcome of intersecting two circles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intersection {
    /// Disjoint, contained, or concentric circles
    None,
    /// Externally or internally tangent
    One(Point),
    /// The general crossing case
    Two(Point, Point),
}

impl Intersection {
    /// The first intersection point, if any.
    pub fn first(&self) -> Option<Point> {
        match *self {
            Intersection::None => None,
            Intersection::One(p) => Some(p),
            Intersection::Two(p, _) => Some(p),
        }
    }
}

/// Intersect the circles `(c1, r1)` and `(c2, r2)`.
///
/// Concentric circles yield [`Intersection::None`] even when the radii are
/// equal (infinitely many points is useless to the solver). With
/// `compensate` set, a circle contained in the other (`d < |r1 - r2|`) has
/// its smaller radius grown to internal tangency before solving, so the
/// call yields exactly one point instead of none.
pub fn circle_intersection(
    c1: Point,
    mut r1: f64,
    c2: Point,
    mut r2: f64,
    compensate: bool,
) -> Intersection {
    let d = distance(c1, c2);
    if d == 0.0 {
        return Intersection::None;
    }

    if compensate && d < (r1 - r2).abs() {
        if r1 < r2 {
            r1 += r2 - r1 - d;
        } else {
            r2 += r1 - r2 - d;
        }
    }

    if d < (r1 - r2).abs() || d > r1 + r2 {
        return Intersection::None;
    }

    // Radical-line solution: `a` is the distance from c1 to the chord
    // midpoint, `h` the half-chord length.
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h2 = r1 * r1 - a * a;
    let mx = c1.x + a * (c2.x - c1.x) / d;
    let my = c1.y + a * (c2.y - c1.y) / d;

    if h2 <= EPS {
        return Intersection::One(Point::new(mx, my));
    }

    let h = h2.sqrt();
    let p1 = Point::new(mx + h * (c2.y - c1.y) / d, my - h * (c2.x - c1.x) / d);
    let p2 = Point::new(mx - h * (c2.y - c1.y) / d, my + h * (c2.x - c1.x) / d);
    Intersection::Two(p1, p2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
        assert_eq!(distance(Point::new(1.0, 1.0), Point::new(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_two_point_crossing() {
        // Equal circles at (0,0) and (100,0) with radius 60 cross at
        // (50, +-sqrt(60^2 - 50^2)) = (50, +-33.166...)
        let res = circle_intersection(
            Point::new(0.0, 0.0),
            60.0,
            Point::new(100.0, 0.0),
            60.0,
            false,
        );
        match res {
            Intersection::Two(p1, p2) => {
                let h = (1100.0f64).sqrt();
                assert!((p1.x - 50.0).abs() < 1e-9);
                assert!((p2.x - 50.0).abs() < 1e-9);
                assert!((p1.y.abs() - h).abs() < 1e-9);
                assert!((p2.y.abs() - h).abs() < 1e-9);
                assert!((p1.y + p2.y).abs() < 1e-9); // symmetric about the axis
            }
            other => panic!("expected two points, got {:?}", other),
        }
    }

    #[test]
    fn test_disjoint_and_contained() {
        let c1 = Point::new(0.0, 0.0);
        let c2 = Point::new(100.0, 0.0);
        assert_eq!(circle_intersection(c1, 10.0, c2, 10.0, false), Intersection::None);

        // Contained: center distance 2, radii 10 and 5
        let c3 = Point::new(2.0, 0.0);
        assert_eq!(circle_intersection(c1, 10.0, c3, 5.0, false), Intersection::None);
    }

    #[test]
    fn test_concentric_equal_radii() {
        let c = Point::new(5.0, 5.0);
        assert_eq!(circle_intersection(c, 7.0, c, 7.0, false), Intersection::None);
    }

    #[test]
    fn test_external_tangency() {
        let res = circle_intersection(
            Point::new(0.0, 0.0),
            4.0,
            Point::new(10.0, 0.0),
            6.0,
            false,
        );
        assert_eq!(res, Intersection::One(Point::new(4.0, 0.0)));
    }

    #[test]
    fn test_compensated_containment() {
        let c1 = Point::new(0.0, 0.0);
        let c2 = Point::new(2.0, 0.0);
        // Without compensation the contained case yields nothing
        assert_eq!(circle_intersection(c1, 10.0, c2, 5.0, false), Intersection::None);
        // With compensation the small radius grows to internal tangency:
        // r2 = 10 - 2 = 8, tangent at (10, 0)
        match circle_intersection(c1, 10.0, c2, 5.0, true) {
            Intersection::One(p) => {
                assert!((p.x - 10.0).abs() < 1e-9);
                assert!(p.y.abs() < 1e-9);
            }
            other => panic!("expected one point, got {:?}", other),
        }
    }
}
