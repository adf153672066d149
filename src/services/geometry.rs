//! Staging-area geometry
//!
//! Pure coordinate math used by the door tracker and pallet classifier. The
//! staging area is a quadrilateral with two local frames: the door axis
//! (corner0 -> corner1) and the side axis (corner1 -> corner2). A point's local
//! y in either frame is its signed perpendicular distance from that edge.

use crate::domain::types::{BoundingBox, Point};
use anyhow::{bail, Result};

/// Tolerance for on-edge tests, in pixels
const EDGE_EPSILON: f64 = 1e-9;

/// Euclidean distance between two points
#[inline]
pub fn distance(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Perpendicular distance from `point` to the infinite line through `a` and `b`
pub fn distance_to_line(point: Point, a: Point, b: Point) -> f64 {
    let len = distance(a, b);
    if len <= EDGE_EPSILON {
        return distance(point, a);
    }
    ((b.y - a.y) * point.x - (b.x - a.x) * point.y + b.x * a.y - b.y * a.x).abs() / len
}

/// Express `point` in the frame whose origin is `origin` and whose x-axis
/// points toward `axis_point`. The y-axis is the x-axis rotated 90 degrees
/// counter-clockwise. Callers guarantee `origin != axis_point`.
pub fn project_to_frame(point: Point, origin: Point, axis_point: Point) -> Point {
    let dx = axis_point.x - origin.x;
    let dy = axis_point.y - origin.y;
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = (dx / len, dy / len);
    let (vx, vy) = (-uy, ux);

    let tx = point.x - origin.x;
    let ty = point.y - origin.y;
    Point::new(tx * ux + ty * uy, tx * vx + ty * vy)
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EDGE_EPSILON * distance(a, b).max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

/// Even-odd ray casting over the ordered vertex list.
///
/// Points lying on an edge count as inside.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    if (0..n).any(|i| on_segment(point, polygon[i], polygon[(i + 1) % n])) {
        return true;
    }

    let (x, y) = (point.x, point.y);
    let mut inside = false;
    let mut p1 = polygon[0];
    for i in 1..=n {
        let p2 = polygon[i % n];
        if y > p1.y.min(p2.y) && y <= p1.y.max(p2.y) && x <= p1.x.max(p2.x) {
            let crosses = if p1.x == p2.x {
                true
            } else {
                // p1.y != p2.y here: y lies strictly above the lower endpoint
                let x_int = (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
                x <= x_int
            };
            if crosses {
                inside = !inside;
            }
        }
        p1 = p2;
    }
    inside
}

/// Validated staging quadrilateral
///
/// corner0/corner1 lie on the door-side line, corner3/corner2 on the
/// in/out-side line, both pairs ordered left to right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagingArea {
    corners: [Point; 4],
}

impl StagingArea {
    pub fn new(corners: [Point; 4]) -> Result<Self> {
        let [c0, c1, c2, c3] = corners;
        if c0.x > c1.x {
            bail!("staging corner0.x ({}) must not exceed corner1.x ({})", c0.x, c1.x);
        }
        if c3.x > c2.x {
            bail!("staging corner3.x ({}) must not exceed corner2.x ({})", c3.x, c2.x);
        }
        if distance(c0, c1) <= EDGE_EPSILON {
            bail!("staging door axis is degenerate (corner0 == corner1)");
        }
        if distance(c1, c2) <= EDGE_EPSILON {
            bail!("staging side axis is degenerate (corner1 == corner2)");
        }
        Ok(Self { corners })
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        point_in_polygon(point, &self.corners)
    }

    /// Local frame of the door-side edge
    #[inline]
    pub fn door_axis(&self, point: Point) -> Point {
        project_to_frame(point, self.corners[0], self.corners[1])
    }

    /// Local frame of the rack-side edge
    #[inline]
    pub fn side_axis(&self, point: Point) -> Point {
        project_to_frame(point, self.corners[1], self.corners[2])
    }

    /// Door-axis projection of a box center
    pub fn door_axis_of(&self, bbox: &BoundingBox) -> Point {
        self.door_axis(bbox.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn dock_corners() -> [Point; 4] {
        [
            Point::new(160.0, 240.0),
            Point::new(344.0, 110.0),
            Point::new(580.0, 260.0),
            Point::new(458.0, 638.0),
        ]
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn test_projection_is_deterministic() {
        let c = dock_corners();
        let p = Point::new(260.0, 150.0);
        let a = project_to_frame(p, c[0], c[1]);
        let b = project_to_frame(p, c[0], c[1]);
        assert_eq!(a, b);
        assert!(approx(a.y, -15.8), "door-axis y was {}", a.y);
    }

    #[test]
    fn test_projection_along_axis() {
        let origin = Point::new(0.0, 0.0);
        let axis = Point::new(10.0, 0.0);
        assert_eq!(project_to_frame(Point::new(3.0, 4.0), origin, axis), Point::new(3.0, 4.0));

        let axis_up = Point::new(0.0, 10.0);
        let p = project_to_frame(Point::new(3.0, 4.0), origin, axis_up);
        assert!(approx(p.x, 4.0) && approx(p.y, -3.0));
    }

    #[test]
    fn test_point_in_polygon() {
        let c = dock_corners();
        assert!(point_in_polygon(Point::new(300.0, 300.0), &c));
        assert!(point_in_polygon(Point::new(520.0, 430.0), &c));
        assert!(!point_in_polygon(Point::new(600.0, 400.0), &c));
        assert!(!point_in_polygon(Point::new(260.0, 100.0), &c));
        assert!(!point_in_polygon(Point::new(0.0, 0.0), &c));
    }

    #[test]
    fn test_edge_point_counts_as_inside() {
        let c = dock_corners();
        // lies exactly on corner0 -> corner1
        assert!(point_in_polygon(Point::new(252.0, 175.0), &c));
        assert!(point_in_polygon(c[2], &c));
    }

    #[test]
    fn test_distance_to_line() {
        let d = distance_to_line(Point::new(5.0, 5.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(approx(d, 5.0));
        assert!(approx(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0));
    }

    #[test]
    fn test_staging_area_validation() {
        assert!(StagingArea::new(dock_corners()).is_ok());

        let mut swapped = dock_corners();
        swapped.swap(0, 1);
        assert!(StagingArea::new(swapped).is_err());

        let mut degenerate = dock_corners();
        degenerate[1] = degenerate[0];
        assert!(StagingArea::new(degenerate).is_err());
    }

    #[test]
    fn test_side_axis_partition() {
        let area = StagingArea::new(dock_corners()).unwrap();
        let rack = Point::new(600.0, 400.0);
        let yd = area.door_axis(rack).y;
        let yr = area.side_axis(rack).y;
        assert!(yr.abs() <= yd.abs());

        let door = Point::new(260.0, 150.0);
        assert!(area.side_axis(door).y.abs() > area.door_axis(door).y.abs());
    }
}
