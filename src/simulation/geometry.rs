//! Geometry used by the radio model.
//!
//! Contains helpers for:
//! - Euclidean distance between motes
//! - Obstacle shapes that block the line of sight
//! - Segment-shape intersection tests (rectangles, circles)
//!
//! All tests work in the x/y plane; the z coordinate only contributes to
//! distance.

use serde::Deserialize;

use super::types::Position;

/// Axis-aligned rectangle given by two opposite corners.
#[derive(Debug, Clone, Deserialize)]
pub struct Rect {
    #[serde(rename = "top-left-position")]
    pub top_left: Position,
    #[serde(rename = "bottom-right-position")]
    pub bottom_right: Position,
}

/// Circle given by center and radius.
#[derive(Debug, Clone, Deserialize)]
pub struct Circle {
    #[serde(rename = "center_position")]
    pub center: Position,
    pub radius: f64,
}

/// Obstacle blocking radio propagation between two motes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Obstacle {
    Rectangle {
        #[serde(flatten)]
        shape: Rect,
    },
    Circle {
        #[serde(flatten)]
        shape: Circle,
    },
}

/// Euclidean distance between two positions.
pub fn distance(a: &Position, b: &Position) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Check if the straight line between two motes crosses any obstacle.
///
/// A mote standing inside an obstacle is blocked from everybody, including
/// the degenerate case of two motes at the same spot.
pub fn is_line_of_sight_blocked(from: &Position, to: &Position, obstacles: &[Obstacle]) -> bool {
    obstacles.iter().any(|obstacle| match obstacle {
        Obstacle::Rectangle { shape } => segment_intersects_rect(from, to, shape),
        Obstacle::Circle { shape } => segment_intersects_circle(from, to, shape),
    })
}

/// Normalize rectangle corners to (left, right, top, bottom).
fn rect_bounds(rect: &Rect) -> (f64, f64, f64, f64) {
    let left = rect.top_left.x.min(rect.bottom_right.x);
    let right = rect.top_left.x.max(rect.bottom_right.x);
    let top = rect.top_left.y.min(rect.bottom_right.y);
    let bottom = rect.top_left.y.max(rect.bottom_right.y);
    (left, right, top, bottom)
}

/// Inclusive point-in-rectangle test.
pub fn point_in_rect(p: &Position, rect: &Rect) -> bool {
    let (left, right, top, bottom) = rect_bounds(rect);
    p.x >= left && p.x <= right && p.y >= top && p.y <= bottom
}

fn segment_intersects_rect(p1: &Position, p2: &Position, rect: &Rect) -> bool {
    if point_in_rect(p1, rect) || point_in_rect(p2, rect) {
        return true;
    }

    let (left, right, top, bottom) = rect_bounds(rect);
    let corners = [
        Position::new(left, top),
        Position::new(right, top),
        Position::new(right, bottom),
        Position::new(left, bottom),
    ];
    (0..4).any(|i| segments_intersect(p1, p2, &corners[i], &corners[(i + 1) % 4]))
}

/// Distance from the circle center to the segment, compared to the radius.
fn segment_intersects_circle(p1: &Position, p2: &Position, circle: &Circle) -> bool {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((circle.center.x - p1.x) * dx + (circle.center.y - p1.y) * dy) / len2).clamp(0.0, 1.0)
    };
    let cx = p1.x + t * dx - circle.center.x;
    let cy = p1.y + t * dy - circle.center.y;
    cx * cx + cy * cy <= circle.radius * circle.radius
}

/// Orientation of the ordered triplet: 1 clockwise, -1 counter-clockwise, 0 collinear.
fn orientation(a: &Position, b: &Position, c: &Position) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if `b` lies within the bounding box of `a`–`c` (collinearity assumed).
fn on_segment(a: &Position, b: &Position, c: &Position) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Segment-segment intersection including endpoint touching and collinear overlap.
pub fn segments_intersect(p1: &Position, q1: &Position, p2: &Position, q2: &Position) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn distance_includes_height() {
        let a = Position { x: 0.0, y: 0.0, z: 0.0 };
        let b = Position { x: 3.0, y: 4.0, z: 12.0 };
        assert!((distance(&a, &b) - 13.0).abs() < 1e-12);
    }

    #[test]
    fn wall_blocks_line_of_sight() {
        let wall = vec![Obstacle::Rectangle {
            shape: Rect {
                top_left: p(4.0, -10.0),
                bottom_right: p(6.0, 10.0),
            },
        }];
        assert!(is_line_of_sight_blocked(&p(0.0, 0.0), &p(10.0, 0.0), &wall));
        assert!(!is_line_of_sight_blocked(&p(0.0, 20.0), &p(10.0, 20.0), &wall));
    }

    #[test]
    fn circle_blocks_only_when_segment_comes_close() {
        let pillar = vec![Obstacle::Circle {
            shape: Circle {
                center: p(5.0, 0.0),
                radius: 1.0,
            },
        }];
        assert!(is_line_of_sight_blocked(&p(0.0, 0.0), &p(10.0, 0.0), &pillar));
        assert!(!is_line_of_sight_blocked(&p(0.0, 2.0), &p(10.0, 2.0), &pillar));
        // Segment ends before reaching the pillar.
        assert!(!is_line_of_sight_blocked(&p(0.0, 0.0), &p(3.0, 0.0), &pillar));
    }

    #[test]
    fn segments_intersect_basic_cases() {
        assert!(segments_intersect(&p(0.0, 0.0), &p(10.0, 10.0), &p(0.0, 10.0), &p(10.0, 0.0)));
        // Collinear overlap
        assert!(segments_intersect(&p(0.0, 0.0), &p(10.0, 0.0), &p(5.0, 0.0), &p(15.0, 0.0)));
        // Disjoint
        assert!(!segments_intersect(&p(0.0, 0.0), &p(1.0, 1.0), &p(2.0, 2.0), &p(3.0, 3.0)));
    }

    #[test]
    fn obstacles_deserialize_from_scene_json() {
        let json = r#"[
            {"type": "rectangle", "top-left-position": {"x": 1, "y": 2}, "bottom-right-position": {"x": 3, "y": 4}},
            {"type": "circle", "center_position": {"x": 5, "y": 5}, "radius": 2.5}
        ]"#;
        let obstacles: Vec<Obstacle> = serde_json::from_str(json).unwrap();
        assert_eq!(obstacles.len(), 2);
        assert!(matches!(obstacles[1], Obstacle::Circle { ref shape } if shape.radius == 2.5));
    }
}
