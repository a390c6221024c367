//! Geometry queries used by picking and walking.
//!
//! - `ray`: rays, ray/triangle and ray/box tests
//! - `aabb`: axis-aligned bounding boxes
//! - `capsule`: the walking player's collider
//! - `octree`: spatial index over static triangles answering capsule and ray queries

pub mod aabb;
pub mod capsule;
pub mod octree;
pub mod ray;

use cgmath::{InnerSpace, Vector3};

pub(crate) const EPSILON: f32 = 1e-6;

/// A world-space triangle. Winding is counter-clockwise seen from the front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vector3<f32>,
    pub b: Vector3<f32>,
    pub c: Vector3<f32>,
}

impl Triangle {
    pub fn new(a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>) -> Self {
        Self { a, b, c }
    }

    pub fn points(&self) -> [Vector3<f32>; 3] {
        [self.a, self.b, self.c]
    }

    /// Unit normal of the front face, zero for degenerate triangles.
    pub fn normal(&self) -> Vector3<f32> {
        let n = (self.c - self.b).cross(self.a - self.b);
        if n.magnitude2() > 0.0 {
            n.normalize()
        } else {
            n
        }
    }

    /// Signed distance of `p` from the triangle's plane, positive on the front side.
    pub fn plane_distance(&self, p: Vector3<f32>) -> f32 {
        self.normal().dot(p - self.a)
    }

    /// Whether `p`, assumed to lie on the triangle's plane, is inside the triangle.
    pub fn contains_point(&self, p: Vector3<f32>) -> bool {
        let v0 = self.c - self.a;
        let v1 = self.b - self.a;
        let v2 = p - self.a;
        let dot00 = v0.dot(v0);
        let dot01 = v0.dot(v1);
        let dot02 = v0.dot(v2);
        let dot11 = v1.dot(v1);
        let dot12 = v1.dot(v2);
        let denom = dot00 * dot11 - dot01 * dot01;
        if denom == 0.0 {
            return false;
        }
        let inv = 1.0 / denom;
        let u = (dot11 * dot02 - dot01 * dot12) * inv;
        let v = (dot00 * dot12 - dot01 * dot02) * inv;
        u >= 0.0 && v >= 0.0 && u + v <= 1.0
    }
}

impl From<[Vector3<f32>; 3]> for Triangle {
    fn from(p: [Vector3<f32>; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Closest points between segments `p1..p2` and `q1..q2`.
pub fn segment_closest_points(
    p1: Vector3<f32>,
    p2: Vector3<f32>,
    q1: Vector3<f32>,
    q2: Vector3<f32>,
) -> (Vector3<f32>, Vector3<f32>) {
    let r = p2 - p1;
    let s = q2 - q1;
    let w = q1 - p1;
    let a = r.dot(s);
    let b = r.dot(r);
    let c = s.dot(s);
    let d = s.dot(w);
    let e = r.dot(w);

    let divisor = b * c - a * a;
    let (t1, t2) = if c == 0.0 {
        ((e / b).clamp(0.0, 1.0), 0.0)
    } else if divisor.abs() < 1e-10 {
        // parallel: take whichever end of p lands closer to the middle of q
        let d1 = -d / c;
        let d2 = (a - d) / c;
        if (d1 - 0.5).abs() < (d2 - 0.5).abs() {
            (0.0, d1)
        } else {
            (1.0, d2)
        }
    } else {
        let t1 = (d * a + e * c) / divisor;
        (t1, (t1 * a - d) / c)
    };
    let t1 = if t1.is_finite() { t1.clamp(0.0, 1.0) } else { 0.0 };
    let t2 = t2.clamp(0.0, 1.0);
    (p1 + r * t1, q1 + s * t2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccw_triangle_faces_up() {
        let floor = Triangle::new(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
        );
        assert!((floor.normal() - Vector3::unit_y()).magnitude() < EPSILON);
        assert!(
            (floor.plane_distance(Vector3::new(0.2, 2.0, 0.2)) - 2.0).abs() < EPSILON
        );
        assert!(floor.contains_point(Vector3::new(0.2, 0.0, 0.2)));
        assert!(!floor.contains_point(Vector3::new(0.8, 0.0, 0.8)));
    }

    #[test]
    fn crossing_segments_meet() {
        let (a, b) = segment_closest_points(
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, -1.0),
            Vector3::new(0.0, 1.0, 1.0),
        );
        assert!((a - Vector3::new(0.0, 0.0, 0.0)).magnitude() < EPSILON);
        assert!((b - Vector3::new(0.0, 1.0, 0.0)).magnitude() < EPSILON);
    }
}
