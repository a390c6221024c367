use cgmath::{InnerSpace, Matrix4, Transform, Vector3};

use crate::collision::Triangle;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box around `points`, `None` if there are none.
    pub fn from_points(points: impl IntoIterator<Item = Vector3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::new(first, first);
        points.for_each(|p| aabb.expand(p));
        Some(aabb)
    }

    pub fn expand(&mut self, p: Vector3<f32>) {
        self.min = Vector3::new(
            self.min.x.min(p.x),
            self.min.y.min(p.y),
            self.min.z.min(p.z),
        );
        self.max = Vector3::new(
            self.max.x.max(p.x),
            self.max.y.max(p.y),
            self.max.z.max(p.z),
        );
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.expand(other.min);
        out.expand(other.max);
        out
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: Vector3<f32>) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }

    /// Box around the eight transformed corners.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Aabb {
        let corners = (0..8).map(|i| {
            let corner = Vector3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            matrix.transform_vector(corner) + matrix.w.truncate()
        });
        // eight corners, never empty
        Self::from_points(corners).unwrap_or(*self)
    }

    /// Separating axis test between the box and a triangle.
    pub fn intersects_triangle(&self, triangle: &Triangle) -> bool {
        let center = self.center();
        let extents = self.size() * 0.5;
        let v0 = triangle.a - center;
        let v1 = triangle.b - center;
        let v2 = triangle.c - center;
        let f0 = v1 - v0;
        let f1 = v2 - v1;
        let f2 = v0 - v2;

        let separated = |axis: Vector3<f32>| {
            if axis.magnitude2() < 1e-12 {
                return false;
            }
            let p0 = v0.dot(axis);
            let p1 = v1.dot(axis);
            let p2 = v2.dot(axis);
            let r = extents.x * axis.x.abs() + extents.y * axis.y.abs() + extents.z * axis.z.abs();
            p0.min(p1).min(p2) > r || p0.max(p1).max(p2) < -r
        };

        let box_axes = [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()];
        for u in box_axes {
            for f in [f0, f1, f2] {
                if separated(u.cross(f)) {
                    return false;
                }
            }
        }
        if box_axes.into_iter().any(separated) {
            return false;
        }
        !separated(f0.cross(f1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn triangle_crossing_the_box_intersects() {
        let t = Triangle::new(
            Vector3::new(-1.0, 0.5, -1.0),
            Vector3::new(-1.0, 0.5, 3.0),
            Vector3::new(3.0, 0.5, -1.0),
        );
        assert!(unit().intersects_triangle(&t));
    }

    #[test]
    fn triangle_near_a_corner_does_not() {
        // its bounding box overlaps the unit box, the triangle itself does not
        let t = Triangle::new(
            Vector3::new(0.8, 2.0, 0.5),
            Vector3::new(2.0, 0.8, 0.5),
            Vector3::new(2.0, 2.0, 0.5),
        );
        assert!(!unit().intersects_triangle(&t));
    }

    #[test]
    fn transform_covers_rotated_corners() {
        let m = Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0))
            * Matrix4::from_angle_y(cgmath::Deg(45.0));
        let moved = unit().transform(&m);
        assert!(moved.contains_point(Vector3::new(10.0, 0.5, 0.0)));
        assert!(moved.size().x > 1.0);
    }
}
