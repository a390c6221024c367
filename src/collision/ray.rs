use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};

use crate::collision::{EPSILON, Triangle, aabb::Aabb};

/// A ray in 3D space, defined by an origin point and a direction vector.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>, // Should be normalized
}

impl Ray {
    /// Creates a new ray with the given origin and direction.
    /// The direction will be normalized automatically.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Transforms the ray by the given 4x4 transformation matrix.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Self {
        let origin = Point3::from_homogeneous(matrix * self.origin.to_homogeneous());
        let direction = (matrix * self.direction.extend(0.0)).truncate();
        Self::new(origin, direction)
    }

    /// Möller-Trumbore, hitting front and back faces alike.
    ///
    /// Returns the distance along the ray, or `None` for misses and hits behind the origin.
    pub fn intersect_triangle(&self, triangle: &Triangle) -> Option<f32> {
        let edge1 = triangle.b - triangle.a;
        let edge2 = triangle.c - triangle.a;

        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        // parallel to the triangle's plane
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = self.origin.to_vec() - triangle.a;
        let u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = inv_det * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * edge2.dot(q);
        (t > EPSILON).then_some(t)
    }

    /// Slab test. Returns the entry distance, 0 when the origin is inside the box.
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];
            let (lo, hi) = (aabb.min[axis], aabb.max[axis]);
            if dir.abs() < EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (mut t0, mut t1) = ((lo - origin) * inv, (hi - origin) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Triangle {
        // a wall at z = -5 facing the origin
        Triangle::new(
            Vector3::new(-1.0, -1.0, -5.0),
            Vector3::new(1.0, -1.0, -5.0),
            Vector3::new(0.0, 1.0, -5.0),
        )
    }

    #[test]
    fn new_normalizes_direction() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(3.0, 4.0, 0.0));
        assert!((ray.direction.magnitude() - 1.0).abs() < EPSILON);
        assert_eq!(ray.point_at(5.0), Point3::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn hits_front_and_back_faces() {
        let front = Ray::new(Point3::new(0.0, 0.0, 0.0), -Vector3::unit_z());
        assert!(
            (front.intersect_triangle(&wall()).unwrap() - 5.0).abs() < 1e-5
        );

        let back = Ray::new(Point3::new(0.0, 0.0, -10.0), Vector3::unit_z());
        assert!(
            (back.intersect_triangle(&wall()).unwrap() - 5.0).abs() < 1e-5
        );
    }

    #[test]
    fn ignores_triangles_behind_and_beside() {
        let away = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::unit_z());
        assert_eq!(away.intersect_triangle(&wall()), None);

        let beside = Ray::new(Point3::new(5.0, 0.0, 0.0), -Vector3::unit_z());
        assert_eq!(beside.intersect_triangle(&wall()), None);
    }

    #[test]
    fn transform_moves_origin_and_turns_direction() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::unit_x());
        let m = Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0)) * Matrix4::from_scale(3.0);
        let moved = ray.transform(&m);
        assert_eq!(moved.origin, Point3::new(0.0, 2.0, 0.0));
        assert!((moved.direction - Vector3::unit_x()).magnitude() < EPSILON);
    }

    #[test]
    fn box_entry_distance() {
        let aabb = Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let outside = Ray::new(Point3::new(-5.0, 0.0, 0.0), Vector3::unit_x());
        assert!(
            (outside.intersect_aabb(&aabb).unwrap() - 4.0).abs() < EPSILON
        );

        let inside = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        assert_eq!(inside.intersect_aabb(&aabb), Some(0.0));

        let miss = Ray::new(Point3::new(-5.0, 3.0, 0.0), Vector3::unit_x());
        assert_eq!(miss.intersect_aabb(&aabb), None);
    }
}
