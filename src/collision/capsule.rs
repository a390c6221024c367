use cgmath::Vector3;

use crate::collision::aabb::Aabb;

/// A segment with a radius. The walking player's body: `start` is the foot sphere's
/// center, `end` the head sphere's center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub start: Vector3<f32>,
    pub end: Vector3<f32>,
    pub radius: f32,
}

impl Capsule {
    pub fn new(start: Vector3<f32>, end: Vector3<f32>, radius: f32) -> Self {
        Self { start, end, radius }
    }

    pub fn translate(&mut self, v: Vector3<f32>) {
        self.start += v;
        self.end += v;
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.start + self.end) * 0.5
    }

    pub fn aabb(&self) -> Aabb {
        let r = Vector3::new(self.radius, self.radius, self.radius);
        let mut aabb = Aabb::new(self.start - r, self.start + r);
        aabb.expand(self.end - r);
        aabb.expand(self.end + r);
        aabb
    }

    /// Cheap conservative overlap test against a box.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        (0..3).all(|axis| {
            let lo = self.start[axis].min(self.end[axis]) - self.radius;
            let hi = self.start[axis].max(self.end[axis]) + self.radius;
            lo < aabb.max[axis] && hi > aabb.min[axis]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_moves_both_ends() {
        let mut capsule = Capsule::new(
            Vector3::new(0.0, 0.5, 0.0),
            Vector3::new(0.0, 1.5, 0.0),
            0.35,
        );
        capsule.translate(Vector3::new(1.0, 0.0, -2.0));
        assert_eq!(capsule.start, Vector3::new(1.0, 0.5, -2.0));
        assert_eq!(capsule.end, Vector3::new(1.0, 1.5, -2.0));
        assert_eq!(capsule.center(), Vector3::new(1.0, 1.0, -2.0));
    }

    #[test]
    fn box_overlap_accounts_for_radius() {
        let capsule = Capsule::new(
            Vector3::new(0.0, 0.5, 0.0),
            Vector3::new(0.0, 1.5, 0.0),
            0.5,
        );
        let floor = Aabb::new(Vector3::new(-1.0, -0.1, -1.0), Vector3::new(1.0, 0.1, 1.0));
        assert!(capsule.intersects_aabb(&floor));
        let far = Aabb::new(Vector3::new(2.0, 0.0, 2.0), Vector3::new(3.0, 1.0, 3.0));
        assert!(!capsule.intersects_aabb(&far));
        assert!(capsule.aabb().intersects(&floor));
    }
}
