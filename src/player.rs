//! First person walking.
//!
//! The player is a vertical capsule. Held movement keys accelerate it along the
//! camera's heading projected onto the floor, velocity decays exponentially, and
//! after each move the capsule is pushed out of whatever static geometry it ended
//! up in. The camera eye rides on the capsule's upper sphere.

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};

use crate::{
    collision::{capsule::Capsule, octree::Octree},
    input::MovementKeys,
    options::PlayerOptions,
};

/// Fraction of the velocity kept per second is `exp(-DAMPING)`.
const DAMPING: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct Player {
    options: PlayerOptions,
    collider: Capsule,
    velocity: Vector3<f32>,
    keys: MovementKeys,
    /// Set once a movement key is held, cleared by the next pointer press.
    moving: bool,
    // last usable horizontal heading, for when the camera looks straight up or down
    forward: Vector3<f32>,
}

impl Player {
    /// A player whose eye is at `eye`.
    pub fn new(eye: Point3<f32>, options: PlayerOptions) -> Self {
        let end = eye.to_vec();
        let start = end - Vector3::unit_y() * options.height;
        Self {
            collider: Capsule::new(start, end, options.radius),
            options,
            velocity: Vector3::zero(),
            keys: MovementKeys::empty(),
            moving: false,
            forward: -Vector3::unit_z(),
        }
    }

    pub fn eye(&self) -> Point3<f32> {
        Point3::from_vec(self.collider.end)
    }

    pub fn collider(&self) -> &Capsule {
        &self.collider
    }

    pub fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vector3<f32>) {
        self.velocity = velocity;
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn set_key(&mut self, keys: MovementKeys, pressed: bool) {
        self.keys.set(keys, pressed);
    }

    pub fn release_all(&mut self) {
        self.keys = MovementKeys::empty();
    }

    /// A new pointer gesture stops the position updates until a key is held again.
    pub fn pointer_down(&mut self) {
        self.moving = false;
    }

    /// Put the eye at `eye`, at rest.
    pub fn teleport(&mut self, eye: Point3<f32>) {
        let offset = eye.to_vec() - self.collider.end;
        self.collider.translate(offset);
        self.velocity = Vector3::zero();
    }

    /// Horizontal forward and side (right hand) unit vectors for a camera looking
    /// along `direction`.
    pub fn basis(&mut self, direction: Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
        let flat = Vector3::new(direction.x, 0.0, direction.z);
        if flat.magnitude2() > 1e-8 {
            self.forward = flat.normalize();
        }
        let side = self.forward.cross(Vector3::unit_y()).normalize();
        (self.forward, side)
    }

    /// Advance by `dt` seconds and return the new eye position.
    pub fn update(&mut self, dt: f32, view_direction: Vector3<f32>, world: &Octree) -> Point3<f32> {
        let (forward, side) = self.basis(view_direction);
        let accel = self.options.speed * dt;
        if self.keys.contains(MovementKeys::FORWARD) {
            self.velocity += forward * accel;
        }
        if self.keys.contains(MovementKeys::BACKWARD) {
            self.velocity -= forward * accel;
        }
        if self.keys.contains(MovementKeys::LEFT) {
            self.velocity -= side * accel;
        }
        if self.keys.contains(MovementKeys::RIGHT) {
            self.velocity += side * accel;
        }
        if !self.keys.is_empty() {
            self.moving = true;
        }

        let damping = (-DAMPING * dt).exp() - 1.0;
        self.velocity += self.velocity * damping;

        let settling = self.options.settle_residual_velocity
            && self.velocity.magnitude() >= self.options.rest_speed;
        if self.moving || settling {
            self.collider.translate(self.velocity * dt);
            self.collide(world);
        }
        if self.options.settle_residual_velocity
            && !self.moving
            && self.velocity.magnitude() < self.options.rest_speed
        {
            self.velocity = Vector3::zero();
        }
        self.eye()
    }

    fn collide(&mut self, world: &Octree) {
        if let Some(contact) = world.capsule_intersect(&self.collider) {
            let along = contact.normal.dot(self.velocity);
            self.velocity -= contact.normal * along;
            self.collider.translate(contact.normal * contact.depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Triangle;

    const DT: f32 = 1.0 / 60.0;

    fn floor() -> Octree {
        // facing up
        let (a, b, c, d) = (
            Vector3::new(-50.0, 0.0, -50.0),
            Vector3::new(-50.0, 0.0, 50.0),
            Vector3::new(50.0, 0.0, 50.0),
            Vector3::new(50.0, 0.0, -50.0),
        );
        Octree::from_triangles([Triangle::new(a, b, c), Triangle::new(a, c, d)])
    }

    fn player(settle: bool) -> Player {
        Player::new(
            Point3::new(10.0, 1.5, -10.0),
            PlayerOptions {
                settle_residual_velocity: settle,
                ..Default::default()
            },
        )
    }

    #[test]
    fn basis_is_horizontal_and_unit_for_any_pitch() {
        let mut player = player(true);
        for pitch in [-1.5f32, -0.7, 0.0, 0.4, 1.5] {
            for yaw in [0.0f32, 1.0, 2.5, -2.0] {
                let direction = Vector3::new(
                    pitch.cos() * yaw.sin(),
                    pitch.sin(),
                    pitch.cos() * yaw.cos(),
                );
                let (forward, side) = player.basis(direction);
                assert!(forward.y.abs() < 1e-6 && side.y.abs() < 1e-6);
                assert!((forward.magnitude() - 1.0).abs() < 1e-5);
                assert!((side.magnitude() - 1.0).abs() < 1e-5);
                assert!(forward.dot(side).abs() < 1e-5);
            }
        }
        // straight down keeps the previous heading
        let before = player.basis(Vector3::new(1.0, 0.0, 0.0)).0;
        assert_eq!(player.basis(-Vector3::unit_y()).0, before);
    }

    #[test]
    fn damping_slows_down_without_reversing() {
        let mut player = player(true);
        let world = Octree::new();
        let start = Vector3::new(3.0, 0.0, -4.0);
        player.set_velocity(start);
        let mut speed = start.magnitude();
        for _ in 0..300 {
            player.update(DT, -Vector3::unit_z(), &world);
            let v = player.velocity();
            assert!(v.magnitude() <= speed);
            assert!(v.dot(start) >= 0.0);
            speed = v.magnitude();
        }
        assert_eq!(player.velocity(), Vector3::zero());
    }

    #[test]
    fn held_key_walks_forward() {
        let mut player = player(true);
        let world = floor();
        let eye = player.eye();
        player.set_key(MovementKeys::FORWARD, true);
        for _ in 0..30 {
            player.update(DT, Vector3::new(0.0, -0.3, -1.0), &world);
        }
        assert!(player.is_moving());
        assert!(player.eye().z < eye.z - 0.5);
        assert!((player.eye().x - eye.x).abs() < 1e-4);
    }

    #[test]
    fn collision_leaves_no_penetration() {
        let mut player = player(true);
        let world = floor();
        player.set_key(MovementKeys::FORWARD, true);
        player.update(DT, -Vector3::unit_z(), &world);
        player.release_all();
        player.set_velocity(Vector3::new(0.0, -60.0, 0.0));
        player.update(DT, -Vector3::unit_z(), &world);

        let foot = player.collider().start.y - player.collider().radius;
        assert!(foot >= -1e-4, "foot sank to {foot}");
        // the downward part of the velocity was absorbed by the floor
        assert!(player.velocity().y > -1e-3);
    }

    #[test]
    fn residual_velocity_settles_when_enabled() {
        let mut player = player(true);
        let world = Octree::new();
        player.set_velocity(Vector3::new(1.0, 0.0, 0.0));
        let eye = player.eye();
        player.update(DT, -Vector3::unit_z(), &world);
        assert!(player.eye().x > eye.x);
    }

    #[test]
    fn residual_velocity_is_frozen_with_legacy_gating() {
        let mut player = player(false);
        let world = Octree::new();
        player.set_velocity(Vector3::new(1.0, 0.0, 0.0));
        player.pointer_down();
        let eye = player.eye();
        for _ in 0..10 {
            player.update(DT, -Vector3::unit_z(), &world);
        }
        assert_eq!(player.eye(), eye);
        assert!(player.velocity().x > 0.0);
    }

    #[test]
    fn teleport_moves_the_whole_capsule() {
        let mut player = player(true);
        player.set_velocity(Vector3::new(2.0, 0.0, 0.0));
        player.teleport(Point3::new(4.0, 1.5, 5.0));
        assert_eq!(player.eye(), Point3::new(4.0, 1.5, 5.0));
        assert_eq!(player.collider().start, Vector3::new(4.0, 0.5, 5.0));
        assert_eq!(player.velocity(), Vector3::zero());
    }
}
