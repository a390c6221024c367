//! Look-around controller.
//!
//! The eye orbits a pivot on a sphere. Dragging changes the azimuth (theta) and
//! polar (phi) angles, the wheel changes the zoom, and [`OrbitControls::update`]
//! eases the current values towards the requested ones. With the radius at its
//! default of 1e-6 the eye practically sits on the pivot, so dragging turns the
//! head instead of circling an object.
//!
//! Spherical coordinates follow the y-up convention: theta is measured from +Z
//! towards +X, phi from +Y downwards.

use std::f32::consts::{PI, TAU};

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};

use crate::{camera::Camera, options::ControlOptions};

const POLAR_EPSILON: f32 = 1e-3;
/// Zoom steps per wheel notch.
const WHEEL_ZOOM_STEPS: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    theta: f32,
    phi: f32,
}

impl Spherical {
    /// Angles of the unit vector pointing from the pivot to the eye.
    fn from_offset(offset: Vector3<f32>) -> Self {
        let offset = offset.normalize();
        Self {
            theta: offset.x.atan2(offset.z),
            phi: offset.y.clamp(-1.0, 1.0).acos(),
        }
    }

    fn offset(&self) -> Vector3<f32> {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        Vector3::new(sin_phi * sin_theta, cos_phi, sin_phi * cos_theta)
    }
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    /// Ignore drags and wheel input while false (e.g. while a gizmo is dragged).
    pub enabled: bool,
    options: ControlOptions,
    pivot: Point3<f32>,
    current: Spherical,
    end: Spherical,
    zoom: f32,
    zoom_end: f32,
}

impl OrbitControls {
    pub fn new(options: ControlOptions) -> Self {
        Self {
            enabled: true,
            options,
            pivot: Point3::origin(),
            current: Spherical { theta: 0.0, phi: PI / 2.0 },
            end: Spherical { theta: 0.0, phi: PI / 2.0 },
            zoom: 1.0,
            zoom_end: 1.0,
        }
    }

    /// Put the eye at `eye` looking at `look_at`, without easing.
    ///
    /// The pivot lands `distance` in front of the eye, so only the direction
    /// towards `look_at` matters.
    pub fn set_look_at(&mut self, eye: Point3<f32>, look_at: Point3<f32>) {
        let to = look_at - eye;
        let direction = if to.magnitude2() > 0.0 {
            to.normalize()
        } else {
            -Vector3::unit_z()
        };
        self.pivot = eye + direction * self.options.distance;
        self.current = Spherical::from_offset(-direction);
        self.clamp_polar();
        self.end = self.current;
    }

    /// Move pivot and eye together so the eye ends up at `position`, keeping the
    /// view direction.
    pub fn move_to(&mut self, position: Point3<f32>) {
        self.pivot = position - self.current.offset() * self.options.distance;
    }

    pub fn eye(&self) -> Point3<f32> {
        self.pivot + self.current.offset() * self.options.distance
    }

    pub fn direction(&self) -> Vector3<f32> {
        -self.current.offset()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Rotate by a pointer drag of `dx`, `dy` pixels in a viewport `viewport_height` tall.
    pub fn rotate(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        if !self.enabled || viewport_height <= 0.0 {
            return;
        }
        // measured as previous minus current pointer position
        let theta = TAU * self.options.azimuth_rotate_speed * -dx / viewport_height;
        let phi = TAU * self.options.polar_rotate_speed * -dy / viewport_height;
        self.end.theta += theta;
        self.end.phi += phi;
        self.clamp_polar();
    }

    /// Zoom by `delta` wheel notches, positive zooming in.
    pub fn wheel(&mut self, delta: f32) {
        if !self.enabled {
            return;
        }
        let scale = 0.95f32.powf(-delta * WHEEL_ZOOM_STEPS);
        self.zoom_end =
            (self.zoom_end * scale).clamp(self.options.min_zoom, self.options.max_zoom);
    }

    /// Ease towards the requested angles and zoom. Returns whether anything moved.
    pub fn update(&mut self, dt: f32) -> bool {
        let t = if self.options.smooth_time > 0.0 {
            1.0 - (-4.0 * dt / self.options.smooth_time).exp()
        } else {
            1.0
        };
        let before = (self.current, self.zoom);
        self.current.theta = approach(self.current.theta, self.end.theta, t);
        self.current.phi = approach(self.current.phi, self.end.phi, t);
        self.zoom = approach(self.zoom, self.zoom_end, t);
        before != (self.current, self.zoom)
    }

    pub fn apply(&self, camera: &mut Camera) {
        camera.eye = self.eye();
        camera.direction = self.direction();
        camera.zoom = self.zoom;
    }

    fn clamp_polar(&mut self) {
        self.current.phi = self.current.phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        self.end.phi = self.end.phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
    }
}

fn approach(current: f32, target: f32, t: f32) -> f32 {
    let next = current + (target - current) * t;
    if (target - next).abs() < 1e-5 { target } else { next }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> OrbitControls {
        let mut controls = OrbitControls::new(ControlOptions::default());
        controls.set_look_at(Point3::new(0.0, 1.5, 0.0), Point3::new(2.0, 1.5, 2.0));
        controls
    }

    fn settle(controls: &mut OrbitControls) {
        for _ in 0..200 {
            controls.update(1.0 / 60.0);
        }
    }

    #[test]
    fn starts_at_the_requested_pose() {
        let controls = controls();
        let expected = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert!((controls.direction() - expected).magnitude() < 1e-5);
        assert!(
            (controls.eye() - Point3::new(0.0, 1.5, 0.0)).magnitude() < 1e-5
        );
    }

    #[test]
    fn dragging_turns_the_view_in_place() {
        let mut controls = controls();
        let eye = controls.eye();
        let before = controls.direction();
        controls.rotate(100.0, 0.0, 600.0);
        settle(&mut controls);
        assert!(controls.direction().angle(before).0 > 0.1);
        assert!((controls.eye() - eye).magnitude() < 1e-4);
        // horizontal drags keep the horizon level
        assert!(controls.direction().y.abs() < 1e-4);
    }

    #[test]
    fn polar_angle_never_flips_over_the_pole() {
        let mut controls = controls();
        controls.rotate(0.0, -100_000.0, 600.0);
        settle(&mut controls);
        let direction = controls.direction();
        assert!(direction.y.abs() < 1.0);
        assert!(direction.magnitude() > 0.99);
    }

    #[test]
    fn wheel_zoom_is_clamped() {
        let mut controls = controls();
        for _ in 0..100 {
            controls.wheel(1.0);
        }
        settle(&mut controls);
        assert_eq!(controls.zoom(), 5.0);
        for _ in 0..200 {
            controls.wheel(-1.0);
        }
        settle(&mut controls);
        assert_eq!(controls.zoom(), 0.5);
    }

    #[test]
    fn disabled_controls_ignore_input() {
        let mut controls = controls();
        controls.enabled = false;
        let before = controls.direction();
        controls.rotate(300.0, 200.0, 600.0);
        controls.wheel(3.0);
        assert!(!controls.update(0.1));
        assert_eq!(controls.direction(), before);
    }

    #[test]
    fn move_to_keeps_the_direction() {
        let mut controls = controls();
        let before = controls.direction();
        controls.move_to(Point3::new(4.0, 1.5, -3.0));
        assert!(
            (controls.eye() - Point3::new(4.0, 1.5, -3.0)).magnitude() < 1e-4
        );
        assert_eq!(controls.direction(), before);
    }
}
