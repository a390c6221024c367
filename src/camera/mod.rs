//! Perspective camera and its GPU uniform.
//!
//! The camera stores its view direction instead of a look-at target: the
//! look-around controller keeps its pivot a micrometre in front of the eye, far
//! below what an `f32` position can resolve at room scale.

pub mod orbit;

use cgmath::{
    Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector2, Vector3, Vector4,
};

use crate::collision::ray::Ray;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Point3<f32>,
    /// Unit view direction.
    pub direction: Vector3<f32>,
    pub up: Vector3<f32>,
    pub fovy: Deg<f32>,
    /// Narrows the field of view; 2 shows half as much of the scene.
    pub zoom: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn new(eye: Point3<f32>, look_at: Point3<f32>, width: u32, height: u32) -> Self {
        let mut camera = Self {
            eye,
            direction: -Vector3::unit_z(),
            up: Vector3::unit_y(),
            fovy: Deg(70.0),
            zoom: 1.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
            znear: 0.1,
            zfar: 10000.0,
        };
        camera.look_at(look_at);
        camera
    }

    /// Turn towards `target`. Looking at the eye itself keeps the old direction.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let to = target - self.eye;
        if to.magnitude2() > 0.0 {
            self.direction = to.normalize();
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn right(&self) -> Vector3<f32> {
        self.direction.cross(self.up).normalize()
    }

    /// Vertical field of view after zoom.
    pub fn effective_fovy(&self) -> Rad<f32> {
        let half: Rad<f32> = (self.fovy / 2.0).into();
        Rad(2.0 * (half.0.tan() / self.zoom.max(f32::EPSILON)).atan())
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.eye, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(self.effective_fovy(), self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Ray from the eye through a point in normalized device coordinates
    /// (x right, y up, both in -1..1).
    pub fn ray_from_ndc(&self, ndc: Vector2<f32>) -> Ray {
        let through = self
            .view_projection()
            .invert()
            .map(|inverse| inverse * Vector4::new(ndc.x, ndc.y, 0.5, 1.0))
            .filter(|p| p.w.abs() > f32::EPSILON)
            .map(|p| Point3::from_vec(p.truncate() / p.w));
        match through {
            Some(point) if (point - self.eye).magnitude2() > 0.0 => {
                Ray::new(self.eye, point - self.eye)
            }
            _ => Ray::new(self.eye, self.direction),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera) {
        self.view_position = camera.eye.to_homogeneous().into();
        self.view_proj = camera.view_projection().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}
