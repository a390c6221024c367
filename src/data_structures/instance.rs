//! Node transforms and their GPU representation.
//!
//! Every scene node carries an [`Instance`] relative to its parent. The renderer
//! uploads one [`InstanceRaw`] per drawn node holding the composed world matrix.

use std::ops::Mul;

use cgmath::{Euler, InnerSpace, Matrix, Matrix3, One, Quaternion, Rad, SquareMatrix, Vector3};

use crate::data_structures::model;

/// Position, rotation (as quaternion) and scale of a node relative to its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn with_position(mut self, position: impl Into<Vector3<f32>>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vector3::new(scale, scale, scale);
        self
    }

    pub fn with_euler(mut self, euler: impl Into<Vector3<f32>>) -> Self {
        self.rotation = quaternion_from_euler(euler.into());
        self
    }

    /// Rotation as XYZ Euler angles in radians.
    pub fn euler(&self) -> Vector3<f32> {
        euler_from_quaternion(self.rotation)
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw::from_matrix(self.to_matrix())
    }
}

/// Rotation applying X first, then Y, then Z in the rotated frame (`Rx * Ry * Rz`).
pub fn quaternion_from_euler(euler: Vector3<f32>) -> Quaternion<f32> {
    let qx = Quaternion::from(Euler::new(Rad(euler.x), Rad(0.0), Rad(0.0)));
    let qy = Quaternion::from(Euler::new(Rad(0.0), Rad(euler.y), Rad(0.0)));
    let qz = Quaternion::from(Euler::new(Rad(0.0), Rad(0.0), Rad(euler.z)));
    (qx * qy * qz).normalize()
}

/// Inverse of [`quaternion_from_euler`].
pub fn euler_from_quaternion(rotation: Quaternion<f32>) -> Vector3<f32> {
    let m = Matrix3::from(rotation);
    // Row/column naming: m13 is row 1, column 3.
    let (m11, m12, m13) = (m.x.x, m.y.x, m.z.x);
    let (m22, m23) = (m.y.y, m.z.y);
    let (m32, m33) = (m.y.z, m.z.z);

    let y = m13.clamp(-1.0, 1.0).asin();
    if m13.abs() < 0.999_999_9 {
        Vector3::new((-m23).atan2(m33), y, (-m12).atan2(m11))
    } else {
        Vector3::new(m32.atan2(m22), y, 0.0)
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl From<Vector3<f32>> for Instance {
    fn from(position: Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU: the node's world matrix
 * and the matrix used to bring its normals into world space.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    pub fn from_matrix(world: cgmath::Matrix4<f32>) -> Self {
        let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
        // Inverse transpose keeps normals perpendicular under non-uniform scale.
        let normal = linear.invert().map(|inv| inv.transpose()).unwrap_or(linear);
        Self {
            model: world.into(),
            normal: normal.into(),
        }
    }
}

/**
 * Stride layout: the 4x4 world matrix as four vec4s followed by the 3x3 normal
 * matrix as three vec3s. Locations start after the per-vertex attributes.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // One InstanceRaw per drawn node, advanced per instance rather than per vertex.
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Rotation, Transform};

    fn assert_close(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).magnitude() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn euler_round_trips_away_from_gimbal_lock() {
        let euler = Vector3::new(0.3, -0.7, 1.2);
        let instance = Instance::new().with_euler(euler);
        assert_close(instance.euler(), euler);
    }

    #[test]
    fn euler_applies_z_first_to_points() {
        // Rx * Ry * Rz: a vector is turned around Z before Y and X see it.
        let quarter = std::f32::consts::FRAC_PI_2;
        let q = quaternion_from_euler(Vector3::new(quarter, 0.0, quarter));
        let v = q.rotate_vector(Vector3::unit_x());
        // Z turns +X into +Y, then X turns +Y into +Z.
        assert_close(v, Vector3::unit_z());
    }

    #[test]
    fn composition_matches_matrix_product() {
        let parent = Instance::new()
            .with_position(Vector3::new(0.0, -10.0, 0.0))
            .with_uniform_scale(10.0);
        let child = Instance::new()
            .with_position(Vector3::new(1.0, 2.0, 3.0))
            .with_euler(Vector3::new(0.0, 0.5, 0.0));
        let composed = (&parent * &child).to_matrix();
        let expected = parent.to_matrix() * child.to_matrix();
        let p = cgmath::Point3::new(0.5, 0.5, 0.5);
        let a = composed.transform_point(p);
        let b = expected.transform_point(p);
        assert_close(Vector3::new(a.x, a.y, a.z), Vector3::new(b.x, b.y, b.z));
    }
}
