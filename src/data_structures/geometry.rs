//! CPU-side mesh data.
//!
//! Loaders produce [`MeshData`], the picker and the collision octree read its
//! triangles, and the renderer uploads it once per node.

use std::sync::Arc;

use cgmath::{InnerSpace, Vector3};
use image::RgbaImage;

use crate::collision::aabb::Aabb;

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Linear RGBA multiplier applied to the texture (or used alone without one).
    pub base_color: [f32; 4],
    pub texture: Option<Arc<RgbaImage>>,
}

impl Material {
    pub fn plain(name: &str, base_color: [f32; 4]) -> Self {
        Self {
            name: name.to_string(),
            base_color,
            texture: None,
        }
    }

    pub fn textured(name: &str, texture: Arc<RgbaImage>) -> Self {
        Self {
            name: name.to_string(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            texture: Some(texture),
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::plain("default", [1.0, 1.0, 1.0, 1.0])
    }
}

/// One indexed triangle list drawn with a single material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Primitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Top-left origin, as wgpu samples them.
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// Index into [`MeshData::materials`].
    pub material: usize,
    /// Up to four joints per vertex, indices into the node's skin. Empty for rigid meshes.
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

impl Primitive {
    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f32>; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let a = self.positions.get(tri[0] as usize)?;
            let b = self.positions.get(tri[1] as usize)?;
            let c = self.positions.get(tri[2] as usize)?;
            Some([(*a).into(), (*b).into(), (*c).into()])
        })
    }

    /// Fill in face normals when the source file had none.
    pub fn ensure_normals(&mut self) {
        if self.normals.len() == self.positions.len() {
            return;
        }
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let pa: Vector3<f32> = self.positions[a].into();
            let pb: Vector3<f32> = self.positions[b].into();
            let pc: Vector3<f32> = self.positions[c].into();
            let n = (pb - pa).cross(pc - pa);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub primitives: Vec<Primitive>,
    pub materials: Vec<Material>,
}

impl MeshData {
    /// All triangles in mesh space.
    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f32>; 3]> + '_ {
        self.primitives.iter().flat_map(|p| p.triangles())
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.primitives
                .iter()
                .flat_map(|p| p.positions.iter().map(|&v| Vector3::from(v))),
        )
    }

    pub fn material(&self, primitive: &Primitive) -> Option<&Material> {
        self.materials.get(primitive.material)
    }

    /// A box centered on the origin whose −Z face shows `picture`; the other five
    /// faces are plain white.
    pub fn picture_box(width: f32, height: f32, depth: f32, picture: Arc<RgbaImage>) -> Self {
        let half = Vector3::new(width, height, depth) / 2.0;
        let faces = box_faces();
        let mut frame = Primitive {
            material: 0,
            ..Default::default()
        };
        let mut canvas = Primitive {
            material: 1,
            ..Default::default()
        };
        for (i, (normal, right, up)) in faces.into_iter().enumerate() {
            let target = if i == faces.len() - 1 {
                &mut canvas
            } else {
                &mut frame
            };
            push_quad(target, normal, right, up, half);
        }
        Self {
            name: "picture".to_string(),
            primitives: vec![frame, canvas],
            materials: vec![
                Material::plain("frame", [1.0, 1.0, 1.0, 1.0]),
                Material::textured("canvas", picture),
            ],
        }
    }

    /// Red, green and blue bars along +X, +Y and +Z, meeting at the origin.
    pub fn axes(length: f32, thickness: f32) -> Self {
        let half = thickness / 2.0;
        let bars = [
            ("x", [1.0, 0.0, 0.0, 1.0], Vector3::unit_x()),
            ("y", [0.0, 1.0, 0.0, 1.0], Vector3::unit_y()),
            ("z", [0.0, 0.0, 1.0, 1.0], Vector3::unit_z()),
        ];
        let mut primitives = Vec::new();
        let mut materials = Vec::new();
        for (i, (name, color, axis)) in bars.into_iter().enumerate() {
            let mut bar = Primitive {
                material: i,
                ..Default::default()
            };
            let extent = axis * (length / 2.0);
            let size = Vector3::new(half, half, half) + extent;
            push_box(&mut bar, extent, size);
            primitives.push(bar);
            materials.push(Material::plain(name, color));
        }
        Self {
            name: "axes".to_string(),
            primitives,
            materials,
        }
    }
}

/// An axis aligned box with half extents `half`, centered on `center`.
fn push_box(target: &mut Primitive, center: Vector3<f32>, half: Vector3<f32>) {
    let start = target.positions.len();
    for (normal, right, up) in box_faces() {
        push_quad(target, normal, right, up, half);
    }
    for p in &mut target.positions[start..] {
        *p = (Vector3::from(*p) + center).into();
    }
}

/// (outward normal, texture right, texture up) of each box face, −Z last.
/// right x up == normal.
fn box_faces() -> [(Vector3<f32>, Vector3<f32>, Vector3<f32>); 6] {
    let x = Vector3::unit_x();
    let y = Vector3::unit_y();
    let z = Vector3::unit_z();
    [
        (x, -z, y),
        (-x, z, y),
        (y, x, -z),
        (-y, x, z),
        (z, x, y),
        (-z, -x, y),
    ]
}

fn push_quad(
    target: &mut Primitive,
    normal: Vector3<f32>,
    right: Vector3<f32>,
    up: Vector3<f32>,
    half: Vector3<f32>,
) {
    let extent = |axis: Vector3<f32>| {
        let a = Vector3::new(axis.x.abs(), axis.y.abs(), axis.z.abs());
        a.dot(half)
    };
    let (hn, hr, hu) = (extent(normal), extent(right), extent(up));
    let base = target.positions.len() as u32;
    // bottom-left, bottom-right, top-right, top-left
    for (s, t) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        let p = normal * hn + right * (s * hr) + up * (t * hu);
        target.positions.push(p.into());
        target.normals.push(normal.into());
        target.tex_coords.push([(s + 1.0) / 2.0, (1.0 - t) / 2.0]);
    }
    target
        .indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Scale an image of `width` x `height` so its larger side equals `max_size`,
/// keeping the aspect ratio.
pub fn fit_within(width: u32, height: u32, max_size: f32) -> (f32, f32) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    if w > h {
        (max_size, max_size * h / w)
    } else {
        (max_size * w / h, max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_fits_on_width() {
        let (w, h) = fit_within(1920, 1080, 10.0);
        assert_eq!(w, 10.0);
        assert!((w / h - 1920.0 / 1080.0).abs() < 1e-5);
    }

    #[test]
    fn portrait_and_square_fit_on_height() {
        let (w, h) = fit_within(600, 900, 10.0);
        assert_eq!(h, 10.0);
        assert!((w / h - 600.0 / 900.0).abs() < 1e-5);

        // Small images are scaled up, not left at their pixel size.
        assert_eq!(fit_within(4, 4, 10.0), (10.0, 10.0));
    }

    #[test]
    fn picture_box_faces_point_outwards() {
        let picture = Arc::new(RgbaImage::new(2, 1));
        let mesh = MeshData::picture_box(10.0, 5.0, 2.0, picture);
        assert_eq!(mesh.triangles().count(), 12);

        for primitive in &mesh.primitives {
            for (tri, idx) in primitive.triangles().zip(primitive.indices.chunks_exact(3)) {
                let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();
                let stored: Vector3<f32> = primitive.normals[idx[0] as usize].into();
                assert!((n - stored).magnitude() < 1e-5);
                let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
                assert!(centroid.dot(n) > 0.0);
            }
        }

        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.size(), Vector3::new(10.0, 5.0, 2.0));
    }

    #[test]
    fn axes_point_along_their_colors() {
        let axes = MeshData::axes(10.0, 0.2);
        assert_eq!(axes.primitives.len(), 3);
        let red = &axes.primitives[0];
        assert_eq!(axes.material(red).unwrap().base_color, [1.0, 0.0, 0.0, 1.0]);

        let points = red.positions.iter().map(|&p| Vector3::from(p));
        let bounds = Aabb::from_points(points).unwrap();
        assert!((bounds.min - Vector3::new(-0.1, -0.1, -0.1)).magnitude() < 1e-5);
        assert!((bounds.max - Vector3::new(10.1, 0.1, 0.1)).magnitude() < 1e-5);

        let blue = &axes.primitives[2];
        assert!(blue.positions.iter().all(|p| p[2] >= -0.1 - 1e-5));
        assert!(blue.positions.iter().any(|p| (p[2] - 10.1).abs() < 1e-5));
    }

    #[test]
    fn picture_sits_on_the_back_face() {
        let picture = Arc::new(RgbaImage::new(2, 1));
        let mesh = MeshData::picture_box(10.0, 5.0, 2.0, picture);
        let canvas = &mesh.primitives[1];
        assert!(mesh.material(canvas).unwrap().texture.is_some());
        assert!(canvas.positions.iter().all(|p| p[2] == -1.0));
        // Seen from -Z the image's left edge is on +X.
        let top_left = canvas
            .tex_coords
            .iter()
            .position(|uv| *uv == [0.0, 0.0])
            .unwrap();
        assert_eq!(canvas.positions[top_left], [5.0, 2.5, -1.0]);
    }
}
