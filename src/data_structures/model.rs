//! GPU-side meshes and materials.
//!
//! [`Model`] is the uploaded form of a [`MeshData`]: one vertex and index buffer
//! per primitive and one bind group per material. Uploads happen lazily in the
//! renderer the first time a node with a mesh is drawn. Meshes that only moved
//! their vertices, such as deformed skins, are rewritten in place.

use std::{ops::Range, sync::Arc};

use wgpu::util::DeviceExt;

use crate::data_structures::{
    geometry::{Material as MaterialData, MeshData, Primitive},
    texture::Texture,
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Interleave the attribute streams of a primitive. Missing texture coordinates
/// or normals are zero-filled.
pub fn interleave(primitive: &Primitive) -> Vec<ModelVertex> {
    primitive
        .positions
        .iter()
        .enumerate()
        .map(|(i, &position)| ModelVertex {
            position,
            tex_coords: primitive.tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
            normal: primitive.normals.get(i).copied().unwrap_or([0.0, 0.0, 0.0]),
        })
        .collect()
}

/// Base color factor of a material, padded to 16 bytes for the uniform buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
}

pub struct Material {
    pub name: String,
    #[allow(unused)]
    pub uniform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    /// Texture and sampler come from `fallback` (a white pixel) when the material
    /// has no picture, so every material fits the same bind group layout.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        material: &MaterialData,
        fallback: &Texture,
    ) -> Self {
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} material uniform", material.name)),
            contents: bytemuck::cast_slice(&[MaterialUniform {
                base_color: material.base_color,
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let label = Some(material.name.as_str());
        let uploaded = material
            .texture
            .as_ref()
            .map(|picture| Texture::from_image(device, queue, picture, label));
        let texture = uploaded.as_ref().unwrap_or(fallback);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
            label: Some(&material.name),
        });
        Self {
            name: material.name.clone(),
            uniform,
            bind_group,
        }
    }
}

pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
    /// Index into the source `MeshData::primitives`.
    pub primitive: usize,
    pub vertex_count: usize,
}

/// All primitives of one mesh node, ready to draw.
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Model {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        data: &MeshData,
        fallback: &Texture,
    ) -> Self {
        let materials = data
            .materials
            .iter()
            .map(|m| Material::upload(device, queue, layout, m, fallback))
            .collect();
        let meshes = data
            .primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.indices.is_empty())
            .map(|(i, p)| {
                let vertex_buffer =
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{} Vertex Buffer", data.name)),
                        contents: bytemuck::cast_slice(&interleave(p)),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
                let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Index Buffer", data.name)),
                    contents: bytemuck::cast_slice(&p.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                Mesh {
                    vertex_buffer,
                    index_buffer,
                    num_elements: p.indices.len() as u32,
                    material: p.material,
                    primitive: i,
                    vertex_count: p.positions.len(),
                }
            })
            .collect();
        Self { meshes, materials }
    }

    /// Overwrite the vertex buffers with `data`, which must share its layout with
    /// the mesh this model was uploaded from (see [`same_layout`]). Returns `false`
    /// without writing anything when a primitive's vertex count changed.
    pub fn update_vertices(&self, queue: &wgpu::Queue, data: &MeshData) -> bool {
        let fits = self.meshes.iter().all(|mesh| {
            data.primitives
                .get(mesh.primitive)
                .is_some_and(|p| p.positions.len() == mesh.vertex_count)
        });
        if !fits {
            return false;
        }
        for mesh in &self.meshes {
            let vertices = interleave(&data.primitives[mesh.primitive]);
            queue.write_buffer(&mesh.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        }
        true
    }
}

/// True when `b` can reuse the index buffers and materials uploaded for `a`.
pub fn same_layout(a: &MeshData, b: &MeshData) -> bool {
    let same_materials = a.materials.len() == b.materials.len()
        && a.materials.iter().zip(&b.materials).all(|(x, y)| {
            x.base_color == y.base_color
                && match (&x.texture, &y.texture) {
                    (Some(x), Some(y)) => Arc::ptr_eq(x, y),
                    (None, None) => true,
                    _ => false,
                }
        });
    same_materials
        && a.primitives.len() == b.primitives.len()
        && a.primitives.iter().zip(&b.primitives).all(|(x, y)| {
            x.material == y.material
                && x.positions.len() == y.positions.len()
                && x.indices == y.indices
        })
}

pub trait DrawModel<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        instances: Range<u32>,
    );
    fn draw_model_instanced(&mut self, model: &'a Model, instances: Range<u32>);
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b Mesh,
        material: &'b Material,
        instances: Range<u32>,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    fn draw_model_instanced(&mut self, model: &'b Model, instances: Range<u32>) {
        for mesh in &model.meshes {
            if let Some(material) = model.materials.get(mesh.material) {
                self.draw_mesh_instanced(mesh, material, instances.clone());
            }
        }
    }
}
