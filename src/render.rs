//! Drawing the scene graph.
//!
//! The [`Renderer`] walks the graph every frame, collects the visible nodes that
//! carry a mesh and draws each with its world matrix as a single instance. Meshes
//! are uploaded the first time their node is drawn and kept until the node's mesh
//! is replaced. A replacement with the same layout, like the next pose of a
//! skinned mesh, only rewrites the vertex buffers.

use std::{collections::HashMap, sync::Arc};

use wgpu::util::DeviceExt;

use crate::{
    camera::{Camera, CameraUniform},
    context::Context,
    data_structures::{
        geometry::MeshData,
        instance::InstanceRaw,
        model::{DrawModel, Model, same_layout},
        scene_graph::{NodeId, SceneGraph},
        texture::Texture,
    },
    pipelines::basic,
};

/// Every visible node with a mesh, paired with its world transform, in graph order.
pub fn draw_list(graph: &SceneGraph) -> Vec<(NodeId, InstanceRaw)> {
    graph
        .descendants(graph.root())
        .into_iter()
        .filter(|&id| graph.node(id).mesh.is_some() && graph.is_visible(id))
        .map(|id| (id, InstanceRaw::from_matrix(graph.world_matrix(id))))
        .collect()
}

struct Uploaded {
    source: Arc<MeshData>,
    model: Model,
}

pub struct Renderer {
    pipeline: wgpu::RenderPipeline,
    material_layout: wgpu::BindGroupLayout,
    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    white: Texture,
    models: HashMap<NodeId, Uploaded>,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    pub clear_colour: wgpu::Color,
}

impl Renderer {
    pub fn new(ctx: &Context) -> Self {
        let material_layout = basic::material_layout(&ctx.device);
        let camera_layout = basic::camera_layout(&ctx.device);
        let pipeline =
            basic::mk_basic_pipeline(&ctx.device, &ctx.config, &material_layout, &camera_layout);

        let camera_uniform = CameraUniform::new();
        let camera_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let instance_capacity = 64;
        let instance_buffer = mk_instance_buffer(&ctx.device, instance_capacity);

        Self {
            pipeline,
            material_layout,
            camera_uniform,
            camera_buffer,
            camera_bind_group,
            white: Texture::white(&ctx.device, &ctx.queue),
            models: HashMap::new(),
            instance_buffer,
            instance_capacity,
            clear_colour: wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.1,
                a: 1.0,
            },
        }
    }

    /// Number of meshes currently resident on the GPU.
    pub fn uploaded(&self) -> usize {
        self.models.len()
    }

    fn upload(&mut self, ctx: &Context, graph: &SceneGraph, draws: &[(NodeId, InstanceRaw)]) {
        for (id, _) in draws {
            let Some(mesh) = &graph.node(*id).mesh else {
                continue;
            };
            if let Some(uploaded) = self.models.get_mut(id) {
                if Arc::ptr_eq(&uploaded.source, mesh) {
                    continue;
                }
                if same_layout(&uploaded.source, mesh)
                    && uploaded.model.update_vertices(&ctx.queue, mesh)
                {
                    uploaded.source = mesh.clone();
                    continue;
                }
            }
            log::debug!("uploading mesh {} of node {}", mesh.name, graph.node(*id).name);
            let model = Model::upload(
                &ctx.device,
                &ctx.queue,
                &self.material_layout,
                mesh,
                &self.white,
            );
            self.models.insert(
                *id,
                Uploaded {
                    source: mesh.clone(),
                    model,
                },
            );
        }

        if draws.len() > self.instance_capacity {
            self.instance_capacity = draws.len().next_power_of_two();
            self.instance_buffer = mk_instance_buffer(&ctx.device, self.instance_capacity);
        }
        let raws: Vec<InstanceRaw> = draws.iter().map(|(_, raw)| *raw).collect();
        ctx.queue
            .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&raws));
    }

    pub fn render(
        &mut self,
        ctx: &Context,
        graph: &SceneGraph,
        camera: &Camera,
    ) -> Result<(), wgpu::SurfaceError> {
        self.camera_uniform.update_view_proj(camera);
        ctx.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[self.camera_uniform]),
        );

        let draws = draw_list(graph);
        self.upload(ctx, graph, &draws);

        let output = ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(1, &self.camera_bind_group, &[]);
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            for (i, (id, _)) in draws.iter().enumerate() {
                if let Some(uploaded) = self.models.get(id) {
                    let i = i as u32;
                    render_pass.draw_model_instanced(&uploaded.model, i..i + 1);
                }
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn mk_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Buffer"),
        size: (capacity * std::mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}
