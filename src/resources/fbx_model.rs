//! FBX through the Open Asset Import Library.
//!
//! Only available natively with the `fbx` feature, since it links the C++ library.
//! Everywhere else loading an `.fbx` fails with [`GalleryError::UnsupportedFormat`].

use crate::{
    error::{GalleryError, Result},
    resources::{AssetSource, LoadProgress, LoadedModel},
};

#[cfg(all(feature = "fbx", not(target_arch = "wasm32")))]
pub async fn load_model_fbx(
    source: &AssetSource,
    url: &str,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedModel> {
    let data = source.load_binary(url, progress).await?;
    assimp::convert_scene(url, &data)
}

#[cfg(not(all(feature = "fbx", not(target_arch = "wasm32"))))]
pub async fn load_model_fbx(
    _source: &AssetSource,
    url: &str,
    _progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedModel> {
    log::error!("{url} needs the `fbx` feature");
    Err(GalleryError::UnsupportedFormat {
        url: url.to_string(),
    })
}

#[cfg(all(feature = "fbx", not(target_arch = "wasm32")))]
mod assimp {
    use std::{rc::Rc, sync::Arc};

    use cgmath::{InnerSpace, Matrix3, Matrix4, Quaternion, Vector3};
    use russimp::{
        material::{DataContent, PropertyTypeInfo, TextureType},
        node::Node as RNode,
        scene::{PostProcess, Scene as RScene},
    };

    use crate::{
        data_structures::{
            geometry::{Material, MeshData, Primitive},
            instance::Instance,
            scene_graph::{NodeId, SceneGraph},
        },
        error::{GalleryError, Result},
        resources::LoadedModel,
    };

    fn default_post_process() -> Vec<PostProcess> {
        vec![
            PostProcess::Triangulate,
            PostProcess::GenerateSmoothNormals,
            PostProcess::JoinIdenticalVertices,
            PostProcess::FlipUVs,
        ]
    }

    pub fn convert_scene(url: &str, bytes: &[u8]) -> Result<LoadedModel> {
        let scene = RScene::from_buffer(bytes, default_post_process(), "fbx")
            .map_err(|e| GalleryError::parse(url, format!("{e:?}")))?;

        let mut materials: Vec<Material> = scene.materials.iter().map(convert_material).collect();
        let default_material = materials.len();
        materials.push(Material::default());

        let meshes: Vec<Primitive> = scene
            .meshes
            .iter()
            .map(|m| convert_mesh(m, materials.len(), default_material))
            .collect();

        let mut graph = SceneGraph::new(url.rsplit('/').next().unwrap_or(url));
        if let Some(root) = &scene.root {
            let mut stack: Vec<(Rc<RNode>, NodeId)> = vec![(root.clone(), graph.root())];
            while let Some((node, parent)) = stack.pop() {
                let id = graph.add_node(parent, &node.name, decompose(&node));
                let primitives: Vec<Primitive> = node
                    .meshes
                    .iter()
                    .filter_map(|&i| meshes.get(i as usize).cloned())
                    .collect();
                if !primitives.is_empty() {
                    graph.node_mut(id).mesh = Some(Arc::new(MeshData {
                        name: node.name.clone(),
                        primitives,
                        materials: materials.clone(),
                    }));
                }
                for child in node.children.borrow().iter().rev() {
                    stack.push((child.clone(), id));
                }
            }
        }

        Ok(LoadedModel {
            graph,
            animations: Vec::new(),
        })
    }

    fn convert_material(mat: &russimp::material::Material) -> Material {
        let name = mat
            .properties
            .iter()
            .find(|p| p.key == "?mat.name")
            .and_then(|p| match &p.data {
                PropertyTypeInfo::String(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "material".to_string());
        let base_color = mat
            .properties
            .iter()
            .find(|p| p.key == "$clr.diffuse")
            .and_then(|p| match &p.data {
                PropertyTypeInfo::FloatArray(f) if f.len() >= 3 => {
                    Some([f[0], f[1], f[2], f.get(3).copied().unwrap_or(1.0)])
                }
                _ => None,
            })
            .unwrap_or([1.0, 1.0, 1.0, 1.0]);

        let mut material = Material::plain(&name, base_color);
        // only embedded textures; external ones would need another fetch
        if let Some(texture) = mat.textures.get(&TextureType::Diffuse) {
            let texture = texture.borrow();
            material.texture = match &texture.data {
                DataContent::Bytes(bytes) if !bytes.is_empty() => image::load_from_memory(bytes)
                    .map(|img| Arc::new(img.to_rgba8()))
                    .map_err(|e| {
                        log::warn!("Failed to decode embedded texture '{}': {e}", texture.filename)
                    })
                    .ok(),
                DataContent::Texel(texels) if !texels.is_empty() => {
                    let height = texture.height.max(1);
                    let rgba = texels.iter().flat_map(|t| [t.r, t.g, t.b, t.a]).collect();
                    image::RgbaImage::from_raw(texture.width, height, rgba).map(Arc::new)
                }
                _ => None,
            };
        }
        material
    }

    fn convert_mesh(
        mesh: &russimp::mesh::Mesh,
        material_count: usize,
        default_material: usize,
    ) -> Primitive {
        let positions = mesh.vertices.iter().map(|v| [v.x, v.y, v.z]).collect();
        let normals = mesh.normals.iter().map(|n| [n.x, n.y, n.z]).collect();
        let tex_coords = match mesh.texture_coords.first().and_then(|c| c.as_ref()) {
            Some(coords) => coords.iter().map(|tc| [tc.x, tc.y]).collect(),
            None => vec![[0.0, 0.0]; mesh.vertices.len()],
        };
        let indices = mesh
            .faces
            .iter()
            .filter(|face| face.0.len() == 3)
            .flat_map(|face| face.0.iter().copied())
            .collect();
        let material = mesh.material_index as usize;
        let mut primitive = Primitive {
            positions,
            normals,
            tex_coords,
            indices,
            material: if material < material_count - 1 {
                material
            } else {
                default_material
            },
            ..Default::default()
        };
        primitive.ensure_normals();
        primitive
    }

    fn decompose(node: &RNode) -> Instance {
        let t = &node.transformation;
        #[rustfmt::skip]
        let matrix = Matrix4::new(
            t.a1, t.b1, t.c1, t.d1,
            t.a2, t.b2, t.c2, t.d2,
            t.a3, t.b3, t.c3, t.d3,
            t.a4, t.b4, t.c4, t.d4,
        );
        let scale = Vector3::new(
            matrix.x.truncate().magnitude(),
            matrix.y.truncate().magnitude(),
            matrix.z.truncate().magnitude(),
        );
        let safe = |s: f32| if s.abs() > f32::EPSILON { s } else { 1.0 };
        let rotation = Matrix3::from_cols(
            matrix.x.truncate() / safe(scale.x),
            matrix.y.truncate() / safe(scale.y),
            matrix.z.truncate() / safe(scale.z),
        );
        Instance {
            position: matrix.w.truncate(),
            rotation: Quaternion::from(rotation).normalize(),
            scale,
        }
    }
}
