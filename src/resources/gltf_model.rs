use std::{collections::HashMap, sync::Arc};

use cgmath::{Matrix4, Quaternion, Vector3};
use gltf::animation::util::ReadOutputs;
use image::RgbaImage;

use crate::{
    data_structures::{
        geometry::{Material, MeshData, Primitive},
        instance::Instance,
        scene_graph::{NodeId, SceneGraph},
        skin::Skin,
    },
    error::{GalleryError, Result},
    resources::{
        AssetSource, LoadProgress, LoadedModel,
        animation::{AnimationClip, Channel, Interpolation, Keyframes},
        picture::decode_picture,
        resolve_relative,
    },
};

/// Load a `.gltf` or `.glb` file with its buffers, textures and animations.
pub async fn load_model_gltf(
    source: &AssetSource,
    url: &str,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedModel> {
    let data = source.load_binary(url, progress).await?;
    let gltf = gltf::Gltf::from_slice(&data).map_err(|e| GalleryError::parse(url, e))?;

    // Load buffers
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .ok_or_else(|| GalleryError::parse(url, "binary chunk missing"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                let bin = source
                    .load_binary(&resolve_relative(url, uri), &mut |_| {})
                    .await?;
                buffer_data.push(bin);
            }
        }
    }

    // Load images, they may be shared between materials
    let mut images: Vec<Option<Arc<RgbaImage>>> = Vec::new();
    for image in gltf.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, .. } => {
                let start = view.offset();
                let end = start + view.length();
                match buffer_data
                    .get(view.buffer().index())
                    .and_then(|b| b.get(start..end))
                {
                    Some(bytes) => decode_picture(url, bytes),
                    None => Err(GalleryError::parse(url, "image view out of bounds")),
                }
            }
            gltf::image::Source::Uri { uri, .. } => {
                let image_url = resolve_relative(url, uri);
                match source.load_binary(&image_url, &mut |_| {}).await {
                    Ok(bytes) => decode_picture(&image_url, &bytes),
                    Err(e) => Err(e),
                }
            }
        };
        match decoded {
            Ok(picture) => images.push(Some(Arc::new(picture))),
            Err(e) => {
                // an untextured model is more useful than none
                log::warn!("{e}");
                images.push(None);
            }
        }
    }

    // Load materials
    let mut materials: Vec<Material> = gltf
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            let texture = pbr
                .base_color_texture()
                .and_then(|info| images.get(info.texture().source().index()))
                .cloned()
                .flatten();
            Material {
                name: material.name().unwrap_or("material").to_string(),
                base_color: pbr.base_color_factor(),
                texture,
            }
        })
        .collect();
    let default_material = materials.len();
    materials.push(Material::default());

    let mut graph = SceneGraph::new(file_name(url));
    let mut node_map: HashMap<usize, NodeId> = HashMap::new();
    let mut skinned: Vec<(NodeId, gltf::Skin)> = Vec::new();
    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| GalleryError::parse(url, "no scene"))?;

    let mut stack: Vec<(gltf::Node, NodeId)> =
        scene.nodes().map(|n| (n, graph.root())).collect();
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        let (t, r, s) = node.transform().decomposed();
        let local = Instance {
            position: Vector3::from(t),
            rotation: Quaternion::new(r[3], r[0], r[1], r[2]),
            scale: Vector3::from(s),
        };
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index()));
        let id = graph.add_node(parent, &name, local);
        if let Some(mesh) = node.mesh() {
            let mesh = to_mesh_data(&mesh, &buffer_data, &materials, default_material, &name);
            graph.node_mut(id).mesh = Some(Arc::new(mesh));
            if let Some(skin) = node.skin() {
                skinned.push((id, skin));
            }
        }
        node_map.insert(node.index(), id);
        let children: Vec<_> = node.children().collect();
        stack.extend(children.into_iter().rev().map(|c| (c, id)));
    }

    // Joints can be anywhere in the scene, so skins are resolved after the walk
    for (id, skin) in skinned {
        let joints: Option<Vec<NodeId>> = skin
            .joints()
            .map(|joint| node_map.get(&joint.index()).copied())
            .collect();
        let (Some(joints), Some(bind_pose)) = (joints, graph.node(id).mesh.clone()) else {
            log::warn!("skin {} uses joints outside the scene", skin.index());
            continue;
        };
        let inverse_bind: Vec<Matrix4<f32>> = skin
            .reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice))
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(Matrix4::from).collect())
            .unwrap_or_default();
        graph.node_mut(id).skin = Some(Skin::new(joints, inverse_bind, bind_pose));
    }

    let animations = gltf
        .animations()
        .map(|animation| to_clip(&animation, &buffer_data, &node_map))
        .collect();

    Ok(LoadedModel { graph, animations })
}

fn to_mesh_data(
    mesh: &gltf::Mesh,
    buffer_data: &[Vec<u8>],
    materials: &[Material],
    default_material: usize,
    node_name: &str,
) -> MeshData {
    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("skipping {:?} primitive in {node_name}", primitive.mode());
            continue;
        }
        let reader =
            primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
        let positions: Vec<[f32; 3]> = match reader.read_positions() {
            Some(positions) => positions.collect(),
            None => continue,
        };
        let normals = reader
            .read_normals()
            .map(|n| n.collect())
            .unwrap_or_default();
        let tex_coords = reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().collect())
            .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);
        let indices = reader
            .read_indices()
            .map(|i| i.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());
        let joints = reader
            .read_joints(0)
            .map(|j| j.into_u16().collect())
            .unwrap_or_default();
        let weights = reader
            .read_weights(0)
            .map(|w| w.into_f32().collect())
            .unwrap_or_default();

        let mut primitive = Primitive {
            positions,
            normals,
            tex_coords,
            indices,
            joints,
            weights,
            material: primitive.material().index().unwrap_or(default_material),
        };
        primitive.ensure_normals();
        primitives.push(primitive);
    }
    MeshData {
        name: mesh.name().unwrap_or(node_name).to_string(),
        primitives,
        materials: materials.to_vec(),
    }
}

fn to_clip(
    animation: &gltf::Animation,
    buffer_data: &[Vec<u8>],
    node_map: &HashMap<usize, NodeId>,
) -> AnimationClip {
    let mut channels = Vec::new();
    for channel in animation.channels() {
        let Some(&target) = node_map.get(&channel.target().node().index()) else {
            // the node is not part of the loaded scene
            continue;
        };
        let reader =
            channel.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
        let timestamps: Vec<f32> = match reader.read_inputs() {
            Some(inputs) => inputs.collect(),
            None => {
                log::warn!("No animation found in channel {}", channel.index());
                continue;
            }
        };
        let sampled = channel.sampler().interpolation();
        let cubic = sampled == gltf::animation::Interpolation::CubicSpline;
        let interpolation = match sampled {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            _ => Interpolation::Linear,
        };
        let keyframes = match reader.read_outputs() {
            Some(ReadOutputs::Translations(translations)) => {
                let values = translations.map(Vector3::from).collect();
                Keyframes::Translation(spline_values(values, cubic))
            }
            Some(ReadOutputs::Rotations(rotations)) => {
                let values = rotations
                    .into_f32()
                    .map(|r| Quaternion::new(r[3], r[0], r[1], r[2]))
                    .collect();
                Keyframes::Rotation(spline_values(values, cubic))
            }
            Some(ReadOutputs::Scales(scales)) => {
                let values = scales.map(Vector3::from).collect();
                Keyframes::Scale(spline_values(values, cubic))
            }
            Some(ReadOutputs::MorphTargetWeights(_)) => Keyframes::Other,
            None => {
                log::warn!("No Keyframes found in channel {}", channel.index());
                continue;
            }
        };
        channels.push(Channel {
            target,
            timestamps,
            keyframes,
            interpolation,
        });
    }
    AnimationClip::new(animation.name().unwrap_or("Default"), channels)
}

/// Cubic spline samplers store (in-tangent, value, out-tangent) per keyframe; keep the values.
fn spline_values<T: Copy>(values: Vec<T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.chunks_exact(3).map(|c| c[1]).collect()
    } else {
        values
    }
}

fn file_name(url: &str) -> &str {
    let path = super::strip_query(url);
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use cgmath::InnerSpace;

    use super::*;
    use crate::resources::animation::AnimationMixer;

    /// One triangle, its buffer embedded as a data URI, animated by a translation channel.
    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "body", "children": [1], "translation": [0, 2, 0] },
            { "name": "panel", "mesh": 0 }
        ],
        "meshes": [{
            "name": "panel",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }]
        }],
        "buffers": [{
            "byteLength": 76,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAAAAAAEBAAAAAAA=="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 52, "byteLength": 24 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0, 0, 0], "max": [1, 1, 0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            {
                "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
                "min": [0], "max": [1]
            },
            { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [{
            "name": "rise",
            "samplers": [{ "input": 2, "output": 3 }],
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }]
        }]
    }"#;

    #[tokio::test]
    async fn embedded_gltf_loads_nodes_meshes_and_clips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("panel.gltf"), TRIANGLE).unwrap();
        let source = AssetSource::new(dir.path());

        let model = load_model_gltf(&source, "panel.gltf", &mut |_| {}).await.unwrap();
        let graph = &model.graph;
        let body = graph.find_by_name("body").unwrap();
        let panel = graph.find_by_name("panel").unwrap();
        assert_eq!(graph.node(panel).parent(), Some(body));
        assert_eq!(graph.node(body).local.position, Vector3::new(0.0, 2.0, 0.0));

        let mesh = graph.node(panel).mesh.as_ref().unwrap();
        assert_eq!(mesh.triangles().count(), 1);
        // normals are filled in when the file has none
        assert_eq!(mesh.primitives[0].normals.len(), 3);

        assert_eq!(model.animations.len(), 1);
        let clip = &model.animations[0];
        assert_eq!(clip.name, "rise");
        assert_eq!(clip.duration, 1.0);
        assert_eq!(clip.channels[0].target, body);
    }

    /// A three vertex strip bound to two joints. `v2` hangs off `tip`, which the
    /// clip slides three units along x.
    const SKINNED: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "armature", "children": [1, 3], "translation": [0, 0, 5] },
            { "name": "root", "children": [2] },
            { "name": "tip", "translation": [0, 1, 0] },
            { "name": "strip", "mesh": 0, "skin": 0 }
        ],
        "meshes": [{
            "name": "strip",
            "primitives": [{
                "attributes": { "POSITION": 0, "JOINTS_0": 1, "WEIGHTS_0": 2 },
                "indices": 3
            }]
        }],
        "skins": [{ "joints": [1, 2], "inverseBindMatrices": 4 }],
        "buffers": [{
            "byteLength": 264,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAAEAAAAAAAAAAAAAAAAABAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAAAAAAIA/AAAAAAAAAAAAAAAAAAABAAIAAAAAAIA/AAAAAAAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAAAAAAIA/AACAPwAAAAAAAAAAAAAAAAAAAAAAAIA/AAAAAAAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAgL8AAAAAAACAPwAAAAAAAIA/AAAAAAAAgD8AAAAAAABAQAAAgD8AAAAA"
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 12 },
            { "buffer": 0, "byteOffset": 48, "byteLength": 48 },
            { "buffer": 0, "byteOffset": 96, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 104, "byteLength": 128 },
            { "buffer": 0, "byteOffset": 232, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 240, "byteLength": 24 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0, 0, 0], "max": [1, 2, 0]
            },
            { "bufferView": 1, "componentType": 5121, "count": 3, "type": "VEC4" },
            { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC4" },
            { "bufferView": 3, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 4, "componentType": 5126, "count": 2, "type": "MAT4" },
            {
                "bufferView": 5, "componentType": 5126, "count": 2, "type": "SCALAR",
                "min": [0], "max": [1]
            },
            { "bufferView": 6, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [{
            "name": "swing",
            "samplers": [{ "input": 5, "output": 6 }],
            "channels": [{ "sampler": 0, "target": { "node": 2, "path": "translation" } }]
        }]
    }"#;

    #[tokio::test]
    async fn skinned_meshes_follow_their_animated_joints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("strip.gltf"), SKINNED).unwrap();
        let source = AssetSource::new(dir.path());

        let mut model = load_model_gltf(&source, "strip.gltf", &mut |_| {}).await.unwrap();
        let strip = model.graph.find_by_name("strip").unwrap();
        let tip = model.graph.find_by_name("tip").unwrap();
        let skin = model.graph.node(strip).skin.as_ref().unwrap();
        assert_eq!(skin.joints[1], tip);
        assert_eq!(skin.bind_pose.primitives[0].joints[2], [1, 0, 0, 0]);

        let at = |graph: &SceneGraph, i: usize| {
            let mesh = graph.node(strip).mesh.clone().unwrap();
            Vector3::from(mesh.primitives[0].positions[i])
        };
        let rest = at(&model.graph, 2);

        let mut mixer = AnimationMixer::new();
        mixer.clip_action(&model.animations[0]).play();
        mixer.update(0.5, &mut model.graph);

        let moved = at(&model.graph, 2);
        assert!((rest - Vector3::new(0.0, 2.0, 0.0)).magnitude() < 1e-5);
        assert!((moved - Vector3::new(1.5, 2.0, 0.0)).magnitude() < 1e-5);
        // the root joint did not move, neither did its vertices
        let (base, side) = (at(&model.graph, 0), at(&model.graph, 1));
        assert!((base - Vector3::new(0.0, 0.0, 0.0)).magnitude() < 1e-5);
        assert!((side - Vector3::new(1.0, 0.0, 0.0)).magnitude() < 1e-5);
    }

    #[tokio::test]
    async fn broken_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.gltf"), "{ \"asset\": ").unwrap();
        let source = AssetSource::new(dir.path());
        let err = load_model_gltf(&source, "broken.gltf", &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Parse { .. }));
    }
}
