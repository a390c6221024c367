use std::{
    io::{BufReader, Cursor},
    sync::Arc,
};

use crate::{
    data_structures::{
        geometry::{Material, MeshData, Primitive},
        instance::Instance,
        scene_graph::SceneGraph,
    },
    error::{GalleryError, Result},
    resources::{AssetSource, LoadProgress, LoadedModel, picture::decode_picture, resolve_relative},
};

/// Load a Wavefront `.obj` and the `.mtl` files and textures it references. Each
/// object in the file becomes one mesh node below the model's root.
pub async fn load_model_obj(
    source: &AssetSource,
    url: &str,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedModel> {
    let obj_text = source.load_string(url, progress).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let source = source.clone();
            let mtl_url = resolve_relative(url, &p);
            async move {
                match source.load_string(&mtl_url, &mut |_| {}).await {
                    Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                    Err(e) => {
                        log::warn!("{e}");
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            }
        },
    )
    .await
    .map_err(|e| GalleryError::parse(url, e))?;

    let obj_materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("materials of {url} could not be loaded: {e}");
        Vec::new()
    });
    let mut materials = Vec::with_capacity(obj_materials.len() + 1);
    for m in obj_materials {
        let [r, g, b] = m.diffuse.unwrap_or([1.0, 1.0, 1.0]);
        let mut material = Material::plain(&m.name, [r, g, b, m.dissolve.unwrap_or(1.0)]);
        if let Some(texture) = &m.diffuse_texture {
            let texture_url = resolve_relative(url, texture);
            match source.load_binary(&texture_url, &mut |_| {}).await {
                Ok(bytes) => match decode_picture(&texture_url, &bytes) {
                    Ok(picture) => material.texture = Some(Arc::new(picture)),
                    Err(e) => log::warn!("{e}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }
        materials.push(material);
    }
    let default_material = materials.len();
    materials.push(Material::default());

    let mut graph = SceneGraph::new(url.rsplit('/').next().unwrap_or(url));
    for m in &models {
        let mesh = to_mesh_data(m, &materials, default_material);
        if mesh.primitives.is_empty() {
            continue;
        }
        graph.add_mesh_node(graph.root(), &m.name, Instance::new(), mesh);
    }

    Ok(LoadedModel {
        graph,
        animations: Vec::new(),
    })
}

fn to_mesh_data(m: &tobj::Model, materials: &[Material], default_material: usize) -> MeshData {
    let positions: Vec<[f32; 3]> = m
        .mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let vertex_count = positions.len();
    let normals = if m.mesh.normals.len() == vertex_count * 3 {
        m.mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect()
    } else {
        Vec::new()
    };
    // obj puts the texture origin at the bottom left
    let tex_coords = (0..vertex_count)
        .map(|i| {
            [
                m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ]
        })
        .collect();

    let mut primitive = Primitive {
        positions,
        normals,
        tex_coords,
        indices: m.mesh.indices.clone(),
        material: m.mesh.material_id.unwrap_or(default_material),
        ..Default::default()
    };
    primitive.ensure_normals();

    MeshData {
        name: m.name.clone(),
        primitives: if primitive.indices.is_empty() {
            Vec::new()
        } else {
            vec![primitive]
        },
        materials: materials.to_vec(),
    }
}
