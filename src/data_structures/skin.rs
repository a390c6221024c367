//! Skinned meshes, deformed on the CPU.
//!
//! A skinned node keeps its undeformed [`MeshData`] in its [`Skin`]. Whenever the
//! joints have moved, [`update_skins`] rebuilds the node's mesh from that bind
//! pose, so picking and the renderer always see the current shape.

use std::{collections::HashMap, sync::Arc};

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4, Zero};

use crate::data_structures::{
    geometry::MeshData,
    scene_graph::{NodeId, SceneGraph},
};

#[derive(Clone, Debug)]
pub struct Skin {
    /// Indexed by the vertex joint attributes.
    pub joints: Vec<NodeId>,
    pub inverse_bind: Vec<Matrix4<f32>>,
    pub bind_pose: Arc<MeshData>,
    // joint matrices the current mesh was built with
    pose: Vec<Matrix4<f32>>,
}

impl Skin {
    /// Missing inverse bind matrices are identity.
    pub fn new(
        joints: Vec<NodeId>,
        mut inverse_bind: Vec<Matrix4<f32>>,
        bind_pose: Arc<MeshData>,
    ) -> Self {
        inverse_bind.resize(joints.len(), Matrix4::identity());
        Self {
            joints,
            inverse_bind,
            bind_pose,
            pose: Vec::new(),
        }
    }

    /// The same skin with its joints translated through `mapping`. Joints outside
    /// the mapping keep their id.
    pub fn remap(&self, mapping: &HashMap<NodeId, NodeId>) -> Self {
        Self {
            joints: self
                .joints
                .iter()
                .map(|j| mapping.get(j).copied().unwrap_or(*j))
                .collect(),
            pose: Vec::new(),
            ..self.clone()
        }
    }

    /// Joint transforms relative to the skinned node `node`.
    pub fn joint_matrices(&self, graph: &SceneGraph, node: NodeId) -> Vec<Matrix4<f32>> {
        let to_node = graph
            .world_matrix(node)
            .invert()
            .unwrap_or_else(Matrix4::identity);
        self.joints
            .iter()
            .zip(&self.inverse_bind)
            .map(|(&joint, inverse_bind)| {
                if graph.contains(joint) {
                    to_node * graph.world_matrix(joint) * *inverse_bind
                } else {
                    Matrix4::identity()
                }
            })
            .collect()
    }

    /// The bind pose blended by `matrices`. Vertices without weights stay where they are.
    pub fn deform(&self, matrices: &[Matrix4<f32>]) -> MeshData {
        let mut mesh = (*self.bind_pose).clone();
        for primitive in &mut mesh.primitives {
            if primitive.joints.len() != primitive.positions.len()
                || primitive.weights.len() != primitive.positions.len()
            {
                continue;
            }
            for i in 0..primitive.positions.len() {
                let (joints, weights) = (primitive.joints[i], primitive.weights[i]);
                let mut blend: Matrix4<f32> = Matrix4::zero();
                let mut total = 0.0;
                for (joint, weight) in joints.iter().zip(weights) {
                    if weight <= 0.0 {
                        continue;
                    }
                    if let Some(m) = matrices.get(*joint as usize) {
                        blend = blend + *m * weight;
                        total += weight;
                    }
                }
                if total <= 0.0 {
                    continue;
                }
                let blend = blend * (1.0 / total);

                let p = Vector3::from(primitive.positions[i]);
                let moved = blend * Vector4::new(p.x, p.y, p.z, 1.0);
                primitive.positions[i] = [moved.x, moved.y, moved.z];

                if let Some(n) = primitive.normals.get_mut(i) {
                    let linear = Matrix3::from_cols(
                        blend.x.truncate(),
                        blend.y.truncate(),
                        blend.z.truncate(),
                    );
                    let normal = linear
                        .invert()
                        .map(|inv| inv.transpose())
                        .unwrap_or(linear)
                        * Vector3::from(*n);
                    if normal.magnitude2() > 0.0 {
                        *n = normal.normalize().into();
                    }
                }
            }
        }
        mesh
    }
}

/// Re-deform every skinned node whose joints moved since the last call. Returns
/// how many meshes were rebuilt.
pub fn update_skins(graph: &mut SceneGraph) -> usize {
    let skinned: Vec<NodeId> = graph
        .iter()
        .filter(|(_, node)| node.skin.is_some())
        .map(|(id, _)| id)
        .collect();
    let mut rebuilt = 0;
    for id in skinned {
        let Some(skin) = graph.node(id).skin.as_ref() else {
            continue;
        };
        let matrices = skin.joint_matrices(graph, id);
        if matrices == skin.pose {
            continue;
        }
        let mesh = Arc::new(skin.deform(&matrices));
        let node = graph.node_mut(id);
        node.mesh = Some(mesh);
        if let Some(skin) = node.skin.as_mut() {
            skin.pose = matrices;
        }
        rebuilt += 1;
    }
    rebuilt
}
