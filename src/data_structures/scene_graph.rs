//! Scene graph and hierarchical scene organization.
//!
//! Nodes are kept in an arena and addressed by [`NodeId`]; parents and children
//! refer to each other by id so the graph can be walked upwards (tagged-ancestor
//! lookup when picking) as cheaply as downwards (rendering, raycasting).
//!
//! Loaders build a standalone [`SceneGraph`] per asset which the gallery then
//! [grafts](SceneGraph::graft) into its own graph once the load completes.

use std::{collections::HashMap, sync::Arc};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{geometry::MeshData, instance::Instance, skin::Skin},
    options::NodeData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local: Instance,
    pub mesh: Option<Arc<MeshData>>,
    /// Present on nodes that should be reported when they, or anything below them, is picked.
    pub data: Option<NodeData>,
    pub visible: bool,
    /// Set on nodes whose mesh is deformed by joints elsewhere in the graph.
    pub skin: Option<Skin>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(name: &str, local: Instance, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            local,
            mesh: None,
            data: None,
            visible: true,
            skin: None,
            parent,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: Vec<Node>,
}

impl SceneGraph {
    /// A graph holding only its root node.
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![Node::new(root_name, Instance::new(), None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root is always there
        false
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str, local: Instance) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, local, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_mesh_node(
        &mut self,
        parent: NodeId,
        name: &str,
        local: Instance,
        mesh: MeshData,
    ) -> NodeId {
        let id = self.add_node(parent, name, local);
        self.nodes[id.0].mesh = Some(Arc::new(mesh));
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Composed transform from `id`'s local space to the graph root's space.
    pub fn world_matrix(&self, id: NodeId) -> Matrix4<f32> {
        let mut matrix = Matrix4::identity();
        for ancestor in self.ancestors(id) {
            matrix = self.nodes[ancestor.0].local.to_matrix() * matrix;
        }
        matrix
    }

    pub fn world_instance(&self, id: NodeId) -> Instance {
        let chain: Vec<NodeId> = self.ancestors(id).collect();
        chain
            .into_iter()
            .rev()
            .fold(Instance::new(), |acc, n| &acc * &self.nodes[n.0].local)
    }

    /// `id` itself followed by its parent, grandparent and so on up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            next: self.contains(id).then_some(id),
        }
    }

    /// `id` and every node below it, depth first, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// True when `id` is `root` or below it.
    pub fn is_descendant_of(&self, id: NodeId, root: NodeId) -> bool {
        self.ancestors(id).any(|a| a == root)
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// A node is drawn only if it and all of its ancestors are visible.
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.ancestors(id).all(|a| self.nodes[a.0].visible)
    }

    /// Copy all of `other` below `parent`. `other`'s root becomes a regular child
    /// node; the returned map translates `other`'s ids into ids of `self`.
    pub fn graft(&mut self, parent: NodeId, other: &SceneGraph) -> HashMap<NodeId, NodeId> {
        let mut mapping = HashMap::with_capacity(other.len());
        for source in other.descendants(other.root()) {
            let node = other.node(source);
            let new_parent = match node.parent {
                Some(p) => mapping[&p],
                None => parent,
            };
            let id = self.add_node(new_parent, &node.name, node.local.clone());
            let copy = &mut self.nodes[id.0];
            copy.mesh = node.mesh.clone();
            copy.data = node.data.clone();
            copy.visible = node.visible;
            mapping.insert(source, id);
        }
        // joints may come after the skinned node in the walk
        for (source, id) in &mapping {
            if let Some(skin) = &other.node(*source).skin {
                self.nodes[id.0].skin = Some(skin.remap(&mapping));
            }
        }
        mapping
    }
}

pub struct Ancestors<'a> {
    graph: &'a SceneGraph,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.graph.nodes[current.0].parent;
        Some(current)
    }
}
