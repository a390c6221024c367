//! Gallery data structures: scene graph, instances, geometry and their GPU forms.
//!
//! - `scene_graph` is the arena of nodes every other module addresses by `NodeId`
//! - `instance` holds a node's local transform and its GPU representation
//! - `geometry` contains CPU-side meshes and materials as the loaders produce them
//! - `skin` deforms skinned meshes by their joints
//! - `model` contains the uploaded meshes and materials the renderer draws
//! - `texture` contains the GPU texture wrapper and creation utilities

pub mod geometry;
pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod skin;
pub mod texture;
