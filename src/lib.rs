//! vr-gallery
//!
//! A cross-platform 3D gallery walkthrough on wgpu. A visitor looks around (or
//! walks through) a room model, framed pictures hang on its walls and clicking
//! one reports which it was. Runs natively and on the web.
//!
//! High-level modules
//! - `gallery`: the controller that owns the scene, camera, loads and input handling
//! - `app`: the winit shell that hosts a gallery in a window or canvas
//! - `camera`: perspective camera, uniforms and orbit controls
//! - `player`: capsule-shaped walker used in walking mode
//! - `collision`: triangles, rays, capsules and the octree they are tested against
//! - `pick`: click detection and raycast picking
//! - `gizmo`: debug transform gizmo for placing pictures
//! - `input`: platform independent input events and dispatch
//! - `resources`: loading models (glTF, OBJ, FBX) and pictures
//! - `data_structures`: scene graph, instances, geometry and GPU models
//! - `context`, `pipelines`, `render`: GPU setup and drawing
//!

pub mod app;
pub mod camera;
pub mod collision;
pub mod context;
pub mod data_structures;
pub mod demo;
pub mod error;
pub mod gallery;
pub mod gizmo;
pub mod input;
pub mod lightbox;
pub mod options;
pub mod pick;
pub mod pipelines;
pub mod player;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use error::{GalleryError, Result};
pub use gallery::{Container, Gallery, Pending, RobotHandle, RobotParams};
pub use input::{EventDispatcher, InputEvent};
pub use options::{GalleryOptions, ItemData, NavigationMode, NodeData, Position};
