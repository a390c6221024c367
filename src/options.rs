//! Gallery configuration and the data attached to pickable nodes.
//!
//! Everything here is plain serde data so a host can keep a gallery layout
//! (camera, walking parameters, hung pictures) in a JSON file next to its assets.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GalleryError, Result};

/// A 3D coordinate as it appears in layout files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for cgmath::Vector3<f32> {
    fn from(p: Position) -> Self {
        cgmath::Vector3::new(p.x, p.y, p.z)
    }
}

impl From<Position> for cgmath::Point3<f32> {
    fn from(p: Position) -> Self {
        cgmath::Point3::new(p.x, p.y, p.z)
    }
}

impl From<cgmath::Vector3<f32>> for Position {
    fn from(v: cgmath::Vector3<f32>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<cgmath::Point3<f32>> for Position {
    fn from(p: cgmath::Point3<f32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

/// How the camera is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Rotate the view in place, zoom with the wheel.
    #[default]
    LookAround,
    /// First person WASD movement with capsule collision.
    Walking,
}

/// Look-around controller tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlOptions {
    /// Distance between the eye and the point it orbits. Kept tiny so the
    /// camera rotates in place.
    pub distance: f32,
    pub azimuth_rotate_speed: f32,
    pub polar_rotate_speed: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Seconds until the controller has covered most of a requested rotation.
    pub smooth_time: f32,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            distance: 1e-6,
            azimuth_rotate_speed: -0.5,
            polar_rotate_speed: -0.5,
            min_zoom: 0.5,
            max_zoom: 5.0,
            smooth_time: 0.25,
        }
    }
}

/// Walking mode tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    pub radius: f32,
    /// Distance between the capsule's foot and head centers.
    pub height: f32,
    /// Acceleration per second for each held movement key.
    pub speed: f32,
    /// Keep damping and colliding after the keys are released until the player
    /// is slower than `rest_speed`. Off reproduces the old behaviour where a
    /// released key freezes the player with whatever velocity is left.
    pub settle_residual_velocity: bool,
    pub rest_speed: f32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            radius: 0.35,
            height: 1.0,
            speed: 25.0,
            settle_residual_velocity: true,
            rest_speed: 1e-3,
        }
    }
}

/// Everything a [`crate::gallery::Gallery`] is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryOptions {
    /// Attach a transform gizmo to picked nodes instead of reporting them.
    pub debug: bool,
    pub camera_position: Position,
    pub camera_look_at: Position,
    pub mode: NavigationMode,
    pub controls: ControlOptions,
    pub player: PlayerOptions,
    /// Clicking a mesh with this name moves the viewer onto the clicked spot.
    pub teleport_node: Option<String>,
    /// Height the viewer is put at after a teleport.
    pub eye_height: f32,
    /// Largest side of a hung picture, in scene units.
    pub item_max_size: f32,
    pub item_depth: f32,
    /// Directory assets are resolved against on native targets.
    pub asset_root: PathBuf,
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self {
            debug: false,
            camera_position: Position::new(0.0, 0.0, 1.0),
            camera_look_at: Position::new(0.0, 0.0, 0.0),
            mode: NavigationMode::default(),
            controls: ControlOptions::default(),
            player: PlayerOptions::default(),
            teleport_node: Some("meishu01".to_string()),
            eye_height: 1.5,
            item_max_size: 10.0,
            item_depth: 2.0,
            asset_root: PathBuf::from("./assets"),
        }
    }
}

impl GalleryOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GalleryError::parse("gallery options", e))
    }
}

/// A framed picture to hang in the gallery.
///
/// The struct is handed back verbatim to the pick callback when the picture is clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub url: String,
    pub id: String,
    pub position: Position,
    pub scale: Position,
    /// Euler angles in radians, applied in XYZ order.
    pub rotation: Position,
}

impl ItemData {
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| GalleryError::parse("item list", e))
    }
}

/// Data tagged onto a scene node. Nodes carrying it are reported when picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeData {
    Item(ItemData),
    Entity { id: String },
}

impl NodeData {
    pub fn id(&self) -> &str {
        match self {
            NodeData::Item(item) => &item.id,
            NodeData::Entity { id } => id,
        }
    }
}
