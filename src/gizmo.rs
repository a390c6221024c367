//! Debug transform gizmo.
//!
//! In debug mode a picked node is attached to the gizmo instead of being reported.
//! Dragging on the attached node then moves, rotates or scales it, and every change
//! is logged as a JSON record so the placement can be copied into a layout file.

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix4, Quaternion, Rad, Rotation3, SquareMatrix, Transform,
    Vector3,
};
use serde::Serialize;

use crate::{
    camera::Camera,
    data_structures::scene_graph::{NodeId, SceneGraph},
    input::Key,
    options::Position,
};

/// Radians of rotation per dragged pixel.
const ROTATE_PER_PX: f32 = 0.01;
/// Relative scale change per dragged pixel.
const SCALE_PER_PX: f32 = 0.005;
const MIN_SCALE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

/// The logged placement of a node, in its parent's space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformRecord {
    pub position: Position,
    pub scale: Position,
    /// Euler XYZ, radians.
    pub rotation: Position,
}

impl TransformRecord {
    pub fn of(graph: &SceneGraph, node: NodeId) -> Self {
        let local = &graph.node(node).local;
        Self {
            position: local.position.into(),
            scale: local.scale.into(),
            rotation: local.euler().into(),
        }
    }

    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(json) => log::info!("{json}"),
            Err(e) => log::error!("could not serialize transform: {e}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct TransformGizmo {
    attached: Option<NodeId>,
    mode: GizmoMode,
    // last pointer position while dragging
    drag: Option<(f32, f32)>,
}

impl TransformGizmo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, node: NodeId) {
        if self.attached != Some(node) {
            log::info!("gizmo attached to {node:?}");
        }
        self.attached = Some(node);
        self.drag = None;
    }

    pub fn detach(&mut self) {
        if let Some(node) = self.attached {
            log::info!("gizmo detached from {node:?}");
        }
        self.attached = None;
        self.drag = None;
    }

    pub fn attached(&self) -> Option<NodeId> {
        self.attached
    }

    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GizmoMode) {
        self.mode = mode;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// `t`, `r` and `s` switch modes, escape detaches. Returns whether the key was used.
    pub fn handle_key(&mut self, key: &Key) -> bool {
        let mode = match key {
            Key::Escape if self.attached.is_some() => {
                self.detach();
                return true;
            }
            k if k.is_char('t') => GizmoMode::Translate,
            k if k.is_char('r') => GizmoMode::Rotate,
            k if k.is_char('s') => GizmoMode::Scale,
            _ => return false,
        };
        if mode != self.mode {
            log::info!("gizmo mode {:?} -> {mode:?}", self.mode);
        }
        self.mode = mode;
        true
    }

    /// Start dragging if `hit` belongs to the attached node.
    pub fn begin_drag(&mut self, graph: &SceneGraph, hit: NodeId, x: f32, y: f32) -> bool {
        match self.attached {
            Some(attached) if graph.is_descendant_of(hit, attached) => {
                self.drag = Some((x, y));
                true
            }
            _ => false,
        }
    }

    /// Apply a drag to the pointer position `x`, `y`. Returns the new placement.
    pub fn drag_to(
        &mut self,
        graph: &mut SceneGraph,
        camera: &Camera,
        viewport_height: u32,
        x: f32,
        y: f32,
    ) -> Option<TransformRecord> {
        let node = self.attached?;
        let (last_x, last_y) = self.drag?;
        self.drag = Some((x, y));
        let (dx, dy) = (x - last_x, y - last_y);
        if dx == 0.0 && dy == 0.0 {
            return None;
        }

        match self.mode {
            GizmoMode::Translate => {
                let world = graph.world_matrix(node).transform_point(cgmath::Point3::origin());
                let distance = (world - camera.eye).magnitude();
                let half: Rad<f32> = camera.effective_fovy() / 2.0;
                let per_px = 2.0 * distance * half.0.tan() / viewport_height.max(1) as f32;
                let camera_up = camera.right().cross(camera.direction).normalize();
                let delta = camera.right() * (dx * per_px) - camera_up * (dy * per_px);
                let to_parent = graph
                    .node(node)
                    .parent()
                    .map(|p| graph.world_matrix(p))
                    .and_then(|m| m.invert())
                    .unwrap_or_else(Matrix4::identity);
                graph.node_mut(node).local.position += to_parent.transform_vector(delta);
            }
            GizmoMode::Rotate => {
                let local = &mut graph.node_mut(node).local;
                let yaw = Quaternion::from_angle_y(Rad(dx * ROTATE_PER_PX));
                let pitch = Quaternion::from_angle_x(Rad(dy * ROTATE_PER_PX));
                local.rotation = (local.rotation * yaw * pitch).normalize();
            }
            GizmoMode::Scale => {
                let local = &mut graph.node_mut(node).local;
                let factor = (1.0 - dy * SCALE_PER_PX).max(MIN_SCALE);
                local.scale = local.scale.map(|s| (s * factor).max(MIN_SCALE));
            }
        }
        let record = TransformRecord::of(graph, node);
        record.log();
        Some(record)
    }

    /// Returns whether a drag was in progress.
    pub fn end_drag(&mut self) -> bool {
        self.drag.take().is_some()
    }
}
