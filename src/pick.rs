//! Object picking and selection.
//!
//! Picking is done on the CPU: a click is turned into a ray from the camera, the
//! ray is tested against every mesh below the pickable roots, and the nearest hit
//! is mapped to the closest ancestor that carries [`NodeData`](crate::options::NodeData).
//!
//! 1. [`ClickTracker`] rejects presses that turned into drags
//! 2. [`pointer_to_ndc`] maps the release position to normalized device coordinates
//! 3. [`raycast`] collects the hits, nearest first
//! 4. [`find_tagged`] finds the node that owns the hit mesh

use cgmath::{InnerSpace, Point3, SquareMatrix, Transform, Vector2};

use crate::{
    collision::{Triangle, ray::Ray},
    data_structures::scene_graph::{NodeId, SceneGraph},
};

/// A pointer may travel this far (per axis, in pixels) between press and release
/// and still count as a click.
pub const CLICK_TOLERANCE_PX: f32 = 3.0;

/// Remembers where the pointer went down so releases after a drag can be ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClickTracker {
    down: Option<(f32, f32)>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, x: f32, y: f32) {
        self.down = Some((x, y));
    }

    /// Returns the release position if it completes a click.
    pub fn release(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        let (dx, dy) = self.down.take()?;
        if (x - dx).abs() > CLICK_TOLERANCE_PX || (y - dy).abs() > CLICK_TOLERANCE_PX {
            return None;
        }
        Some((x, y))
    }

    pub fn is_pressed(&self) -> bool {
        self.down.is_some()
    }
}

/// Pixel position inside a `width` x `height` viewport to NDC, y pointing up.
pub fn pointer_to_ndc(x: f32, y: f32, width: u32, height: u32) -> Vector2<f32> {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    Vector2::new(x / w * 2.0 - 1.0, -(y / h) * 2.0 + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// The mesh node that was hit.
    pub node: NodeId,
    /// World space distance from the ray origin.
    pub distance: f32,
    pub point: Point3<f32>,
}

/// Intersect `ray` (world space) with every visible mesh at or below `roots`.
pub fn raycast(graph: &SceneGraph, roots: &[NodeId], ray: &Ray) -> Vec<Hit> {
    let mut hits = Vec::new();
    for &root in roots {
        if !graph.contains(root) {
            continue;
        }
        for id in graph.descendants(root) {
            let node = graph.node(id);
            let Some(mesh) = node.mesh.as_ref() else {
                continue;
            };
            if !graph.is_visible(id) {
                continue;
            }
            let world = graph.world_matrix(id);
            let Some(inverse) = world.invert() else {
                // degenerate scale, nothing to hit
                continue;
            };
            let local_ray = ray.transform(&inverse);
            if let Some(bounds) = mesh.bounds() {
                if local_ray.intersect_aabb(&bounds).is_none() {
                    continue;
                }
            }
            let nearest = mesh
                .triangles()
                .filter_map(|t| local_ray.intersect_triangle(&Triangle::from(t)))
                .min_by(f32::total_cmp);
            if let Some(t) = nearest {
                let point = world.transform_point(local_ray.point_at(t));
                hits.push(Hit {
                    node: id,
                    distance: (point - ray.origin).magnitude(),
                    point,
                });
            }
        }
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// The first node, starting at `node` and walking up its parents, that carries data.
pub fn find_tagged(graph: &SceneGraph, node: NodeId) -> Option<NodeId> {
    graph
        .ancestors(node)
        .find(|&id| graph.node(id).data.is_some())
}

/// Where the viewer lands after clicking a floor at `point`.
pub fn teleport_target(point: Point3<f32>, eye_height: f32) -> Point3<f32> {
    Point3::new(point.x, eye_height, point.z)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cgmath::{EuclideanSpace, Vector3};
    use image::RgbaImage;

    use super::*;
    use crate::{
        data_structures::{geometry::MeshData, instance::Instance},
        options::NodeData,
    };

    fn picture() -> MeshData {
        MeshData::picture_box(4.0, 2.0, 0.5, Arc::new(RgbaImage::new(2, 1)))
    }

    #[test]
    fn drags_beyond_the_tolerance_are_not_clicks() {
        let mut clicks = ClickTracker::new();
        clicks.press(100.0, 100.0);
        assert_eq!(clicks.release(103.0, 97.0), Some((103.0, 97.0)));

        clicks.press(100.0, 100.0);
        assert_eq!(clicks.release(103.5, 100.0), None);

        // a release without a press
        assert_eq!(clicks.release(100.0, 100.0), None);
    }

    #[test]
    fn ndc_flips_y() {
        assert_eq!(pointer_to_ndc(0.0, 0.0, 800, 600), Vector2::new(-1.0, 1.0));
        assert_eq!(
            pointer_to_ndc(400.0, 300.0, 800, 600),
            Vector2::new(0.0, 0.0)
        );
        assert_eq!(
            pointer_to_ndc(800.0, 600.0, 800, 600),
            Vector2::new(1.0, -1.0)
        );
    }

    #[test]
    fn nearest_hit_comes_first_in_world_units() {
        let mut graph = SceneGraph::new("scene");
        let near = graph.add_mesh_node(
            graph.root(),
            "near",
            Instance::from(Vector3::new(0.0, 0.0, -5.0)),
            picture(),
        );
        let far = graph.add_mesh_node(
            graph.root(),
            "far",
            Instance::new()
                .with_position(Vector3::new(0.0, 0.0, -20.0))
                .with_uniform_scale(3.0),
            picture(),
        );
        let ray = Ray::new(Point3::origin(), -Vector3::unit_z());

        let hits = raycast(&graph, &[far, near], &ray);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node, near);
        // front face of the near box sits at z = -5 + 0.25
        assert!((hits[0].distance - 4.75).abs() < 1e-4);
        // the far box is scaled, its front face at z = -20 + 0.75
        assert!((hits[1].distance - 19.25).abs() < 1e-3);
    }

    #[test]
    fn only_pickable_roots_are_tested() {
        let mut graph = SceneGraph::new("scene");
        let group = graph.add_node(graph.root(), "group", Instance::new());
        let ahead = Instance::from(Vector3::new(0.0, 0.0, -5.0));
        graph.add_mesh_node(group, "box", ahead, picture());
        let ray = Ray::new(Point3::origin(), -Vector3::unit_z());

        assert!(raycast(&graph, &[], &ray).is_empty());
        assert_eq!(raycast(&graph, &[group], &ray).len(), 1);

        graph.node_mut(group).visible = false;
        assert!(raycast(&graph, &[group], &ray).is_empty());
    }

    #[test]
    fn tagged_ancestor_is_found_through_untagged_parents() {
        let mut graph = SceneGraph::new("scene");
        let robot = graph.add_node(graph.root(), "robot", Instance::new());
        graph.node_mut(robot).data = Some(NodeData::Entity { id: "robot".into() });
        let mut leaf = robot;
        for i in 0..50 {
            leaf = graph.add_node(leaf, &format!("bone{i}"), Instance::new());
        }

        assert_eq!(find_tagged(&graph, leaf), Some(robot));
        assert_eq!(find_tagged(&graph, robot), Some(robot));
        assert_eq!(find_tagged(&graph, graph.root()), None);
    }

    #[test]
    fn teleport_keeps_the_floor_position_at_eye_height() {
        let target = teleport_target(Point3::new(3.0, -10.0, 4.0), 1.5);
        assert_eq!(target, Point3::new(3.0, 1.5, 4.0));
    }
}
