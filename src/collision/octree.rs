//! Octree over static triangles.
//!
//! The walking player asks it whether its capsule overlaps the room and how far it
//! has to be pushed back out. Cells split eight ways until they hold at most
//! [`MAX_TRIANGLES_PER_CELL`] triangles or reach [`MAX_DEPTH`]; a triangle that
//! straddles a cell boundary is referenced from every cell it touches.

use cgmath::{EuclideanSpace, InnerSpace, Vector3};

use crate::collision::{
    EPSILON, Triangle, aabb::Aabb, capsule::Capsule, ray::Ray, segment_closest_points,
};

const MAX_TRIANGLES_PER_CELL: usize = 8;
const MAX_DEPTH: u32 = 16;

/// How to resolve an overlap: move the capsule by `normal * depth`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub normal: Vector3<f32>,
    pub depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vector3<f32>,
    pub normal: Vector3<f32>,
}

#[derive(Debug, Default)]
pub struct Octree {
    triangles: Vec<Triangle>,
    root: Option<Cell>,
}

#[derive(Debug)]
struct Cell {
    bounds: Aabb,
    // only leaves hold triangles
    triangles: Vec<usize>,
    children: Vec<Cell>,
}

impl Octree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triangles(triangles: impl IntoIterator<Item = Triangle>) -> Self {
        let mut octree = Self::new();
        octree.add_triangles(triangles);
        octree.build();
        octree
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Queue more geometry. Queries ignore it until the next [`build`](Self::build).
    pub fn add_triangles(&mut self, triangles: impl IntoIterator<Item = Triangle>) {
        self.triangles.extend(triangles);
        self.root = None;
    }

    pub fn build(&mut self) {
        let Some(mut bounds) =
            Aabb::from_points(self.triangles.iter().flat_map(|t| t.points()))
        else {
            self.root = None;
            return;
        };
        // flat rooms would otherwise produce zero-height cells
        let pad = Vector3::new(0.01, 0.01, 0.01);
        bounds.min -= pad;
        bounds.max += pad;

        let mut root = Cell {
            bounds,
            triangles: (0..self.triangles.len()).collect(),
            children: Vec::new(),
        };
        root.split(0, &self.triangles);
        log::debug!("octree rebuilt over {} triangles", self.triangles.len());
        self.root = Some(root);
    }

    /// Candidate triangles whose cells overlap `capsule`, without duplicates.
    fn capsule_triangles(&self, capsule: &Capsule) -> Vec<usize> {
        let mut found = Vec::new();
        if let Some(root) = &self.root {
            let mut stack = vec![root];
            while let Some(cell) = stack.pop() {
                if !capsule.intersects_aabb(&cell.bounds) {
                    continue;
                }
                found.extend_from_slice(&cell.triangles);
                stack.extend(cell.children.iter());
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Push a copy of `capsule` out of every triangle it overlaps and report the
    /// total displacement. `None` when it is free.
    pub fn capsule_intersect(&self, capsule: &Capsule) -> Option<Contact> {
        let mut moved = *capsule;
        let mut hit = false;
        for index in self.capsule_triangles(capsule) {
            if let Some(contact) = triangle_capsule_contact(&moved, &self.triangles[index]) {
                hit = true;
                moved.translate(contact.normal * contact.depth);
            }
        }
        if !hit {
            return None;
        }
        let displacement = moved.center() - capsule.center();
        let depth = displacement.magnitude();
        (depth > EPSILON).then(|| Contact {
            normal: displacement / depth,
            depth,
        })
    }

    /// Nearest triangle along `ray`.
    pub fn ray_intersect(&self, ray: &Ray) -> Option<RayHit> {
        let root = self.root.as_ref()?;
        let mut best: Option<RayHit> = None;
        let mut stack = vec![root];
        while let Some(cell) = stack.pop() {
            match ray.intersect_aabb(&cell.bounds) {
                Some(entry) if best.is_none_or(|b| entry <= b.distance) => {}
                _ => continue,
            }
            for &index in &cell.triangles {
                let triangle = &self.triangles[index];
                if let Some(distance) = ray.intersect_triangle(triangle) {
                    if best.is_none_or(|b| distance < b.distance) {
                        best = Some(RayHit {
                            distance,
                            point: ray.point_at(distance).to_vec(),
                            normal: triangle.normal(),
                        });
                    }
                }
            }
            stack.extend(cell.children.iter());
        }
        best
    }
}

impl Cell {
    fn split(&mut self, level: u32, triangles: &[Triangle]) {
        let half = self.bounds.size() * 0.5;
        let mut children: Vec<Cell> = (0..8)
            .map(|i| {
                let offset = Vector3::new(
                    (i & 1) as f32 * half.x,
                    ((i >> 1) & 1) as f32 * half.y,
                    ((i >> 2) & 1) as f32 * half.z,
                );
                let min = self.bounds.min + offset;
                Cell {
                    bounds: Aabb::new(min, min + half),
                    triangles: Vec::new(),
                    children: Vec::new(),
                }
            })
            .collect();

        for index in self.triangles.drain(..) {
            for child in children.iter_mut() {
                if child.bounds.intersects_triangle(&triangles[index]) {
                    child.triangles.push(index);
                }
            }
        }

        for mut child in children {
            let len = child.triangles.len();
            if len > MAX_TRIANGLES_PER_CELL && level < MAX_DEPTH {
                child.split(level + 1, triangles);
            }
            if len != 0 {
                self.children.push(child);
            }
        }
    }
}

fn triangle_capsule_contact(capsule: &Capsule, triangle: &Triangle) -> Option<Contact> {
    let normal = triangle.normal();
    if normal.magnitude2() == 0.0 {
        return None;
    }
    let r = capsule.radius;
    let d1 = triangle.plane_distance(capsule.start) - r;
    let d2 = triangle.plane_distance(capsule.end) - r;
    if (d1 > 0.0 && d2 > 0.0) || (d1 < -r && d2 < -r) {
        return None;
    }

    let sum = d1.abs() + d2.abs();
    let delta = if sum > 0.0 { (d1 / sum).abs() } else { 0.0 };
    let point = capsule.start + (capsule.end - capsule.start) * delta;
    if triangle.contains_point(point) {
        return Some(Contact {
            normal,
            depth: d1.min(d2).abs(),
        });
    }

    let r2 = r * r;
    let edges = [
        (triangle.a, triangle.b),
        (triangle.b, triangle.c),
        (triangle.c, triangle.a),
    ];
    for (p, q) in edges {
        let (on_capsule, on_edge) = segment_closest_points(capsule.start, capsule.end, p, q);
        let away = on_capsule - on_edge;
        let distance2 = away.magnitude2();
        if distance2 < r2 && distance2 > 0.0 {
            let distance = distance2.sqrt();
            return Some(Contact {
                normal: away / distance,
                depth: r - distance,
            });
        }
    }
    None
}
