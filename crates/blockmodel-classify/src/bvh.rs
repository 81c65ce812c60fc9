//! Bounding Volume Hierarchy over mesh triangles.
//!
//! Uses Surface Area Heuristic (SAH) for construction. Supports ray
//! candidate gathering (point-in-solid) and exact nearest-triangle search
//! (point-above-surface).

use blockmodel_math::{Aabb3, Point3};
use blockmodel_mesh::TriangleMesh;

use crate::ray::Ray;

/// Maximum triangles per leaf.
const LEAF_SIZE: usize = 4;

/// A BVH node - either a leaf containing faces or an internal node with children.
#[derive(Debug, Clone)]
pub enum BvhNode {
    /// Leaf node containing face indices.
    Leaf {
        /// Axis-aligned bounding box of this node.
        aabb: Aabb3,
        /// Face indices contained in this leaf.
        faces: Vec<u32>,
    },
    /// Internal node with two children.
    Internal {
        /// Axis-aligned bounding box of this node.
        aabb: Aabb3,
        /// Left child node.
        left: Box<BvhNode>,
        /// Right child node.
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Per-face build data: index, bounds, centroid.
type FaceData = (u32, Aabb3, Point3);

/// Bounding Volume Hierarchy over the triangles of one mesh.
#[derive(Debug, Clone)]
pub struct TriangleBvh {
    root: Option<BvhNode>,
}

impl TriangleBvh {
    /// Build a BVH over all triangles of a mesh.
    pub fn build(mesh: &TriangleMesh) -> Self {
        let mut face_data: Vec<FaceData> = mesh
            .triangles()
            .enumerate()
            .map(|(i, tri)| {
                let aabb = Aabb3::from_points(&tri);
                (i as u32, aabb, aabb.center())
            })
            .collect();

        let root = if face_data.is_empty() {
            None
        } else {
            Some(build_node(&mut face_data))
        };

        Self { root }
    }

    /// Get a reference to the root node, if any.
    pub fn root(&self) -> Option<&BvhNode> {
        self.root.as_ref()
    }

    /// Collect faces whose bounds the ray passes through.
    pub fn ray_candidates(&self, ray: &Ray, out: &mut Vec<u32>) {
        if let Some(ref root) = self.root {
            collect_ray(ray, root, out);
        }
    }

    /// Find the face minimising `distance_sq(face)` from `point`.
    ///
    /// `distance_sq` returns the squared distance from `point` to a face
    /// and the closest point on it. Exact ties resolve to the lowest face
    /// index, matching a linear first-minimum scan.
    pub fn nearest<F>(&self, point: &Point3, distance_sq: F) -> Option<(u32, Point3, f64)>
    where
        F: Fn(u32) -> (f64, Point3),
    {
        let root = self.root.as_ref()?;
        let mut best: Option<(u32, Point3, f64)> = None;
        nearest_node(point, root, &distance_sq, &mut best);
        best
    }
}

fn collect_ray(ray: &Ray, node: &BvhNode, out: &mut Vec<u32>) {
    match node {
        BvhNode::Leaf { aabb, faces } => {
            if ray.intersect_aabb(aabb).is_some() {
                out.extend_from_slice(faces);
            }
        }
        BvhNode::Internal { aabb, left, right } => {
            if ray.intersect_aabb(aabb).is_some() {
                collect_ray(ray, left, out);
                collect_ray(ray, right, out);
            }
        }
    }
}

fn nearest_node<F>(
    point: &Point3,
    node: &BvhNode,
    distance_sq: &F,
    best: &mut Option<(u32, Point3, f64)>,
) where
    F: Fn(u32) -> (f64, Point3),
{
    // Boxes at exactly the best distance may still hold a lower-index tie.
    if let Some((_, _, d)) = best {
        if node.aabb().distance_squared(point) > *d {
            return;
        }
    }

    match node {
        BvhNode::Leaf { faces, .. } => {
            for &face in faces {
                let (d, closest) = distance_sq(face);
                let better = match best {
                    None => true,
                    Some((bf, _, bd)) => d < *bd || (d == *bd && face < *bf),
                };
                if better {
                    *best = Some((face, closest, d));
                }
            }
        }
        BvhNode::Internal { left, right, .. } => {
            // Visit the nearer child first for tighter pruning.
            let dl = left.aabb().distance_squared(point);
            let dr = right.aabb().distance_squared(point);
            if dl <= dr {
                nearest_node(point, left, distance_sq, best);
                nearest_node(point, right, distance_sq, best);
            } else {
                nearest_node(point, right, distance_sq, best);
                nearest_node(point, left, distance_sq, best);
            }
        }
    }
}

/// Build a BVH node recursively using SAH.
fn build_node(face_data: &mut [FaceData]) -> BvhNode {
    let mut bounds = Aabb3::empty();
    for (_, aabb, _) in face_data.iter() {
        bounds.include_aabb(aabb);
    }

    if face_data.len() <= LEAF_SIZE {
        return BvhNode::Leaf {
            aabb: bounds,
            faces: face_data.iter().map(|(id, _, _)| *id).collect(),
        };
    }

    let (best_axis, best_pos) = find_best_split(face_data, &bounds);
    let mut mid = partition_faces(face_data, best_axis, best_pos);

    // Fallback if partition fails: split in the middle.
    if mid == 0 || mid == face_data.len() {
        mid = face_data.len() / 2;
    }

    let (left_data, right_data) = face_data.split_at_mut(mid);

    BvhNode::Internal {
        aabb: bounds,
        left: Box::new(build_node(left_data)),
        right: Box::new(build_node(right_data)),
    }
}

/// Find the best split axis and position using SAH.
fn find_best_split(face_data: &[FaceData], bounds: &Aabb3) -> (usize, f64) {
    const NUM_BUCKETS: usize = 12;

    let mut best_cost = f64::INFINITY;
    let mut best_axis = 0;
    let mut best_pos = 0.0;
    let total_area = surface_area(bounds);

    for axis in 0..3 {
        let (axis_min, axis_max) = bounds.axis_range(axis);
        let axis_extent = axis_max - axis_min;
        if axis_extent < 1e-10 {
            continue;
        }

        let mut bucket_counts = [0usize; NUM_BUCKETS];
        let mut bucket_bounds = [Aabb3::empty(); NUM_BUCKETS];

        for (_, aabb, centroid) in face_data {
            let b = ((centroid[axis] - axis_min) / axis_extent * NUM_BUCKETS as f64) as usize;
            let b = b.min(NUM_BUCKETS - 1);
            bucket_counts[b] += 1;
            bucket_bounds[b].include_aabb(aabb);
        }

        for split in 1..NUM_BUCKETS {
            let mut left_count = 0;
            let mut left_bounds = Aabb3::empty();
            for i in 0..split {
                left_count += bucket_counts[i];
                if bucket_counts[i] > 0 {
                    left_bounds.include_aabb(&bucket_bounds[i]);
                }
            }

            let mut right_count = 0;
            let mut right_bounds = Aabb3::empty();
            for i in split..NUM_BUCKETS {
                right_count += bucket_counts[i];
                if bucket_counts[i] > 0 {
                    right_bounds.include_aabb(&bucket_bounds[i]);
                }
            }

            if left_count == 0 || right_count == 0 {
                continue;
            }

            // SAH cost: traversal + P(left) * N_left + P(right) * N_right
            let cost = if total_area > 0.0 {
                0.125
                    + surface_area(&left_bounds) / total_area * left_count as f64
                    + surface_area(&right_bounds) / total_area * right_count as f64
            } else {
                (left_count.max(right_count)) as f64
            };

            if cost < best_cost {
                best_cost = cost;
                best_axis = axis;
                best_pos = axis_min + (split as f64 / NUM_BUCKETS as f64) * axis_extent;
            }
        }
    }

    (best_axis, best_pos)
}

/// Partition faces by centroid along an axis.
fn partition_faces(face_data: &mut [FaceData], axis: usize, pos: f64) -> usize {
    let mut left = 0;
    let mut right = face_data.len();

    while left < right {
        if face_data[left].2[axis] < pos {
            left += 1;
        } else {
            right -= 1;
            face_data.swap(left, right);
        }
    }

    left
}

/// Compute surface area of an AABB.
fn surface_area(aabb: &Aabb3) -> f64 {
    let d = aabb.max - aabb.min;
    2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
}
