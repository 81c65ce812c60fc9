//! Ray representation and ray-triangle crossing tests.

use blockmodel_math::{Aabb3, Point3, Vec3};

/// A ray in 3D space defined by origin and unit direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Point3,
    /// Unit direction of the ray.
    pub direction: Vec3,
    /// Precomputed reciprocal of direction components for fast AABB tests.
    inv_direction: Vec3,
    /// Sign of direction components (0 if positive, 1 if negative).
    sign: [usize; 3],
}

impl Ray {
    /// Create a new ray from origin and direction.
    ///
    /// The direction will be normalized.
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        let dir = direction.normalize();
        let inv = Vec3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let sign = [
            usize::from(inv.x < 0.0),
            usize::from(inv.y < 0.0),
            usize::from(inv.z < 0.0),
        ];
        Self {
            origin,
            direction: dir,
            inv_direction: inv,
            sign,
        }
    }

    /// Evaluate the ray at parameter `t`: `origin + t * direction`.
    #[inline]
    pub fn at(&self, t: f64) -> Point3 {
        self.origin + t * self.direction
    }

    /// Test ray-AABB intersection using the slab method.
    ///
    /// Returns `Some((t_min, t_max))` with `t_min` clamped to 0, or `None`
    /// if the ray misses the box or the box is behind the origin.
    #[inline]
    pub fn intersect_aabb(&self, aabb: &Aabb3) -> Option<(f64, f64)> {
        let bounds = [aabb.min, aabb.max];

        let tx1 = (bounds[self.sign[0]].x - self.origin.x) * self.inv_direction.x;
        let tx2 = (bounds[1 - self.sign[0]].x - self.origin.x) * self.inv_direction.x;

        let mut t_min = tx1;
        let mut t_max = tx2;

        let ty1 = (bounds[self.sign[1]].y - self.origin.y) * self.inv_direction.y;
        let ty2 = (bounds[1 - self.sign[1]].y - self.origin.y) * self.inv_direction.y;

        t_min = t_min.max(ty1);
        t_max = t_max.min(ty2);

        let tz1 = (bounds[self.sign[2]].z - self.origin.z) * self.inv_direction.z;
        let tz2 = (bounds[1 - self.sign[2]].z - self.origin.z) * self.inv_direction.z;

        t_min = t_min.max(tz1);
        t_max = t_max.min(tz2);

        if t_max >= t_min && t_max >= 0.0 {
            Some((t_min.max(0.0), t_max))
        } else {
            None
        }
    }
}

/// Outcome of testing one triangle against a ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// The ray does not pass through the triangle.
    Miss,
    /// The ray crosses the triangle interior ahead of its origin.
    Cross,
    /// The ray origin lies on the triangle.
    OnSurface,
    /// Edge/vertex hit or in-plane ray: the crossing count is unreliable.
    Degenerate,
}

/// Barycentric margin for edge and vertex hits.
const EDGE_EPS: f64 = 1e-9;

/// Cosine below which a ray counts as parallel to a triangle plane.
const PARALLEL_EPS: f64 = 1e-12;

/// Möller-Trumbore ray-triangle test with degeneracy detection.
///
/// `surface_eps` is the absolute distance within which the ray origin is
/// considered to lie on the triangle.
pub fn ray_triangle(ray: &Ray, tri: &[Point3; 3], surface_eps: f64) -> Crossing {
    let [a, b, c] = tri;
    let edge1 = b - a;
    let edge2 = c - a;
    let normal = edge1.cross(&edge2);
    let area2 = normal.norm();
    if area2 == 0.0 {
        return Crossing::Miss;
    }

    let h = ray.direction.cross(&edge2);
    let det = edge1.dot(&h);
    let s = ray.origin - a;

    if det.abs() <= PARALLEL_EPS * area2 {
        let plane_dist = normal.dot(&s) / area2;
        if plane_dist.abs() <= surface_eps {
            // Ray slides along the triangle plane.
            return Crossing::Degenerate;
        }
        return Crossing::Miss;
    }

    let inv = 1.0 / det;
    let u = inv * s.dot(&h);
    if !(-EDGE_EPS..=1.0 + EDGE_EPS).contains(&u) {
        return Crossing::Miss;
    }

    let q = s.cross(&edge1);
    let v = inv * ray.direction.dot(&q);
    if v < -EDGE_EPS || u + v > 1.0 + EDGE_EPS {
        return Crossing::Miss;
    }

    let t = inv * edge2.dot(&q);
    if t.abs() <= surface_eps {
        return Crossing::OnSurface;
    }
    if t < 0.0 {
        return Crossing::Miss;
    }

    if u < EDGE_EPS || v < EDGE_EPS || u + v > 1.0 - EDGE_EPS {
        return Crossing::Degenerate;
    }
    Crossing::Cross
}
