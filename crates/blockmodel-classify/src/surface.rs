//! Point-above-surface classification by closest point.
//!
//! The query height is compared with the height of the closest point on the
//! surface in full 3D, not with a vertical projection. On folded or steep
//! surfaces the closest point can lie laterally far from the query, so the
//! answer differs from a vertical ray test there.

use blockmodel_math::{Point3, Vec3};
use blockmodel_mesh::TriangleMesh;

use crate::bvh::TriangleBvh;
use crate::{Classification, ClassifyError, Result};

/// Above/below classifier over an open surface mesh.
#[derive(Debug, Clone)]
pub struct SurfaceClassifier {
    mesh: TriangleMesh,
    bvh: TriangleBvh,
}

impl SurfaceClassifier {
    /// Build a classifier, taking ownership of the mesh.
    pub fn new(mesh: TriangleMesh) -> Result<Self> {
        if mesh.is_empty() {
            return Err(ClassifyError::EmptyMesh);
        }
        let bvh = TriangleBvh::build(&mesh);
        tracing::debug!(
            triangles = mesh.num_triangles(),
            vertices = mesh.num_vertices(),
            "Built surface classifier"
        );
        Ok(Self { mesh, bvh })
    }

    /// The surface mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Closest point on the surface, or `None` for a non-finite query.
    ///
    /// Equidistant triangles resolve to the lowest face index.
    pub fn closest_point(&self, point: &Point3) -> Option<Point3> {
        if !is_finite(point) {
            return None;
        }
        self.bvh
            .nearest(point, |face| {
                let [a, b, c] = self.mesh.triangle(face as usize);
                let q = closest_point_on_triangle(point, &a, &b, &c);
                ((q - point).norm_squared(), q)
            })
            .map(|(_, closest, _)| closest)
    }

    /// Classify a point as above (`Positive`) or not above (`Negative`).
    pub fn classify(&self, point: &Point3) -> Classification {
        match self.closest_point(point) {
            Some(closest) if is_finite(&closest) => Classification::from_bool(point.z > closest.z),
            _ => Classification::Degenerate,
        }
    }

    /// Test if a point lies strictly above its closest surface point.
    pub fn is_above(&self, point: &Point3) -> bool {
        self.classify(point) == Classification::Positive
    }
}

fn is_finite(p: &Point3) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

/// Closest point on triangle `abc` to `p`.
///
/// Voronoi-region walk (Ericson, Real-Time Collision Detection 5.1.5).
/// Zero-area triangles fall back to the nearest of their edges.
pub fn closest_point_on_triangle(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> Point3 {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(&ac).norm_squared() == 0.0 {
        return closest_on_degenerate(p, a, b, c);
    }

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

fn closest_on_degenerate(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> Point3 {
    let mut best = *a;
    let mut best_d = f64::INFINITY;
    for (s, e) in [(a, b), (b, c), (c, a)] {
        let q = closest_on_segment(p, s, &(e - s));
        let d = (q - p).norm_squared();
        if d < best_d {
            best_d = d;
            best = q;
        }
    }
    best
}

fn closest_on_segment(p: &Point3, start: &Point3, dir: &Vec3) -> Point3 {
    let len_sq = dir.norm_squared();
    if len_sq == 0.0 {
        return *start;
    }
    let t = ((p - start).dot(dir) / len_sq).clamp(0.0, 1.0);
    start + dir * t
}
