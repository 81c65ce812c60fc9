//! Point-in-solid classification by ray parity.

use blockmodel_math::{Aabb3, Point3, Vec3};
use blockmodel_mesh::TriangleMesh;

use crate::bvh::TriangleBvh;
use crate::ray::{ray_triangle, Crossing, Ray};
use crate::{Classification, ClassifyError, Result};

/// Ray directions tried in order until one gives a clean crossing count.
///
/// The first is nearly +X with a small tilt so axis-aligned meshes rarely
/// produce edge hits. The rest are spread over the sphere.
const DIRECTIONS: [[f64; 3]; 6] = [
    [1.0, 1e-7, 1.3e-7],
    [0.31, 0.57, 0.76],
    [-0.83, 0.29, 0.47],
    [0.13, -0.91, 0.39],
    [-0.42, -0.38, -0.82],
    [0.71, -0.23, -0.66],
];

/// Relative distance under which a point counts as lying on the surface.
const SURFACE_EPS: f64 = 1e-12;

/// Point-in-solid classifier over a closed envelope mesh.
///
/// A point on the surface counts as inside. Results are deterministic for
/// a given mesh and point.
#[derive(Debug, Clone)]
pub struct SolidClassifier {
    mesh: TriangleMesh,
    bvh: TriangleBvh,
    bounds: Aabb3,
    surface_eps: f64,
}

impl SolidClassifier {
    /// Build a classifier, taking ownership of the mesh.
    pub fn new(mesh: TriangleMesh) -> Result<Self> {
        if mesh.is_empty() {
            return Err(ClassifyError::EmptyMesh);
        }

        let open_edges = mesh.open_edge_count();
        if open_edges > 0 {
            tracing::warn!(
                open_edges,
                triangles = mesh.num_triangles(),
                "Envelope mesh is not closed, inside tests may be unreliable"
            );
        }

        let bvh = TriangleBvh::build(&mesh);
        let mut bounds = mesh.bounds();
        let surface_eps = SURFACE_EPS * bounds.diagonal().max(1.0);
        bounds.expand(surface_eps);

        tracing::debug!(
            triangles = mesh.num_triangles(),
            vertices = mesh.num_vertices(),
            "Built solid classifier"
        );

        Ok(Self {
            mesh,
            bvh,
            bounds,
            surface_eps,
        })
    }

    /// The envelope mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Classify a point as inside (`Positive`) or outside (`Negative`).
    pub fn classify(&self, point: &Point3) -> Classification {
        if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
            return Classification::Degenerate;
        }
        if !self.bounds.contains(point) {
            return Classification::Negative;
        }

        let mut candidates = Vec::new();
        for dir in DIRECTIONS {
            match self.cast(point, Vec3::new(dir[0], dir[1], dir[2]), &mut candidates) {
                Some(inside) => return Classification::from_bool(inside),
                None => continue,
            }
        }

        tracing::debug!(
            x = point.x,
            y = point.y,
            z = point.z,
            "Every ray direction was degenerate"
        );
        Classification::Degenerate
    }

    /// Test if a point is inside the envelope. Degenerate points are not.
    pub fn is_inside(&self, point: &Point3) -> bool {
        self.classify(point) == Classification::Positive
    }

    /// Cast one ray and return the parity, or `None` if any crossing along
    /// it was unreliable.
    fn cast(
        &self,
        point: &Point3,
        direction: Vec3,
        candidates: &mut Vec<u32>,
    ) -> Option<bool> {
        let ray = Ray::new(*point, direction);
        candidates.clear();
        self.bvh.ray_candidates(&ray, candidates);

        let mut crossings = 0usize;
        let mut degenerate = false;
        for &face in candidates.iter() {
            let tri = self.mesh.triangle(face as usize);
            match ray_triangle(&ray, &tri, self.surface_eps) {
                Crossing::Cross => crossings += 1,
                Crossing::OnSurface => return Some(true),
                Crossing::Degenerate => degenerate = true,
                Crossing::Miss => {}
            }
        }

        if degenerate {
            None
        } else {
            Some(crossings % 2 == 1)
        }
    }
}
