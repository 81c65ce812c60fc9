//! Indexed mesh construction from raw face records.
//!
//! Each 3- or 4-cornered planar face contributes one or two triangles. Quads
//! are split as a fan from corner 0 ({0,1,2} and {0,2,3}); this assumes the
//! corners describe a convex planar quad and is not a general polygon
//! triangulation. Bow-tie quads produce a malformed mesh without warning.

use std::collections::HashMap;

use blockmodel_math::{Point3, Tolerance};

use crate::error::{MeshError, Result};
use crate::{MeshKind, TriangleMesh};

/// DXF entity type of a face record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    /// `3DFACE`: three or four corners.
    Face3d,
    /// `POLYLINE` (including polyface meshes).
    Polyline,
    /// `LWPOLYLINE`.
    LwPolyline,
    /// Any other entity type, by DXF name.
    Other(String),
}

impl EntityKind {
    /// Map a DXF entity name to a kind.
    pub fn from_dxf_name(name: &str) -> Self {
        match name {
            "3DFACE" => Self::Face3d,
            "POLYLINE" => Self::Polyline,
            "LWPOLYLINE" => Self::LwPolyline,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One raw entity from the DXF feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    /// Entity type discriminator.
    pub kind: EntityKind,
    /// Corner coordinates (3 or 4 for a usable face).
    pub corners: Vec<Point3>,
}

impl FaceRecord {
    /// A `3DFACE` record with the given corners.
    pub fn face3d(corners: impl Into<Vec<Point3>>) -> Self {
        Self {
            kind: EntityKind::Face3d,
            corners: corners.into(),
        }
    }

    /// A triangular `3DFACE`.
    pub fn triangle(a: Point3, b: Point3, c: Point3) -> Self {
        Self::face3d(vec![a, b, c])
    }

    /// A quadrilateral `3DFACE`.
    pub fn quad(a: Point3, b: Point3, c: Point3, d: Point3) -> Self {
        Self::face3d(vec![a, b, c, d])
    }

    fn is_usable(&self) -> bool {
        matches!(self.corners.len(), 3 | 4)
            && self
                .corners
                .iter()
                .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
    }
}

/// Counters from one mesh build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Entity records examined.
    pub entities: usize,
    /// Records ignored because they are not planar faces.
    pub ignored: usize,
    /// Face records rejected (wrong corner count or non-finite coordinates).
    pub skipped: usize,
    /// Triangles emitted.
    pub triangles: usize,
    /// Unique vertices after deduplication.
    pub vertices: usize,
}

/// Builds [`TriangleMesh`]es from face records.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshBuilder {
    tolerance: Tolerance,
}

impl MeshBuilder {
    /// Create a builder with the given vertex tolerance.
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    /// Vertex tolerance in use.
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Build a mesh, failing with [`MeshError::NoGeometry`] if no face qualifies.
    ///
    /// Only `3DFACE` records participate in either mode; every other entity
    /// type is ignored.
    pub fn build(&self, faces: &[FaceRecord], mode: MeshKind) -> Result<TriangleMesh> {
        self.build_with_report(faces, mode).map(|(mesh, _)| mesh)
    }

    /// Build a mesh and return the build counters alongside it.
    pub fn build_with_report(
        &self,
        faces: &[FaceRecord],
        mode: MeshKind,
    ) -> Result<(TriangleMesh, BuildReport)> {
        let mut index = VertexIndex::new(self.tolerance);
        let mut triangles: Vec<[u32; 3]> = Vec::with_capacity(faces.len() * 2);
        let mut report = BuildReport {
            entities: faces.len(),
            ..Default::default()
        };

        for face in faces {
            if face.kind != EntityKind::Face3d {
                report.ignored += 1;
                continue;
            }
            if !face.is_usable() {
                report.skipped += 1;
                continue;
            }

            let ids: Vec<u32> = face
                .corners
                .iter()
                .map(|p| index.find_or_insert(*p))
                .collect();

            triangles.push([ids[0], ids[1], ids[2]]);
            if ids.len() == 4 && !self.tolerance.points_equal(&face.corners[2], &face.corners[3]) {
                triangles.push([ids[0], ids[2], ids[3]]);
            }
        }

        report.triangles = triangles.len();
        report.vertices = index.vertices.len();

        tracing::debug!(
            ?mode,
            entities = report.entities,
            ignored = report.ignored,
            skipped = report.skipped,
            triangles = report.triangles,
            vertices = report.vertices,
            "Built mesh from face records"
        );

        if triangles.is_empty() {
            return Err(MeshError::NoGeometry {
                entities: report.entities,
                skipped: report.skipped,
            });
        }

        let mesh = TriangleMesh::from_parts(index.vertices, triangles, mode)?;
        Ok((mesh, report))
    }
}

/// Vertex deduplication index.
///
/// Matches a linear first-match scan over the accumulated vertices: the
/// returned index is the lowest one within tolerance. Candidates come from a
/// hash grid whose cells are twice the tolerance wide, so any match lies in
/// the 27-cell neighbourhood of the query.
struct VertexIndex {
    tolerance: Tolerance,
    cell: f64,
    vertices: Vec<Point3>,
    grid: HashMap<[i64; 3], Vec<u32>>,
}

impl VertexIndex {
    fn new(tolerance: Tolerance) -> Self {
        let linear = tolerance.linear.max(0.0);
        Self {
            tolerance: Tolerance::new(linear),
            cell: 2.0 * linear,
            vertices: Vec::new(),
            grid: HashMap::new(),
        }
    }

    fn key(&self, p: &Point3) -> [i64; 3] {
        if self.cell > 0.0 {
            [
                (p.x / self.cell).floor() as i64,
                (p.y / self.cell).floor() as i64,
                (p.z / self.cell).floor() as i64,
            ]
        } else {
            // Exact matching: -0.0 and 0.0 must share a key.
            [
                (p.x + 0.0).to_bits() as i64,
                (p.y + 0.0).to_bits() as i64,
                (p.z + 0.0).to_bits() as i64,
            ]
        }
    }

    fn find(&self, p: &Point3) -> Option<u32> {
        let key = self.key(p);
        if self.cell <= 0.0 {
            return self.grid.get(&key).and_then(|ids| ids.first().copied());
        }

        let mut best: Option<u32> = None;
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                for dz in -1i64..=1 {
                    let neighbour = [
                        key[0].saturating_add(dx),
                        key[1].saturating_add(dy),
                        key[2].saturating_add(dz),
                    ];
                    let Some(ids) = self.grid.get(&neighbour) else {
                        continue;
                    };
                    for &id in ids {
                        if best.is_some_and(|b| b <= id) {
                            // Buckets are filled in index order.
                            break;
                        }
                        if self.tolerance.points_equal(&self.vertices[id as usize], p) {
                            best = Some(id);
                            break;
                        }
                    }
                }
            }
        }
        best
    }

    fn find_or_insert(&mut self, p: Point3) -> u32 {
        if let Some(id) = self.find(&p) {
            return id;
        }
        let id = self.vertices.len() as u32;
        let key = self.key(&p);
        self.vertices.push(p);
        self.grid.entry(key).or_default().push(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// Six outward quads of the unit cube.
    fn unit_cube_faces() -> Vec<FaceRecord> {
        let c = [
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(0.0, 1.0, 1.0),
        ];
        [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [0, 4, 7, 3],
            [1, 2, 6, 5],
        ]
        .iter()
        .map(|q| FaceRecord::quad(c[q[0]], c[q[1]], c[q[2]], c[q[3]]))
        .collect()
    }

    #[test]
    fn test_unit_cube_from_quads() {
        let mesh = MeshBuilder::default()
            .build(&unit_cube_faces(), MeshKind::Solid)
            .unwrap();
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_triangles(), 12);
        assert_eq!(mesh.open_edge_count(), 0);
        assert_eq!(mesh.kind(), MeshKind::Solid);
    }

    #[test]
    fn test_quad_split() {
        let (a, b, c, d) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0));
        let mesh = MeshBuilder::default()
            .build(&[FaceRecord::quad(a, b, c, d)], MeshKind::Surface)
            .unwrap();
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_degenerate_quad_is_one_triangle() {
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0));
        let d = p(1.0, 1.0 + 1e-12, 0.0);
        let mesh = MeshBuilder::default()
            .build(&[FaceRecord::quad(a, b, c, d)], MeshKind::Surface)
            .unwrap();
        assert_eq!(mesh.num_triangles(), 1);
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let faces = unit_cube_faces();
        let builder = MeshBuilder::new(Tolerance::new(1e-9));
        let first = builder.build(&faces, MeshKind::Solid).unwrap();
        let second = builder.build(&faces, MeshKind::Solid).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_near_vertices_merge_within_tolerance() {
        let faces = vec![
            FaceRecord::triangle(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)),
            FaceRecord::triangle(
                p(1.0 + 4e-10, 0.0, 0.0),
                p(1.0, 1.0, 0.0),
                p(0.0, 1.0 - 4e-10, 0.0),
            ),
        ];
        let mesh = MeshBuilder::default().build(&faces, MeshKind::Surface).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.faces()[1], [1, 3, 2]);
    }

    #[test]
    fn test_first_match_wins() {
        // Third corner of the second face is within tolerance of both
        // vertex 1 and vertex 2; the lower index must be reused.
        let tol = Tolerance::new(0.5);
        let faces = vec![
            FaceRecord::triangle(p(10.0, 0.0, 0.0), p(0.0, 0.0, 0.0), p(0.8, 0.0, 0.0)),
            FaceRecord::triangle(p(10.0, 10.0, 0.0), p(20.0, 0.0, 0.0), p(0.4, 0.0, 0.0)),
        ];
        let mesh = MeshBuilder::new(tol).build(&faces, MeshKind::Surface).unwrap();
        assert_eq!(mesh.faces()[1][2], 1);
    }

    #[test]
    fn test_matches_linear_scan() {
        let tol = Tolerance::new(0.05);
        let mut faces = Vec::new();
        for i in 0..40 {
            let f = i as f64 * 0.037;
            faces.push(FaceRecord::triangle(
                p(f, (f * 3.1).sin(), 0.0),
                p(f + 0.03, (f * 1.7).cos(), 0.02),
                p((f * 0.9).fract(), 0.5, -0.01 * f),
            ));
        }
        let mesh = MeshBuilder::new(tol).build(&faces, MeshKind::Surface).unwrap();

        // Brute-force reference.
        let mut verts: Vec<Point3> = Vec::new();
        let mut tris = Vec::new();
        for face in &faces {
            let mut ids = Vec::new();
            for c in &face.corners {
                let id = match verts.iter().position(|v| tol.points_equal(v, c)) {
                    Some(i) => i as u32,
                    None => {
                        verts.push(*c);
                        (verts.len() - 1) as u32
                    }
                };
                ids.push(id);
            }
            tris.push([ids[0], ids[1], ids[2]]);
        }
        assert_eq!(mesh.vertices(), verts.as_slice());
        assert_eq!(mesh.faces(), tris.as_slice());
    }

    #[test]
    fn test_zero_tolerance_merges_signed_zero() {
        let faces = vec![
            FaceRecord::triangle(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)),
            FaceRecord::triangle(p(-0.0, 0.0, 0.0), p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0)),
        ];
        let mesh = MeshBuilder::new(Tolerance::new(0.0))
            .build(&faces, MeshKind::Surface)
            .unwrap();
        assert_eq!(mesh.num_vertices(), 4);
    }

    #[test]
    fn test_non_face_entities_ignored() {
        let faces = vec![
            FaceRecord {
                kind: EntityKind::Polyline,
                corners: vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)],
            },
            FaceRecord {
                kind: EntityKind::Other("LINE".into()),
                corners: Vec::new(),
            },
            FaceRecord::triangle(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)),
        ];
        let (mesh, report) = MeshBuilder::default()
            .build_with_report(&faces, MeshKind::Solid)
            .unwrap();
        assert_eq!(mesh.num_triangles(), 1);
        assert_eq!(report.ignored, 2);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_no_geometry() {
        let faces = vec![
            FaceRecord::face3d(vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0)]),
            FaceRecord::triangle(p(f64::NAN, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)),
        ];
        let err = MeshBuilder::default().build(&faces, MeshKind::Surface).unwrap_err();
        assert!(matches!(
            err,
            MeshError::NoGeometry {
                entities: 2,
                skipped: 2
            }
        ));
        assert!(MeshBuilder::default().build(&[], MeshKind::Solid).is_err());
    }
}
