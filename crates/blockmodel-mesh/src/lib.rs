#![warn(missing_docs)]

//! Triangle mesh reconstruction for block model spatial constraints.
//!
//! Envelopes (closed solids) and surfaces (topography, pit shells) arrive
//! as DXF face entities. This crate turns those raw face records into an
//! indexed triangle mesh with deduplicated vertices.
//!
//! # Example
//!
//! ```
//! use blockmodel_math::{Point3, Tolerance};
//! use blockmodel_mesh::{FaceRecord, MeshBuilder, MeshKind};
//!
//! let faces = vec![FaceRecord::quad(
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! )];
//! let mesh = MeshBuilder::new(Tolerance::DEFAULT)
//!     .build(&faces, MeshKind::Surface)
//!     .unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_triangles(), 2);
//! ```

pub mod builder;
pub mod dxf;
pub mod error;

pub use builder::{BuildReport, EntityKind, FaceRecord, MeshBuilder};
pub use dxf::{parse_dxf, read_dxf};
pub use error::{MeshError, Result};

use std::collections::HashMap;

use blockmodel_math::{Aabb3, Point3};
use serde::{Deserialize, Serialize};

/// What a mesh is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshKind {
    /// Closed envelope, used for point-in-solid tests.
    Solid,
    /// Open surface, used for above/below tests.
    Surface,
}

/// Indexed triangle mesh with deduplicated vertices.
///
/// Immutable once built. Every face index is guaranteed to be within the
/// vertex sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<Point3>,
    faces: Vec<[u32; 3]>,
    kind: MeshKind,
}

impl TriangleMesh {
    /// Create a mesh from raw parts, checking face indices.
    pub fn from_parts(
        vertices: Vec<Point3>,
        faces: Vec<[u32; 3]>,
        kind: MeshKind,
    ) -> Result<Self> {
        for (i, face) in faces.iter().enumerate() {
            for &idx in face {
                if idx as usize >= vertices.len() {
                    return Err(MeshError::IndexOutOfBounds {
                        face: i,
                        index: idx,
                        vertices: vertices.len(),
                    });
                }
            }
        }
        Ok(Self {
            vertices,
            faces,
            kind,
        })
    }

    /// Unique vertices in insertion order.
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Triangles as vertex index triples.
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Intended use of the mesh.
    pub fn kind(&self) -> MeshKind {
        self.kind
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.faces.len()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// True if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Corner positions of triangle `i`.
    #[inline]
    pub fn triangle(&self, i: usize) -> [Point3; 3] {
        let [a, b, c] = self.faces[i];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Iterate over triangle corner positions.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        (0..self.faces.len()).map(move |i| self.triangle(i))
    }

    /// Bounding box of all vertices.
    pub fn bounds(&self) -> Aabb3 {
        Aabb3::from_points(&self.vertices)
    }

    /// Count edges not shared by exactly two triangles.
    ///
    /// Zero for a watertight envelope. The builder never enforces this; it
    /// is reported so callers can warn about leaky solids.
    pub fn open_edge_count(&self) -> usize {
        let mut edges: HashMap<(u32, u32), u32> = HashMap::new();
        for &[a, b, c] in &self.faces {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                let key = if u < v { (u, v) } else { (v, u) };
                *edges.entry(key).or_insert(0) += 1;
            }
        }
        edges.values().filter(|&&n| n != 2).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_rejects_bad_index() {
        let verts = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let err = TriangleMesh::from_parts(verts, vec![[0, 1, 2]], MeshKind::Surface).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfBounds {
                face: 0,
                index: 2,
                vertices: 2
            }
        ));
    }

    #[test]
    fn test_triangle_lookup() {
        let verts = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = TriangleMesh::from_parts(verts, vec![[2, 0, 1]], MeshKind::Surface).unwrap();
        let [a, b, c] = mesh.triangle(0);
        assert_eq!(a, Point3::new(0.0, 1.0, 0.0));
        assert_eq!(b, Point3::origin());
        assert_eq!(c, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.open_edge_count(), 3);
    }
}
