//! Error types for mesh reconstruction and DXF reading.

use thiserror::Error;

/// Errors that can occur while reading DXF entities or building a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    /// I/O error reading a DXF file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entity list produced no usable triangle.
    ///
    /// Recoverable: callers treat the mesh as unavailable.
    #[error("no valid geometry found ({entities} entities read, {skipped} faces skipped)")]
    NoGeometry {
        /// Number of entity records examined.
        entities: usize,
        /// Number of face records rejected as malformed.
        skipped: usize,
    },

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index} but mesh has {vertices} vertices")]
    IndexOutOfBounds {
        /// Face position in the face list.
        face: usize,
        /// Offending vertex index.
        index: u32,
        /// Number of vertices in the mesh.
        vertices: usize,
    },

    /// Malformed ASCII DXF content.
    #[error("DXF error at line {line}: {message}")]
    Dxf {
        /// Line number (1-indexed).
        line: usize,
        /// Error message.
        message: String,
    },

    /// Binary DXF files are not supported.
    #[error("binary DXF is not supported")]
    BinaryDxf,
}

impl MeshError {
    /// Create a DXF parse error.
    pub fn dxf(line: usize, message: impl Into<String>) -> Self {
        Self::Dxf {
            line,
            message: message.into(),
        }
    }
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
