#![warn(missing_docs)]

//! Spatial classification of block centroids against triangle meshes.
//!
//! Two classifiers are provided:
//!
//! - [`SolidClassifier`] answers point-in-solid queries against a closed
//!   envelope by ray parity.
//! - [`SurfaceClassifier`] answers point-above-surface queries by comparing
//!   the query height with the closest point on an open surface.
//!
//! Both own an immutable mesh and an acceleration structure, and are
//! `Send + Sync` so one instance can be shared across a rayon pool.

pub mod bvh;
pub mod ray;
pub mod solid;
pub mod surface;

pub use solid::SolidClassifier;
pub use surface::SurfaceClassifier;

use blockmodel_math::Point3;
use thiserror::Error;

/// Errors raised while constructing a classifier.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The mesh has no triangles.
    #[error("mesh is empty")]
    EmptyMesh,
}

/// Result type for classifier construction.
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Outcome of classifying one point.
///
/// `Positive` means inside for an envelope and above for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Inside the envelope / above the surface.
    Positive,
    /// Outside the envelope / not above the surface.
    Negative,
    /// No reliable answer could be computed for this point.
    Degenerate,
}

impl Classification {
    /// Map a boolean answer to a classification.
    #[inline]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Classification::Positive
        } else {
            Classification::Negative
        }
    }

    /// The boolean answer, or `None` when degenerate.
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Classification::Positive => Some(true),
            Classification::Negative => Some(false),
            Classification::Degenerate => None,
        }
    }

    /// True if degenerate.
    #[inline]
    pub fn is_degenerate(self) -> bool {
        self == Classification::Degenerate
    }
}

/// A read-only spatial predicate over points.
pub trait PointClassifier: Send + Sync {
    /// Classify a point.
    fn classify(&self, point: &Point3) -> Classification;
}

impl PointClassifier for SolidClassifier {
    fn classify(&self, point: &Point3) -> Classification {
        SolidClassifier::classify(self, point)
    }
}

impl PointClassifier for SurfaceClassifier {
    fn classify(&self, point: &Point3) -> Classification {
        SurfaceClassifier::classify(self, point)
    }
}
