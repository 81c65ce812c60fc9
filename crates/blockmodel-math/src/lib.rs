#![warn(missing_docs)]

//! Math types shared by the block model crates.
//!
//! Thin wrappers around nalgebra providing the point and vector types used
//! for block centroids and mesh vertices, the coordinate tolerance that
//! drives vertex deduplication, and an axis-aligned bounding box.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A point in 3D space (block centroid or mesh vertex).
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// Coordinate tolerance for vertex identity.
///
/// Two points are identical when every coordinate differs by at most
/// `linear`. This is a per-axis absolute test, not a Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Absolute per-coordinate tolerance.
    pub linear: f64,
}

impl Tolerance {
    /// Default vertex tolerance (1e-9 absolute).
    pub const DEFAULT: Self = Self { linear: 1e-9 };

    /// Create a tolerance with the given absolute value.
    pub fn new(linear: f64) -> Self {
        Self { linear }
    }

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a.x - b.x).abs() <= self.linear
            && (a.y - b.y).abs() <= self.linear
            && (a.z - b.z).abs() <= self.linear
    }

    /// Check if a scalar is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() <= self.linear
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Bounding box of a set of points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand this AABB to include another box.
    pub fn include_aabb(&mut self, other: &Aabb3) {
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Expand the AABB by a tolerance in all directions.
    pub fn expand(&mut self, tol: f64) {
        self.min.x -= tol;
        self.min.y -= tol;
        self.min.z -= tol;
        self.max.x += tol;
        self.max.y += tol;
        self.max.z += tol;
    }

    /// Test if a point lies inside the box (boundary included).
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Length of the box diagonal, 0 for an empty box.
    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max - self.min).norm()
        }
    }

    /// Squared distance from a point to the box (0 if inside).
    pub fn distance_squared(&self, p: &Point3) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Min and max along an axis (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis_range(&self, axis: usize) -> (f64, f64) {
        (self.min[axis], self.max[axis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tolerance_points_equal() {
        let tol = Tolerance::DEFAULT;
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(1.0 + 5e-10, 2.0, 3.0);
        assert!(tol.points_equal(&a, &b));
        let c = Point3::new(1.0 + 1e-6, 2.0, 3.0);
        assert!(!tol.points_equal(&a, &c));
    }

    #[test]
    fn test_tolerance_is_per_axis() {
        // Diagonal offset of 0.9 tol on each axis is still a match even
        // though its Euclidean length exceeds the tolerance.
        let tol = Tolerance::new(1.0);
        let a = Point3::origin();
        let b = Point3::new(0.9, 0.9, 0.9);
        assert!(tol.points_equal(&a, &b));
    }

    #[test]
    fn test_zero_tolerance_is_exact() {
        let tol = Tolerance::new(0.0);
        let a = Point3::new(0.1, 0.2, 0.3);
        assert!(tol.points_equal(&a, &a));
        assert!(!tol.points_equal(&a, &Point3::new(0.1, 0.2, 0.3 + f64::EPSILON)));
    }

    #[test]
    fn test_aabb_from_points() {
        let pts = [
            Point3::new(1.0, -2.0, 0.5),
            Point3::new(-1.0, 3.0, 2.0),
            Point3::new(0.0, 0.0, -4.0),
        ];
        let aabb = Aabb3::from_points(&pts);
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, -4.0));
        assert_eq!(aabb.max, Point3::new(1.0, 3.0, 2.0));
        assert!(aabb.contains(&Point3::new(1.0, 3.0, 2.0)));
        assert!(!aabb.contains(&Point3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_empty() {
        let aabb = Aabb3::empty();
        assert!(aabb.is_empty());
        assert_eq!(aabb.diagonal(), 0.0);
    }

    #[test]
    fn test_aabb_distance_squared() {
        let aabb = Aabb3::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(aabb.distance_squared(&Point3::new(0.5, 0.5, 0.5)), 0.0);
        assert_relative_eq!(aabb.distance_squared(&Point3::new(3.0, 0.5, 0.5)), 4.0);
        assert_relative_eq!(aabb.distance_squared(&Point3::new(2.0, 2.0, 0.5)), 2.0);
    }
}
