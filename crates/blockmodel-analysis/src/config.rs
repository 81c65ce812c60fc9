//! Analysis configuration loaded from TOML.
//!
//! ```toml
//! mesh_tolerance = 1e-9
//! batch_size = 4096
//!
//! [columns]
//! x = "XC"
//! y = "YC"
//! z = "ZC"
//! grade = "AU"
//! category = "LITHO"
//! tonnage = { density_column = "DENSITY", block_size = [5.0, 5.0, 5.0] }
//!
//! [filters.bounds]
//! z = { min = 100.0, max = 400.0 }
//!
//! [filters.grade]
//! min = 0.0
//! max = 50.0
//!
//! [filters.category]
//! allow = ["OXIDE", "SULPHIDE"]
//!
//! [[filters.spatial]]
//! mesh = "pit"
//! relation = "inside"
//!
//! [cutoffs]
//! steps = 20
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Density used when a block has none.
pub const DEFAULT_DENSITY: f64 = 2.7;

/// Block edge length used to derive volume when none is configured.
pub const DEFAULT_BLOCK_SIZE: [f64; 3] = [5.0, 5.0, 5.0];

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Which table columns hold coordinates, grade and tonnage.
    pub columns: ColumnMapping,
    /// Filters applied before aggregation.
    pub filters: FilterConfig,
    /// Cutoff grades for the grade-tonnage curve.
    pub cutoffs: CutoffSweep,
    /// Per-axis vertex deduplication tolerance for DXF meshes.
    pub mesh_tolerance: f64,
    /// Blocks classified per parallel batch.
    pub batch_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            filters: FilterConfig::default(),
            cutoffs: CutoffSweep::default(),
            mesh_tolerance: 1e-9,
            batch_size: 4096,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AnalysisError::config("batch_size must be positive"));
        }
        if !self.mesh_tolerance.is_finite() || self.mesh_tolerance < 0.0 {
            return Err(AnalysisError::config(
                "mesh_tolerance must be finite and non-negative",
            ));
        }
        self.columns.validate()?;

        let bounds = &self.filters.bounds;
        for (axis, range) in [("x", &bounds.x), ("y", &bounds.y), ("z", &bounds.z)] {
            if let Some(range) = range {
                range.validate(axis)?;
            }
        }
        if let Some(range) = &self.filters.grade {
            range.validate("grade")?;
        }

        if let Some(category) = &self.filters.category {
            if !category.allow.is_empty() && self.columns.category.is_none() {
                return Err(AnalysisError::config(
                    "category filter needs columns.category to be set",
                ));
            }
        }

        let mut labels = BTreeSet::new();
        for spatial in &self.filters.spatial {
            if spatial.mesh.is_empty() {
                return Err(AnalysisError::config("spatial filter mesh name is empty"));
            }
            let label = spatial.label();
            if !labels.insert(label.clone()) {
                return Err(AnalysisError::config(format!(
                    "duplicate spatial filter label '{}'",
                    label
                )));
            }
        }

        self.cutoffs.validate()
    }
}

/// Mapping from block attributes to table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    /// Easting column.
    pub x: String,
    /// Northing column.
    pub y: String,
    /// Elevation column.
    pub z: String,
    /// Grade column (percent for metal content).
    pub grade: String,
    /// Where block tonnage comes from. Unset derives it from the default
    /// density and block size, with a warning at resolution time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tonnage: Option<TonnageSource>,
    /// Optional categorical column (lithology, domain...).
    pub category: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            x: "x".into(),
            y: "y".into(),
            z: "z".into(),
            grade: "grade".into(),
            tonnage: None,
            category: None,
        }
    }
}

impl ColumnMapping {
    /// Configured tonnage source, or the default derivation when unset.
    pub fn tonnage_source(&self) -> TonnageSource {
        self.tonnage.clone().unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        let roles = [
            ("x", &self.x),
            ("y", &self.y),
            ("z", &self.z),
            ("grade", &self.grade),
        ];
        for (role, name) in roles {
            if name.is_empty() {
                return Err(AnalysisError::config(format!("column for {} is empty", role)));
            }
        }
        match &self.tonnage {
            Some(TonnageSource::Column(name)) if name.is_empty() => {
                Err(AnalysisError::config("tonnage column is empty"))
            }
            Some(TonnageSource::Derived(derived)) => derived.validate(),
            _ => Ok(()),
        }
    }
}

/// Source of block tonnage.
///
/// A string names a tonnage column; a table derives tonnage from density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TonnageSource {
    /// Read tonnage from a column.
    Column(String),
    /// Derive tonnage as `volume * density` with a constant block volume.
    Derived(DerivedTonnage),
}

impl Default for TonnageSource {
    fn default() -> Self {
        TonnageSource::Derived(DerivedTonnage::default())
    }
}

/// Tonnage derived from block volume and density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DerivedTonnage {
    /// Density column; missing or null values use `default_density`.
    #[serde(default)]
    pub density_column: Option<String>,
    /// Density used when the column is absent or null.
    #[serde(default = "default_density")]
    pub default_density: f64,
    /// Block edge lengths along x, y, z.
    #[serde(default = "default_block_size")]
    pub block_size: [f64; 3],
}

impl Default for DerivedTonnage {
    fn default() -> Self {
        Self {
            density_column: None,
            default_density: DEFAULT_DENSITY,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl DerivedTonnage {
    /// Constant block volume.
    pub fn volume(&self) -> f64 {
        self.block_size.iter().product::<f64>()
    }

    fn validate(&self) -> Result<()> {
        if !(self.default_density.is_finite() && self.default_density > 0.0) {
            return Err(AnalysisError::config("default_density must be positive"));
        }
        if self.block_size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(AnalysisError::config(
                "block_size must be positive on every axis",
            ));
        }
        Ok(())
    }
}

fn default_density() -> f64 {
    DEFAULT_DENSITY
}

fn default_block_size() -> [f64; 3] {
    DEFAULT_BLOCK_SIZE
}

/// A closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClosedRange {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
}

impl ClosedRange {
    /// Create a range.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True if `v` lies within the range, bounds included. NaN never does.
    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(AnalysisError::config(format!(
                "{} range [{}, {}] is invalid",
                what, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// All filter settings, applied in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Coordinate box.
    pub bounds: BoundsFilter,
    /// Grade interval.
    pub grade: Option<ClosedRange>,
    /// Allowed values of the categorical column.
    pub category: Option<CategoryFilter>,
    /// Spatial filters in evaluation order.
    pub spatial: Vec<SpatialFilterConfig>,
}

/// Per-axis coordinate intervals. Unset axes are unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsFilter {
    /// Easting interval.
    pub x: Option<ClosedRange>,
    /// Northing interval.
    pub y: Option<ClosedRange>,
    /// Elevation interval.
    pub z: Option<ClosedRange>,
}

impl BoundsFilter {
    /// True if no axis is constrained.
    pub fn is_unbounded(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// Categorical allow-list. An empty list disables the filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryFilter {
    /// Values to keep.
    #[serde(default)]
    pub allow: Vec<String>,
}

/// How a block must relate to a mesh to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialRelation {
    /// Inside a closed envelope.
    Inside,
    /// Above a surface.
    Above,
    /// Below a surface (not above).
    Below,
}

impl fmt::Display for SpatialRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialRelation::Inside => write!(f, "inside"),
            SpatialRelation::Above => write!(f, "above"),
            SpatialRelation::Below => write!(f, "below"),
        }
    }
}

/// One spatial filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpatialFilterConfig {
    /// Name of the mesh in the mesh set.
    pub mesh: String,
    /// Required relation.
    pub relation: SpatialRelation,
    /// Output column name; defaults to `inside_<mesh>` for envelopes and
    /// `above_<mesh>` for surfaces.
    #[serde(default)]
    pub label: Option<String>,
}

impl SpatialFilterConfig {
    /// Output column name for this filter.
    ///
    /// The column holds the classifier result, so `above` and `below`
    /// filters on one surface share a default name.
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| {
            let measured = match self.relation {
                SpatialRelation::Inside => "inside",
                SpatialRelation::Above | SpatialRelation::Below => "above",
            };
            format!("{}_{}", measured, self.mesh)
        })
    }
}

/// Cutoff grades as an inclusive linear sweep.
///
/// Missing bounds resolve to the grade range of the retained blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CutoffSweep {
    /// First cutoff.
    pub min: Option<f64>,
    /// Last cutoff.
    pub max: Option<f64>,
    /// Number of cutoffs.
    pub steps: usize,
}

impl Default for CutoffSweep {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            steps: 20,
        }
    }
}

impl CutoffSweep {
    fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(AnalysisError::config("cutoffs.steps must be at least 1"));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            ClosedRange::new(min, max).validate("cutoff")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.batch_size, 4096);
        assert_eq!(config.cutoffs.steps, 20);
        assert_eq!(config.columns.tonnage, None);
        assert_eq!(config.columns.tonnage_source(), TonnageSource::default());
    }

    #[test]
    fn test_full_document() {
        let text = r#"
            mesh_tolerance = 1e-6

            [columns]
            x = "XC"
            y = "YC"
            z = "ZC"
            grade = "AU"
            category = "LITHO"
            tonnage = { density_column = "DENSITY" }

            [filters.bounds]
            z = { min = 100.0, max = 400.0 }

            [filters.grade]
            min = 0.0
            max = 50.0

            [filters.category]
            allow = ["OXIDE"]

            [[filters.spatial]]
            mesh = "pit"
            relation = "inside"

            [[filters.spatial]]
            mesh = "topo"
            relation = "below"
            label = "under_topo"

            [cutoffs]
            min = 0.5
            steps = 10
        "#;
        let config = AnalysisConfig::from_toml_str(text).unwrap();
        assert_eq!(config.columns.grade, "AU");
        assert_eq!(
            config.columns.tonnage,
            Some(TonnageSource::Derived(DerivedTonnage {
                density_column: Some("DENSITY".into()),
                default_density: 2.7,
                block_size: [5.0, 5.0, 5.0],
            }))
        );
        assert!(config.filters.bounds.x.is_none());
        assert_eq!(config.filters.bounds.z, Some(ClosedRange::new(100.0, 400.0)));
        assert_eq!(config.filters.spatial[0].label(), "inside_pit");
        assert_eq!(config.filters.spatial[1].label(), "under_topo");
        assert_eq!(config.cutoffs.min, Some(0.5));
        assert_eq!(config.cutoffs.max, None);
        assert_eq!(config.batch_size, 4096);
    }

    #[test]
    fn test_tonnage_column() {
        let config =
            AnalysisConfig::from_toml_str("[columns]\ntonnage = \"TONNES\"\n").unwrap();
        assert_eq!(
            config.columns.tonnage,
            Some(TonnageSource::Column("TONNES".into()))
        );
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            "batch_size = 0",
            "mesh_tolerance = -1.0",
            "[filters.grade]\nmin = 5.0\nmax = 1.0",
            "[filters.category]\nallow = [\"A\"]",
            "[cutoffs]\nsteps = 0",
            "[columns]\ntonnage = { default_density = 0.0 }",
            "[[filters.spatial]]\nmesh = \"a\"\nrelation = \"above\"\n\
             [[filters.spatial]]\nmesh = \"a\"\nrelation = \"below\"",
        ];
        for text in bad {
            assert!(
                matches!(AnalysisConfig::from_toml_str(text), Err(AnalysisError::Config(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let bad = [
            // Table form of a tonnage column is not a density derivation.
            "[columns]\ntonnage = { column = \"TONNES\" }",
            "[columns]\ntonnage = { density_column = \"SG\", blocksize = [1.0, 1.0, 1.0] }",
            "[filter.grade]\nmin = 1.0\nmax = 2.0",
            "[filters.grade]\nmin = 1.0\nmaximum = 2.0",
            "[filters.bounds]\nw = { min = 0.0, max = 1.0 }",
            "[filters.category]\nallowed = [\"OX\"]",
            "[[filters.spatial]]\nmesh = \"pit\"\nrelation = \"inside\"\nlable = \"in_pit\"",
            "[cutoffs]\nstep = 5",
            "[columns]\ngrades = \"AU\"",
            "batchsize = 10",
        ];
        for text in bad {
            assert!(
                matches!(AnalysisConfig::from_toml_str(text), Err(AnalysisError::Config(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_default_labels_name_the_classification() {
        let filter = |relation| SpatialFilterConfig {
            mesh: "topo".into(),
            relation,
            label: None,
        };
        assert_eq!(filter(SpatialRelation::Inside).label(), "inside_topo");
        assert_eq!(filter(SpatialRelation::Above).label(), "above_topo");
        assert_eq!(filter(SpatialRelation::Below).label(), "above_topo");
    }

    #[test]
    fn test_empty_allow_list_needs_no_column() {
        assert!(AnalysisConfig::from_toml_str("[filters.category]\nallow = []").is_ok());
    }

    #[test]
    fn test_closed_range_inclusive() {
        let r = ClosedRange::new(1.0, 2.0);
        assert!(r.contains(1.0));
        assert!(r.contains(2.0));
        assert!(!r.contains(2.000001));
        assert!(!r.contains(f64::NAN));
    }
}
