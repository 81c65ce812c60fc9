//! Ordered block filtering.
//!
//! Stages always run in the same order: coordinate box, grade interval,
//! categorical allow-list, then spatial filters in configured order. Each
//! stage consumes the survivors of the previous one and returns a new
//! vector; the input slice is never modified.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use blockmodel_classify::{
    Classification, PointClassifier, SolidClassifier, SurfaceClassifier,
};
use blockmodel_math::Tolerance;
use blockmodel_mesh::{read_dxf, FaceRecord, MeshBuilder, MeshError, MeshKind, TriangleMesh};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::{AnalysisConfig, BoundsFilter, ClosedRange, SpatialRelation};
use crate::error::{AnalysisError, Result};
use crate::table::Block;

/// Raw DXF face records by mesh name.
///
/// Meshes are built on demand so that the same records can serve as a
/// solid in one filter and a surface in another.
#[derive(Debug, Clone, Default)]
pub struct MeshSet {
    faces: BTreeMap<String, Vec<FaceRecord>>,
}

impl MeshSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the face records of a named mesh.
    pub fn insert(&mut self, name: impl Into<String>, faces: Vec<FaceRecord>) {
        self.faces.insert(name.into(), faces);
    }

    /// Read a DXF file into a named mesh.
    pub fn load_dxf(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> std::result::Result<usize, MeshError> {
        let faces = read_dxf(path)?;
        let count = faces.len();
        self.insert(name, faces);
        Ok(count)
    }

    /// Face records of a named mesh.
    pub fn get(&self, name: &str) -> Option<&[FaceRecord]> {
        self.faces.get(name).map(|f| f.as_slice())
    }

    /// Mesh names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.faces.keys().map(|k| k.as_str())
    }

    /// Build the named mesh.
    ///
    /// Returns `None` when the name is unknown or the records hold no
    /// usable faces.
    pub fn build(
        &self,
        name: &str,
        kind: MeshKind,
        tolerance: Tolerance,
    ) -> Option<TriangleMesh> {
        let faces = self.faces.get(name)?;
        match MeshBuilder::new(tolerance).build_with_report(faces, kind) {
            Ok((mesh, report)) => {
                tracing::info!(
                    mesh = name,
                    kind = ?kind,
                    triangles = report.triangles,
                    vertices = report.vertices,
                    skipped = report.skipped,
                    "Built mesh"
                );
                Some(mesh)
            }
            Err(e) => {
                tracing::warn!(mesh = name, error = %e, "Mesh unavailable");
                None
            }
        }
    }
}

/// A spatial stage: a classifier plus the relation blocks must satisfy.
#[derive(Clone)]
pub struct SpatialStage {
    label: Arc<str>,
    relation: SpatialRelation,
    classifier: Arc<dyn PointClassifier>,
}

impl SpatialStage {
    /// Create a spatial stage.
    pub fn new(
        label: impl Into<Arc<str>>,
        relation: SpatialRelation,
        classifier: Arc<dyn PointClassifier>,
    ) -> Self {
        Self {
            label: label.into(),
            relation,
            classifier,
        }
    }

    /// Output column name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Required relation.
    pub fn relation(&self) -> SpatialRelation {
        self.relation
    }

    /// Whether a decided classification (inside or above) satisfies the
    /// relation.
    fn keeps(&self, positive: bool) -> bool {
        match self.relation {
            SpatialRelation::Inside | SpatialRelation::Above => positive,
            SpatialRelation::Below => !positive,
        }
    }
}

impl std::fmt::Debug for SpatialStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialStage")
            .field("label", &self.label)
            .field("relation", &self.relation)
            .finish_non_exhaustive()
    }
}

/// Counts for one applied stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name (`bounds`, `grade`, `category` or a spatial label).
    pub stage: String,
    /// Blocks entering the stage.
    pub input: usize,
    /// Blocks removed by the stage.
    pub rejected: usize,
    /// Removed blocks whose classification was degenerate.
    pub degenerate: usize,
}

impl StageReport {
    /// Blocks leaving the stage.
    pub fn retained(&self) -> usize {
        self.input - self.rejected
    }
}

/// Result of running the pipeline.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Surviving blocks in source order.
    pub retained: Vec<Block>,
    /// One report per applied stage, in order.
    pub stages: Vec<StageReport>,
}

/// Ordered block filter.
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    bounds: BoundsFilter,
    grade: Option<ClosedRange>,
    categories: Option<BTreeSet<String>>,
    spatial: Vec<SpatialStage>,
    batch_size: usize,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPipeline {
    /// A pipeline that keeps every block.
    pub fn new() -> Self {
        Self {
            bounds: BoundsFilter::default(),
            grade: None,
            categories: None,
            spatial: Vec::new(),
            batch_size: 4096,
        }
    }

    /// Constrain coordinates.
    pub fn with_bounds(mut self, bounds: BoundsFilter) -> Self {
        self.bounds = bounds;
        self
    }

    /// Constrain grade.
    pub fn with_grade(mut self, range: ClosedRange) -> Self {
        self.grade = Some(range);
        self
    }

    /// Keep only blocks whose category is in `allow`. An empty list keeps
    /// everything.
    pub fn with_categories<I, S>(mut self, allow: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = allow.into_iter().map(Into::into).collect();
        self.categories = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Append a spatial stage.
    pub fn with_spatial(mut self, stage: SpatialStage) -> Self {
        self.spatial.push(stage);
        self
    }

    /// Blocks classified per parallel batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Spatial stages in evaluation order.
    pub fn spatial_stages(&self) -> &[SpatialStage] {
        &self.spatial
    }

    /// Build a pipeline from configuration, constructing one classifier per
    /// spatial filter.
    ///
    /// Fails with [`AnalysisError::MissingGeometry`] when a spatial filter
    /// names a mesh that is absent or has no usable faces.
    pub fn from_config(config: &AnalysisConfig, meshes: &MeshSet) -> Result<Self> {
        let filters = &config.filters;
        let tolerance = Tolerance::new(config.mesh_tolerance);

        let mut pipeline = Self::new()
            .with_bounds(filters.bounds)
            .with_batch_size(config.batch_size);
        if let Some(range) = filters.grade {
            pipeline = pipeline.with_grade(range);
        }
        if let Some(category) = &filters.category {
            pipeline = pipeline.with_categories(category.allow.iter().cloned());
        }

        for spatial in &filters.spatial {
            let label = spatial.label();
            let missing = || AnalysisError::MissingGeometry {
                filter: label.clone(),
                mesh: spatial.mesh.clone(),
            };
            let classifier: Arc<dyn PointClassifier> = match spatial.relation {
                SpatialRelation::Inside => {
                    let mesh = meshes
                        .build(&spatial.mesh, MeshKind::Solid, tolerance)
                        .ok_or_else(missing)?;
                    Arc::new(SolidClassifier::new(mesh).map_err(|_| missing())?)
                }
                SpatialRelation::Above | SpatialRelation::Below => {
                    let mesh = meshes
                        .build(&spatial.mesh, MeshKind::Surface, tolerance)
                        .ok_or_else(missing)?;
                    Arc::new(SurfaceClassifier::new(mesh).map_err(|_| missing())?)
                }
            };
            let stage = SpatialStage::new(label.as_str(), spatial.relation, classifier);
            pipeline = pipeline.with_spatial(stage);
        }

        Ok(pipeline)
    }

    /// Run every configured stage over `blocks`.
    pub fn apply(&self, blocks: &[Block], cancel: &CancelToken) -> Result<FilterOutcome> {
        let mut stages = Vec::new();
        let mut current = blocks.to_vec();

        if !self.bounds.is_unbounded() {
            let b = self.bounds;
            current = retain_stage(current, "bounds", &mut stages, |block| {
                let p = &block.position;
                b.x.map_or(true, |r| r.contains(p.x))
                    && b.y.map_or(true, |r| r.contains(p.y))
                    && b.z.map_or(true, |r| r.contains(p.z))
            });
        }

        if let Some(range) = self.grade {
            current = retain_stage(current, "grade", &mut stages, |block| {
                range.contains(block.grade)
            });
        }

        if let Some(allow) = &self.categories {
            current = retain_stage(current, "category", &mut stages, |block| {
                block.category.as_ref().is_some_and(|c| allow.contains(c))
            });
        }

        for stage in &self.spatial {
            current = self.spatial_stage(current, stage, &mut stages, cancel)?;
        }

        tracing::info!(
            input = blocks.len(),
            retained = current.len(),
            stages = stages.len(),
            "Filter pipeline finished"
        );

        Ok(FilterOutcome {
            retained: current,
            stages,
        })
    }

    fn spatial_stage(
        &self,
        blocks: Vec<Block>,
        stage: &SpatialStage,
        reports: &mut Vec<StageReport>,
        cancel: &CancelToken,
    ) -> Result<Vec<Block>> {
        let mut results = vec![Classification::Degenerate; blocks.len()];
        for (chunk, out) in blocks
            .chunks(self.batch_size)
            .zip(results.chunks_mut(self.batch_size))
        {
            cancel.check()?;
            chunk
                .par_iter()
                .zip(out.par_iter_mut())
                .for_each(|(block, slot)| {
                    *slot = stage.classifier.classify(&block.position);
                });
        }

        let input = blocks.len();
        let mut degenerate = 0;
        let retained: Vec<Block> = blocks
            .into_iter()
            .zip(results)
            .filter_map(|(mut block, c)| match c.as_bool() {
                Some(positive) if stage.keeps(positive) => {
                    block.spatial.push((stage.label.clone(), positive));
                    Some(block)
                }
                Some(_) => None,
                None => {
                    degenerate += 1;
                    None
                }
            })
            .collect();

        let report = StageReport {
            stage: stage.label.to_string(),
            input,
            rejected: input - retained.len(),
            degenerate,
        };
        if degenerate > 0 {
            tracing::debug!(
                stage = %stage.label,
                degenerate,
                "Excluded blocks with degenerate classification"
            );
        }
        log_stage(&report);
        reports.push(report);
        Ok(retained)
    }
}

fn retain_stage<F>(
    blocks: Vec<Block>,
    name: &str,
    reports: &mut Vec<StageReport>,
    keep: F,
) -> Vec<Block>
where
    F: Fn(&Block) -> bool,
{
    let input = blocks.len();
    let retained: Vec<Block> = blocks.into_iter().filter(|b| keep(b)).collect();
    let report = StageReport {
        stage: name.to_string(),
        input,
        rejected: input - retained.len(),
        degenerate: 0,
    };
    log_stage(&report);
    reports.push(report);
    retained
}

fn log_stage(report: &StageReport) {
    tracing::info!(
        stage = %report.stage,
        input = report.input,
        rejected = report.rejected,
        "Filter stage applied"
    );
}
