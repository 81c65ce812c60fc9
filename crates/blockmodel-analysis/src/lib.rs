#![warn(missing_docs)]

//! Block model filtering and grade-tonnage analysis.
//!
//! The pipeline resolves a [`BlockTable`] into typed [`Block`]s, runs the
//! [`FilterPipeline`] (box, grade, category, then spatial filters backed by
//! DXF meshes), and aggregates the survivors with the
//! [`GradeTonnageEngine`].
//!
//! # Example
//!
//! ```
//! use blockmodel_analysis::{analyze, AnalysisConfig, BlockTable, CancelToken, MeshSet};
//!
//! let table = BlockTable::from_json_str(
//!     r#"[{"x": 0, "y": 0, "z": 0, "grade": 1.0},
//!         {"x": 5, "y": 0, "z": 0, "grade": 3.0}]"#,
//! )?;
//! let config = AnalysisConfig::from_toml_str("[cutoffs]\nsteps = 3")?;
//! let analysis = analyze(&table, &config, &MeshSet::new(), &CancelToken::new())?;
//!
//! assert_eq!(analysis.retained.len(), 2);
//! assert_eq!(analysis.report.curve.rows.len(), 3);
//! # Ok::<(), blockmodel_analysis::AnalysisError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod curve;
pub mod error;
pub mod filter;
pub mod stats;
pub mod table;

pub use cancel::CancelToken;
pub use config::{
    AnalysisConfig, BoundsFilter, CategoryFilter, ClosedRange, ColumnMapping, CutoffSweep,
    DerivedTonnage, FilterConfig, SpatialFilterConfig, SpatialRelation, TonnageSource,
};
pub use curve::{cutoff_sweep, CurveRow, GradeTonnageCurve, GradeTonnageEngine};
pub use error::{AnalysisError, Result};
pub use filter::{FilterOutcome, FilterPipeline, MeshSet, SpatialStage, StageReport};
pub use stats::GradeStatistics;
pub use table::{Block, BlockTable, Row, Value};

use serde::{Deserialize, Serialize};

/// Summary of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Blocks in the input table.
    pub total_blocks: usize,
    /// Blocks surviving every filter.
    pub retained_blocks: usize,
    /// Per-stage filter counts.
    pub stages: Vec<StageReport>,
    /// Grade statistics of the retained blocks.
    pub statistics: Option<GradeStatistics>,
    /// Grade-tonnage curve of the retained blocks.
    pub curve: GradeTonnageCurve,
}

/// Report plus the retained blocks.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Summary.
    pub report: AnalysisReport,
    /// Retained blocks in source order.
    pub retained: Vec<Block>,
}

/// Resolve, filter and aggregate a block table.
pub fn analyze(
    table: &BlockTable,
    config: &AnalysisConfig,
    meshes: &MeshSet,
    cancel: &CancelToken,
) -> Result<Analysis> {
    let blocks = table.resolve(&config.columns)?;
    let pipeline = FilterPipeline::from_config(config, meshes)?;
    let outcome = pipeline.apply(&blocks, cancel)?;

    let cutoffs = config.cutoffs.cutoffs(&outcome.retained);
    let curve = GradeTonnageEngine::sweep(&outcome.retained, &cutoffs, cancel)?;
    let statistics = GradeStatistics::from_blocks(&outcome.retained);

    let report = AnalysisReport {
        total_blocks: blocks.len(),
        retained_blocks: outcome.retained.len(),
        stages: outcome.stages,
        statistics,
        curve,
    };
    Ok(Analysis {
        report,
        retained: outcome.retained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use blockmodel_math::Point3;
    use blockmodel_mesh::FaceRecord;

    fn table() -> BlockTable {
        let mut rows = Vec::new();
        for i in 0..10 {
            let mut row = Row::new();
            row.insert("x".into(), Value::Number(i as f64 * 0.25 - 0.5));
            row.insert("y".into(), Value::Number(0.5));
            row.insert("z".into(), Value::Number(0.5));
            row.insert("grade".into(), Value::Number(i as f64));
            row.insert("sg".into(), Value::Null);
            rows.push(row);
        }
        BlockTable::new(rows)
    }

    fn topo() -> Vec<FaceRecord> {
        let p = Point3::new;
        vec![FaceRecord::quad(
            p(-10.0, -10.0, 0.0),
            p(10.0, -10.0, 0.0),
            p(10.0, 10.0, 0.0),
            p(-10.0, 10.0, 0.0),
        )]
    }

    #[test]
    fn test_analysis_end_to_end() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [columns.tonnage]
            density_column = "sg"
            block_size = [2.0, 2.0, 2.0]

            [filters.bounds]
            x = { min = 0.0, max = 1.0 }

            [[filters.spatial]]
            mesh = "topo"
            relation = "above"

            [cutoffs]
            min = 0.0
            max = 6.0
            steps = 4
            "#,
        )
        .unwrap();
        let mut meshes = MeshSet::new();
        meshes.insert("topo", topo());

        let analysis = analyze(&table(), &config, &meshes, &CancelToken::new()).unwrap();
        let report = &analysis.report;

        // x = -0.5 + 0.25 i in [0, 1] keeps i = 2..=6.
        assert_eq!(report.total_blocks, 10);
        assert_eq!(report.retained_blocks, 5);
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[1].stage, "above_topo");
        assert_eq!(report.stages[1].rejected, 0);

        // Null density falls back to 2.7 over a volume of 8.
        let t = 8.0 * 2.7;
        assert_relative_eq!(report.curve.total_tonnage, 5.0 * t, epsilon = 1e-9);
        let cutoffs: Vec<f64> = report.curve.rows.iter().map(|r| r.cutoff).collect();
        assert_eq!(cutoffs, vec![0.0, 2.0, 4.0, 6.0]);
        assert_relative_eq!(report.curve.rows[2].tonnage, 3.0 * t, epsilon = 1e-9);
        assert_relative_eq!(report.curve.rows[2].avg_grade, 5.0, epsilon = 1e-12);

        let stats = report.statistics.as_ref().unwrap();
        assert_eq!(stats.count, 5);
        assert_relative_eq!(stats.mean, 4.0);

        let rows = table().retained_rows(&analysis.retained);
        assert_eq!(rows[0]["above_topo"], Value::Bool(true));
    }

    #[test]
    fn test_missing_mesh_is_surfaced() {
        let config = AnalysisConfig::from_toml_str(
            "[[filters.spatial]]\nmesh = \"pit\"\nrelation = \"inside\"\n",
        )
        .unwrap();
        let err = analyze(&table(), &config, &MeshSet::new(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingGeometry { .. }));
    }

    #[test]
    fn test_report_serializes() {
        let config = AnalysisConfig::default();
        let analysis = analyze(&table(), &config, &MeshSet::new(), &CancelToken::new()).unwrap();
        let json = serde_json::to_value(&analysis.report).unwrap();
        assert_eq!(json["retained_blocks"], 10);
        assert_eq!(json["curve"]["rows"].as_array().unwrap().len(), 20);
    }
}
