//! Grade-tonnage curves.
//!
//! For each cutoff `c`, blocks with `grade >= c` are aggregated into
//! tonnage, tonnage-weighted average grade and metal content. Grades are
//! sorted once; each cutoff is then a binary search into suffix sums.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::CutoffSweep;
use crate::error::Result;
use crate::table::Block;

/// One row of a grade-tonnage curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveRow {
    /// Cutoff grade.
    pub cutoff: f64,
    /// Tonnage with grade at or above the cutoff.
    pub tonnage: f64,
    /// Share of total tonnage, in percent.
    pub percent: f64,
    /// Tonnage-weighted average grade above the cutoff.
    pub avg_grade: f64,
    /// `tonnage * avg_grade / 100`, grade taken as a percentage.
    pub metal: f64,
}

/// A grade-tonnage curve over a cutoff sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeTonnageCurve {
    /// Total tonnage of the block set.
    pub total_tonnage: f64,
    /// One row per cutoff, in input order.
    pub rows: Vec<CurveRow>,
}

/// Precomputed aggregates for answering many cutoffs.
#[derive(Debug, Clone)]
pub struct GradeTonnageEngine {
    /// Grades in ascending order (NaN excluded).
    grades: Vec<f64>,
    /// `tonnage[i] = sum of tonnage over grades[i..]`, with one trailing zero.
    tonnage: Vec<f64>,
    /// `weighted[i] = sum of grade * tonnage over grades[i..]`, trailing zero.
    weighted: Vec<f64>,
    total_tonnage: f64,
}

impl GradeTonnageEngine {
    /// Prepare a block set. Missing tonnage counts as zero.
    pub fn new(blocks: &[Block]) -> Self {
        let tonnage_of = |b: &Block| if b.tonnage.is_nan() { 0.0 } else { b.tonnage };
        let total_tonnage: f64 = blocks.iter().map(tonnage_of).sum();

        let mut pairs: Vec<(f64, f64)> = blocks
            .iter()
            .filter(|b| !b.grade.is_nan())
            .map(|b| (b.grade, tonnage_of(b)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let mut tonnage = vec![0.0; n + 1];
        let mut weighted = vec![0.0; n + 1];
        for i in (0..n).rev() {
            let (g, t) = pairs[i];
            tonnage[i] = tonnage[i + 1] + t;
            weighted[i] = weighted[i + 1] + g * t;
        }

        Self {
            grades: pairs.into_iter().map(|(g, _)| g).collect(),
            tonnage,
            weighted,
            total_tonnage,
        }
    }

    /// Total tonnage of the prepared block set.
    pub fn total_tonnage(&self) -> f64 {
        self.total_tonnage
    }

    /// Aggregate blocks at or above one cutoff.
    pub fn row(&self, cutoff: f64) -> CurveRow {
        let start = if cutoff.is_nan() {
            self.grades.len()
        } else {
            self.grades.partition_point(|&g| g < cutoff)
        };
        if start == self.grades.len() {
            tracing::debug!(cutoff, "No blocks at or above cutoff");
            return CurveRow {
                cutoff,
                tonnage: 0.0,
                percent: 0.0,
                avg_grade: 0.0,
                metal: 0.0,
            };
        }

        let tonnage = self.tonnage[start];
        let avg_grade = if tonnage > 0.0 {
            self.weighted[start] / tonnage
        } else {
            0.0
        };
        let percent = if self.total_tonnage > 0.0 {
            100.0 * tonnage / self.total_tonnage
        } else {
            0.0
        };
        CurveRow {
            cutoff,
            tonnage,
            percent,
            avg_grade,
            metal: tonnage * avg_grade / 100.0,
        }
    }

    /// Aggregate every cutoff, checking for cancellation between cutoffs.
    pub fn curve(&self, cutoffs: &[f64], cancel: &CancelToken) -> Result<GradeTonnageCurve> {
        let mut rows = Vec::with_capacity(cutoffs.len());
        for &cutoff in cutoffs {
            cancel.check()?;
            rows.push(self.row(cutoff));
        }
        Ok(GradeTonnageCurve {
            total_tonnage: self.total_tonnage,
            rows,
        })
    }

    /// Build the curve for `blocks` in one call.
    pub fn sweep(
        blocks: &[Block],
        cutoffs: &[f64],
        cancel: &CancelToken,
    ) -> Result<GradeTonnageCurve> {
        let engine = Self::new(blocks);
        let curve = engine.curve(cutoffs, cancel)?;
        tracing::info!(
            blocks = blocks.len(),
            cutoffs = cutoffs.len(),
            total_tonnage = curve.total_tonnage,
            "Computed grade-tonnage curve"
        );
        Ok(curve)
    }
}

/// `steps` evenly spaced values from `min` to `max`, both included.
pub fn cutoff_sweep(min: f64, max: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (steps - 1) as f64;
            let mut values: Vec<f64> = (0..steps).map(|i| min + step * i as f64).collect();
            values[steps - 1] = max;
            values
        }
    }
}

impl CutoffSweep {
    /// Resolve the cutoff list for a block set.
    ///
    /// Unset bounds take the grade range of `blocks`. Empty when a bound is
    /// unset and no block has a grade.
    pub fn cutoffs(&self, blocks: &[Block]) -> Vec<f64> {
        let (lo, hi) = blocks
            .iter()
            .map(|b| b.grade)
            .filter(|g| !g.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), g| (lo.min(g), hi.max(g)));
        let min = self.min.unwrap_or(lo);
        let max = self.max.unwrap_or(hi);
        if !min.is_finite() || !max.is_finite() {
            return Vec::new();
        }
        cutoff_sweep(min, max, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use approx::assert_relative_eq;
    use blockmodel_math::Point3;

    fn blocks(data: &[(f64, f64)]) -> Vec<Block> {
        data.iter()
            .enumerate()
            .map(|(i, &(g, t))| Block::new(i, Point3::origin(), g, t))
            .collect()
    }

    /// Direct per-cutoff aggregation for comparison.
    fn brute_row(data: &[(f64, f64)], cutoff: f64) -> (f64, f64) {
        let above: Vec<_> = data.iter().filter(|(g, _)| *g >= cutoff).collect();
        let t: f64 = above.iter().map(|(_, t)| t).sum();
        let gt: f64 = above.iter().map(|(g, t)| g * t).sum();
        (t, if t > 0.0 { gt / t } else { 0.0 })
    }

    #[test]
    fn test_weighted_average() {
        let b = blocks(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
        let curve = GradeTonnageEngine::sweep(&b, &[0.0], &CancelToken::new()).unwrap();
        let row = curve.rows[0];
        assert_relative_eq!(row.tonnage, 60.0);
        assert_relative_eq!(row.avg_grade, 140.0 / 60.0, epsilon = 1e-12);
        assert_relative_eq!(row.percent, 100.0);
        assert_relative_eq!(row.metal, 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let b = blocks(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
        let engine = GradeTonnageEngine::new(&b);
        let row = engine.row(2.0);
        assert_relative_eq!(row.tonnage, 50.0);
        assert_relative_eq!(row.avg_grade, 130.0 / 50.0, epsilon = 1e-12);
        assert_relative_eq!(row.percent, 100.0 * 50.0 / 60.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_subset_zero_filled() {
        let b = blocks(&[(1.0, 10.0), (2.0, 20.0)]);
        let row = GradeTonnageEngine::new(&b).row(5.0);
        assert_eq!(
            row,
            CurveRow {
                cutoff: 5.0,
                tonnage: 0.0,
                percent: 0.0,
                avg_grade: 0.0,
                metal: 0.0
            }
        );

        let curve = GradeTonnageEngine::sweep(&[], &[0.0, 1.0], &CancelToken::new()).unwrap();
        assert_eq!(curve.total_tonnage, 0.0);
        assert!(curve.rows.iter().all(|r| r.tonnage == 0.0 && r.percent == 0.0));
    }

    #[test]
    fn test_zero_tonnage_above_cutoff() {
        let b = blocks(&[(1.0, 10.0), (4.0, 0.0)]);
        let row = GradeTonnageEngine::new(&b).row(3.0);
        assert_eq!(row.tonnage, 0.0);
        assert_eq!(row.avg_grade, 0.0);
        assert_eq!(row.metal, 0.0);
    }

    #[test]
    fn test_nan_grade_never_qualifies() {
        let b = blocks(&[(f64::NAN, 100.0), (2.0, 20.0)]);
        let engine = GradeTonnageEngine::new(&b);
        let row = engine.row(f64::NEG_INFINITY);
        assert_relative_eq!(row.tonnage, 20.0);
        // NaN-grade tonnage still counts toward the total.
        assert_relative_eq!(engine.total_tonnage(), 120.0);
        assert_relative_eq!(row.percent, 100.0 * 20.0 / 120.0, epsilon = 1e-12);
        assert_eq!(engine.row(f64::NAN).tonnage, 0.0);
    }

    #[test]
    fn test_monotonic_and_matches_direct_sums() {
        let data: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let f = i as f64;
                ((f * 0.731) % 7.3, 50.0 + (f * 3.17) % 40.0)
            })
            .collect();
        let b = blocks(&data);
        let cutoffs = cutoff_sweep(0.0, 8.0, 33);
        let curve = GradeTonnageEngine::sweep(&b, &cutoffs, &CancelToken::new()).unwrap();

        for pair in curve.rows.windows(2) {
            assert!(pair[1].tonnage <= pair[0].tonnage + 1e-9);
        }
        for row in &curve.rows {
            let (t, avg) = brute_row(&data, row.cutoff);
            assert_relative_eq!(row.tonnage, t, epsilon = 1e-6);
            assert_relative_eq!(row.avg_grade, avg, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sweep_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let b = blocks(&[(1.0, 10.0)]);
        let err = GradeTonnageEngine::sweep(&b, &[0.0, 1.0], &cancel).unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[test]
    fn test_cutoff_sweep_linspace() {
        assert!(cutoff_sweep(0.0, 1.0, 0).is_empty());
        assert_eq!(cutoff_sweep(2.0, 5.0, 1), vec![2.0]);
        let values = cutoff_sweep(0.0, 1.0, 5);
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let values = cutoff_sweep(0.1, 0.7, 7);
        assert_eq!(values.len(), 7);
        assert_eq!(values[6], 0.7);
    }

    #[test]
    fn test_cutoff_range_from_blocks() {
        let b = blocks(&[(0.4, 1.0), (f64::NAN, 1.0), (2.4, 1.0)]);
        let sweep = CutoffSweep {
            min: None,
            max: None,
            steps: 3,
        };
        let values = sweep.cutoffs(&b);
        assert_eq!(values.len(), 3);
        assert_relative_eq!(values[0], 0.4);
        assert_relative_eq!(values[1], 1.4);
        assert_relative_eq!(values[2], 2.4);

        let fixed = CutoffSweep {
            min: Some(1.0),
            ..sweep
        };
        assert_relative_eq!(fixed.cutoffs(&b)[0], 1.0);
        assert!(sweep.cutoffs(&[]).is_empty());
    }
}
