//! Descriptive grade statistics.

use serde::{Deserialize, Serialize};

use crate::table::Block;

/// Summary of grades over a block set.
///
/// Value statistics skip missing (NaN) grades; `count` is every block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeStatistics {
    /// Number of blocks.
    pub count: usize,
    /// Minimum grade.
    pub min: f64,
    /// Maximum grade.
    pub max: f64,
    /// Mean grade.
    pub mean: f64,
    /// Median grade.
    pub median: f64,
    /// Sample standard deviation (n - 1).
    pub std_dev: f64,
    /// `std_dev / mean`, `None` when the mean is zero.
    pub coefficient_of_variation: Option<f64>,
    /// First quartile.
    pub q25: f64,
    /// Third quartile.
    pub q75: f64,
    /// Sum of block tonnage.
    pub total_tonnage: f64,
}

impl GradeStatistics {
    /// Compute statistics, or `None` for an empty block set.
    pub fn from_blocks(blocks: &[Block]) -> Option<Self> {
        if blocks.is_empty() {
            return None;
        }

        let mut grades: Vec<f64> = blocks
            .iter()
            .map(|b| b.grade)
            .filter(|g| !g.is_nan())
            .collect();
        grades.sort_by(f64::total_cmp);
        let n = grades.len();

        let mean = if n == 0 {
            f64::NAN
        } else {
            grades.iter().sum::<f64>() / n as f64
        };
        let std_dev = if n < 2 {
            f64::NAN
        } else {
            let ss: f64 = grades.iter().map(|g| (g - mean) * (g - mean)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        let coefficient_of_variation = if mean != 0.0 {
            Some(std_dev / mean)
        } else {
            None
        };

        Some(Self {
            count: blocks.len(),
            min: grades.first().copied().unwrap_or(f64::NAN),
            max: grades.last().copied().unwrap_or(f64::NAN),
            mean,
            median: quantile(&grades, 0.5),
            std_dev,
            coefficient_of_variation,
            q25: quantile(&grades, 0.25),
            q75: quantile(&grades, 0.75),
            total_tonnage: blocks.iter().map(|b| b.tonnage).filter(|t| !t.is_nan()).sum(),
        })
    }
}

/// Quantile of sorted values with linear interpolation between ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
