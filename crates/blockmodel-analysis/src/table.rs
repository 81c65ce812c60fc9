//! Block tables and column resolution.
//!
//! A [`BlockTable`] is the raw tabular model: one row per block, arbitrary
//! columns. [`BlockTable::resolve`] reads the mapped columns once and
//! produces typed [`Block`] records for the pipeline.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use blockmodel_math::Point3;
use serde::{Deserialize, Serialize};

use crate::config::{ColumnMapping, DerivedTonnage, TonnageSource};
use crate::error::{AnalysisError, Result};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// Text.
    Text(String),
}

impl Value {
    /// Numeric view of the value.
    ///
    /// Null reads as NaN. Text is parsed; `None` means not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => Some(f64::NAN),
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Bool(_) => None,
        }
    }

    /// Category label of the value, `None` for null.
    pub fn as_category(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

/// One table row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// A typed block record resolved from one table row.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Index of the source row.
    pub row: usize,
    /// Block centroid.
    pub position: Point3,
    /// Grade value (NaN when missing).
    pub grade: f64,
    /// Block tonnage.
    pub tonnage: f64,
    /// Categorical value, if a category column is mapped.
    pub category: Option<String>,
    /// Spatial classifier results (inside or above) by filter label, in
    /// evaluation order.
    pub spatial: Vec<(Arc<str>, bool)>,
}

impl Block {
    /// Create a block with no category and no spatial results.
    pub fn new(row: usize, position: Point3, grade: f64, tonnage: f64) -> Self {
        Self {
            row,
            position,
            grade,
            tonnage,
            category: None,
            spatial: Vec::new(),
        }
    }
}

/// Tabular block model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockTable {
    /// Rows in source order.
    pub rows: Vec<Row>,
}

impl BlockTable {
    /// Create a table from rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parse a JSON array of row objects.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON array of row objects from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve every row into a [`Block`] using the column mapping.
    ///
    /// Missing density values fall back to the default density; every other
    /// mapped column must be present in every row.
    pub fn resolve(&self, mapping: &ColumnMapping) -> Result<Vec<Block>> {
        let source = mapping.tonnage_source();
        if mapping.tonnage.is_none() {
            if let TonnageSource::Derived(derived) = &source {
                tracing::warn!(
                    density = derived.default_density,
                    block_size = ?derived.block_size,
                    "No tonnage source configured, deriving tonnage from defaults"
                );
            }
        }

        let blocks = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let position = Point3::new(
                    numeric(row, i, &mapping.x)?,
                    numeric(row, i, &mapping.y)?,
                    numeric(row, i, &mapping.z)?,
                );
                let grade = numeric(row, i, &mapping.grade)?;
                let tonnage = match &source {
                    TonnageSource::Column(name) => numeric(row, i, name)?,
                    TonnageSource::Derived(derived) => derived.volume() * density(row, i, derived)?,
                };
                let category = match &mapping.category {
                    Some(name) => cell(row, i, name)?.as_category(),
                    None => None,
                };
                Ok(Block {
                    category,
                    ..Block::new(i, position, grade, tonnage)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(blocks = blocks.len(), "Resolved block table");
        Ok(blocks)
    }

    /// Source rows of the given blocks, with one boolean column added per
    /// spatial filter result.
    pub fn retained_rows(&self, blocks: &[Block]) -> Vec<Row> {
        blocks
            .iter()
            .filter_map(|block| {
                let mut row = self.rows.get(block.row)?.clone();
                for (label, value) in &block.spatial {
                    row.insert(label.to_string(), Value::Bool(*value));
                }
                Some(row)
            })
            .collect()
    }
}

fn density(row: &Row, index: usize, derived: &DerivedTonnage) -> Result<f64> {
    let Some(name) = &derived.density_column else {
        return Ok(derived.default_density);
    };
    match row.get(name) {
        None => Ok(derived.default_density),
        Some(value) => {
            let d = value.as_f64().ok_or_else(|| non_numeric(name, index, value))?;
            Ok(if d.is_nan() { derived.default_density } else { d })
        }
    }
}

fn cell<'a>(row: &'a Row, index: usize, column: &str) -> Result<&'a Value> {
    row.get(column).ok_or_else(|| AnalysisError::MissingColumn {
        column: column.to_string(),
        row: index,
    })
}

fn numeric(row: &Row, index: usize, column: &str) -> Result<f64> {
    let value = cell(row, index, column)?;
    value.as_f64().ok_or_else(|| non_numeric(column, index, value))
}

fn non_numeric(column: &str, row: usize, value: &Value) -> AnalysisError {
    AnalysisError::NonNumeric {
        column: column.to_string(),
        row,
        value: value.describe(),
    }
}
