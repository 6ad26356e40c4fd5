//! Scenario table and the numeric feature frame handed to the ensemble.
//!
//! RULE: column order is part of the schema. Nothing in this module
//! reorders columns implicitly; the ensemble compares names AND order.

use crate::{
    error::{PromoError, PromoResult},
    rng::{StreamRng, StreamSlot},
    types::TARGET_COLUMN,
};
use serde::{Deserialize, Serialize};

/// Feature columns of a scenario table, in schema order.
pub const FEATURE_COLUMNS: [&str; 10] = [
    "discount_percent",
    "sales_velocity",
    "return_rate",
    "inventory_level",
    "price",
    "support_tickets",
    "duration_days",
    "competitor_activity",
    "customer_segment",
    "margin_before",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Premium,
    Value,
    Bargain,
}

impl CustomerSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Value => "value",
            Self::Bargain => "bargain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "premium" => Some(Self::Premium),
            "value" => Some(Self::Value),
            "bargain" => Some(Self::Bargain),
            _ => None,
        }
    }

    /// Label code in alphabetical order of the segment names:
    /// bargain = 0, premium = 1, value = 2.
    pub fn code(&self) -> f64 {
        match self {
            Self::Bargain => 0.0,
            Self::Premium => 1.0,
            Self::Value => 2.0,
        }
    }
}

/// One synthetic promotion observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub discount_percent: f64,
    pub sales_velocity: f64,
    pub return_rate: f64,
    pub inventory_level: f64,
    pub price: f64,
    pub support_tickets: f64,
    pub duration_days: u32,
    pub competitor_activity: u32,
    pub customer_segment: CustomerSegment,
    pub margin_before: f64,
    pub actual_profit_loss: f64,
}

impl ScenarioRecord {
    /// Numeric feature vector in FEATURE_COLUMNS order.
    pub fn feature_values(&self) -> [f64; 10] {
        [
            self.discount_percent,
            self.sales_velocity,
            self.return_rate,
            self.inventory_level,
            self.price,
            self.support_tickets,
            self.duration_days as f64,
            self.competitor_activity as f64,
            self.customer_segment.code(),
            self.margin_before,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDataset {
    pub records: Vec<ScenarioRecord>,
}

impl ScenarioDataset {
    pub fn new(records: Vec<ScenarioRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.actual_profit_loss).collect()
    }

    /// Split into (features, target) with the segment label-encoded.
    pub fn to_training_frame(&self) -> PromoResult<(FeatureFrame, Vec<f64>)> {
        let mut columns = vec![Vec::with_capacity(self.len()); FEATURE_COLUMNS.len()];
        for record in &self.records {
            for (col, value) in columns.iter_mut().zip(record.feature_values()) {
                col.push(value);
            }
        }
        let names = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
        let frame = FeatureFrame::from_columns(names, columns)?;
        Ok((frame, self.targets()))
    }

    /// Full column list including the target, in table order.
    pub fn column_names() -> Vec<String> {
        FEATURE_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once(TARGET_COLUMN))
            .map(String::from)
            .collect()
    }
}

/// Column-major numeric table with named, ordered columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl FeatureFrame {
    /// Build from named columns. Every column must have the same
    /// length, names must be unique and every value finite.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> PromoResult<Self> {
        if names.len() != columns.len() {
            return Err(PromoError::invalid_input(format!(
                "{} column names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PromoError::invalid_input(format!("duplicate column '{name}'")));
            }
        }
        let n_rows = columns.first().map_or(0, Vec::len);
        for (name, col) in names.iter().zip(&columns) {
            if col.len() != n_rows {
                return Err(PromoError::invalid_input(format!(
                    "column '{name}' has {} rows, expected {n_rows}",
                    col.len()
                )));
            }
            if col.iter().any(|v| !v.is_finite()) {
                return Err(PromoError::invalid_input(format!(
                    "column '{name}' contains a non-finite value"
                )));
            }
        }
        Ok(Self { names, columns, n_rows })
    }

    /// Build from row-major data.
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> PromoResult<Self> {
        let mut columns = vec![Vec::with_capacity(rows.len()); names.len()];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(PromoError::invalid_input(format!(
                    "row {i} has {} values, expected {}",
                    row.len(),
                    names.len()
                )));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(*value);
            }
        }
        Self::from_columns(names, columns)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub(crate) fn column_at(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.columns[col][row]
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[row]).collect()
    }

    /// New frame with the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> PromoResult<Self> {
        if let Some(bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            return Err(PromoError::invalid_input(format!(
                "row index {bad} out of bounds for {} rows",
                self.n_rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| indices.iter().map(|&i| c[i]).collect())
            .collect();
        Ok(Self {
            names: self.names.clone(),
            columns,
            n_rows: indices.len(),
        })
    }
}

/// Shuffled (train, test) row indices. The test side gets
/// ceil(test_fraction * n) rows.
pub fn train_test_indices(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> PromoResult<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PromoError::invalid_input(format!(
            "test_fraction {test_fraction} must be strictly inside (0, 1)"
        )));
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PromoError::invalid_input(format!(
            "cannot split {n} rows with test_fraction {test_fraction}"
        )));
    }
    let mut rng = StreamRng::for_slot(seed, StreamSlot::Split);
    let mut order = rng.permutation(n);
    let train = order.split_off(n_test);
    Ok((train, order))
}

/// Features and target for one side of a split.
#[derive(Debug, Clone)]
pub struct SplitSide {
    pub features: FeatureFrame,
    pub target: Vec<f64>,
}

/// Split a frame and its target into train and test sides.
pub fn train_test_split(
    features: &FeatureFrame,
    target: &[f64],
    test_fraction: f64,
    seed: u64,
) -> PromoResult<(SplitSide, SplitSide)> {
    if features.n_rows() != target.len() {
        return Err(PromoError::invalid_input(format!(
            "features have {} rows but target has {}",
            features.n_rows(),
            target.len()
        )));
    }
    let (train_idx, test_idx) = train_test_indices(target.len(), test_fraction, seed)?;
    let side = |idx: &[usize]| -> PromoResult<SplitSide> {
        Ok(SplitSide {
            features: features.select_rows(idx)?,
            target: idx.iter().map(|&i| target[i]).collect(),
        })
    };
    Ok((side(&train_idx)?, side(&test_idx)?))
}
