//! Column-role declarations and encoder hyperparameters.
//!
//! Columns have *roles* — the meaning assigned to their values. The role
//! partition is declared up front (categorical / numeric / label) and is
//! immutable for the lifetime of an encoder; there is no runtime type
//! sniffing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What a declared column's values mean to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Values are discrete symbols, read as text.
    Categorical,
    /// Values are continuous quantities, read as f64 and discretized.
    Numeric,
    /// The prediction target; passed through unencoded.
    Label,
}

/// Full encoder declaration: the column-role partition plus the three
/// filtering/binning hyperparameters.
///
/// Validated once at [`crate::CateEncoder::new`]; never touches data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Categorical feature columns, in declaration order.
    pub cate_cols: Vec<String>,
    /// Numeric feature columns, in declaration order.
    pub nume_cols: Vec<String>,
    /// Label (target) column name.
    pub label: String,
    /// Minimum absolute frequency for a categorical value to be kept.
    /// Values with count <= threshold collapse to `<LESS>`.
    pub threshold: u64,
    /// Fraction of distinct values (by descending-frequency rank) eligible
    /// for keeping. 1.0 means every rank is eligible.
    pub thresrate: f64,
    /// Requested quantile count for numeric discretization. The effective
    /// bin count may be lower when the distribution has heavy ties.
    pub bins: usize,
}

impl EncoderConfig {
    /// Check the declaration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for name in self.cate_cols.iter().chain(self.nume_cols.iter()) {
            if !seen.insert(name.as_str()) {
                // A name in both lists is the overlap case; a repeat within
                // one list is a plain duplicate.
                if self.cate_cols.contains(name) && self.nume_cols.contains(name) {
                    return Err(ConfigError::RoleOverlap(name.clone()));
                }
                return Err(ConfigError::DuplicateColumn(name.clone()));
            }
        }
        if seen.contains(self.label.as_str()) {
            return Err(ConfigError::LabelCollision(self.label.clone()));
        }
        if self.bins == 0 {
            return Err(ConfigError::ZeroBins);
        }
        if !(0.0..=1.0).contains(&self.thresrate) || self.thresrate.is_nan() {
            return Err(ConfigError::ThresrateOutOfRange(self.thresrate));
        }
        Ok(())
    }

    /// Role of a declared column, or `None` if undeclared.
    pub fn role_of(&self, name: &str) -> Option<ColumnRole> {
        if self.label == name {
            Some(ColumnRole::Label)
        } else if self.cate_cols.iter().any(|c| c == name) {
            Some(ColumnRole::Categorical)
        } else if self.nume_cols.iter().any(|c| c == name) {
            Some(ColumnRole::Numeric)
        } else {
            None
        }
    }

    /// Feature columns in artifact order: categorical first (declaration
    /// order), then numeric (declaration order). Every index matrix and
    /// feature_sizes vector follows this order.
    pub fn feature_cols(&self) -> impl Iterator<Item = (&str, ColumnRole)> {
        self.cate_cols
            .iter()
            .map(|c| (c.as_str(), ColumnRole::Categorical))
            .chain(
                self.nume_cols
                    .iter()
                    .map(|c| (c.as_str(), ColumnRole::Numeric)),
            )
    }

    /// Total number of feature columns.
    pub fn num_features(&self) -> usize {
        self.cate_cols.len() + self.nume_cols.len()
    }
}
