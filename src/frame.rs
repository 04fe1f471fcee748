//! In-memory column-major dataset.
//!
//! A [`DataFrame`] holds one delimited-text dataset coerced to its declared
//! column roles: categorical columns as optional strings, numeric columns as
//! optional f64, the label as f64. A value that fails coercion is missing for
//! that column — messy input degrades to `None`, it never aborts the load.
//!
//! Two construction paths share the coercion rules:
//! - [`DataFrame::from_csv`] / [`DataFrame::from_reader`] for batch files;
//! - [`DataFrame::from_records`] for inference-time rows of raw strings,
//!   where textual missing markers ("nan" and friends) are normalized to the
//!   missing sentinel *before* any downstream stage sees them.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{EncoderError, SchemaError};
use crate::schema::{ColumnRole, EncoderConfig};

/// Textual markers normalized to "missing" on load.
const MISSING_MARKERS: &[&str] = &["", "nan", "NaN", "NAN", "null", "NULL", "NA", "N/A", "None"];

/// One feature column, coerced to its declared role.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Categorical(Vec<Option<String>>),
    Numeric(Vec<Option<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical(v) => v.len(),
            Column::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded dataset: feature columns in artifact order (categorical first,
/// then numeric, each in declaration order) plus the pass-through label.
#[derive(Debug, Clone)]
pub struct DataFrame {
    columns: IndexMap<String, Column>,
    label: Vec<f64>,
    num_rows: usize,
}

impl DataFrame {
    /// Load a CSV file (header row required) against a declared schema.
    pub fn from_csv(path: &Path, config: &EncoderConfig) -> Result<Self, EncoderError> {
        let file = File::open(path)?;
        Self::from_reader(file, config)
    }

    /// Load CSV content from any reader against a declared schema.
    ///
    /// Fails with [`SchemaError::MissingColumn`] if the header lacks a
    /// declared feature or label column.
    pub fn from_reader<R: Read>(reader: R, config: &EncoderConfig) -> Result<Self, EncoderError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let position_of = |name: &str| -> Result<usize, SchemaError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
        };

        // Resolve every declared column up front: schema errors fail fast,
        // before any row is read.
        let mut feature_positions: Vec<(String, ColumnRole, usize)> = Vec::new();
        for (name, role) in config.feature_cols() {
            feature_positions.push((name.to_string(), role, position_of(name)?));
        }
        let label_position = position_of(&config.label)?;

        let mut columns: IndexMap<String, Column> = feature_positions
            .iter()
            .map(|(name, role, _)| {
                let col = match role {
                    ColumnRole::Categorical => Column::Categorical(Vec::new()),
                    _ => Column::Numeric(Vec::new()),
                };
                (name.clone(), col)
            })
            .collect();
        let mut label = Vec::new();

        for record in rdr.records() {
            let record = record?;
            for (slot, (_, _, pos)) in columns.values_mut().zip(feature_positions.iter()) {
                let raw = record.get(*pos).unwrap_or("");
                match slot {
                    Column::Categorical(v) => v.push(coerce_categorical(raw)),
                    Column::Numeric(v) => v.push(coerce_numeric(raw)),
                }
            }
            let raw_label = record.get(label_position).unwrap_or("");
            label.push(coerce_numeric(raw_label).unwrap_or(f64::NAN));
        }

        let num_rows = label.len();
        Ok(Self {
            columns,
            label,
            num_rows,
        })
    }

    /// Build a frame from raw string records (one map per row) for
    /// inference-time featurization.
    ///
    /// Every declared feature column must be present as a key in every
    /// record ([`SchemaError::MissingColumn`] otherwise); the label key is
    /// optional, since inference rows carry no target.
    pub fn from_records(
        records: &[HashMap<String, String>],
        config: &EncoderConfig,
    ) -> Result<Self, EncoderError> {
        let mut columns: IndexMap<String, Column> = config
            .feature_cols()
            .map(|(name, role)| {
                let col = match role {
                    ColumnRole::Categorical => {
                        Column::Categorical(Vec::with_capacity(records.len()))
                    }
                    _ => Column::Numeric(Vec::with_capacity(records.len())),
                };
                (name.to_string(), col)
            })
            .collect();
        let mut label = Vec::with_capacity(records.len());

        for record in records {
            for (name, slot) in columns.iter_mut() {
                let raw = record
                    .get(name)
                    .ok_or_else(|| SchemaError::MissingColumn(name.clone()))?;
                match slot {
                    Column::Categorical(v) => v.push(coerce_categorical(raw)),
                    Column::Numeric(v) => v.push(coerce_numeric(raw)),
                }
            }
            let raw_label = record.get(&config.label).map(String::as_str).unwrap_or("");
            label.push(coerce_numeric(raw_label).unwrap_or(f64::NAN));
        }

        Ok(Self {
            num_rows: records.len(),
            columns,
            label,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Label values, one per row (NaN where the label was missing or
    /// unparseable).
    pub fn label(&self) -> &[f64] {
        &self.label
    }
}

/// Categorical coercion: text verbatim, missing markers to `None`.
fn coerce_categorical(raw: &str) -> Option<String> {
    if MISSING_MARKERS.contains(&raw.trim()) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Numeric coercion: f64 parse; markers, parse failures, and non-finite
/// parses are all missing.
fn coerce_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EncoderConfig {
        EncoderConfig {
            cate_cols: vec!["city".into()],
            nume_cols: vec!["price".into()],
            label: "clicked".into(),
            threshold: 0,
            thresrate: 1.0,
            bins: 4,
        }
    }

    #[test]
    fn csv_load_coerces_by_role() {
        let csv = "city,price,clicked\n\
                   tokyo,1.5,1\n\
                   osaka,not_a_number,0\n\
                   nan,2.5,1\n";
        let frame = DataFrame::from_reader(csv.as_bytes(), &config()).unwrap();
        assert_eq!(frame.num_rows(), 3);

        let Some(Column::Categorical(city)) = frame.column("city") else {
            panic!("city should be categorical");
        };
        assert_eq!(
            city,
            &vec![Some("tokyo".to_string()), Some("osaka".to_string()), None]
        );

        let Some(Column::Numeric(price)) = frame.column("price") else {
            panic!("price should be numeric");
        };
        assert_eq!(price, &vec![Some(1.5), None, Some(2.5)]);
        assert_eq!(frame.label(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_declared_column_fails_fast() {
        let csv = "city,clicked\ntokyo,1\n";
        let err = DataFrame::from_reader(csv.as_bytes(), &config()).unwrap_err();
        match err {
            EncoderError::Schema(SchemaError::MissingColumn(col)) => assert_eq!(col, "price"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn records_normalize_textual_nan_before_coercion() {
        let mut row = HashMap::new();
        row.insert("city".to_string(), "nan".to_string());
        row.insert("price".to_string(), "NaN".to_string());
        let frame = DataFrame::from_records(&[row], &config()).unwrap();

        assert_eq!(
            frame.column("city"),
            Some(&Column::Categorical(vec![None]))
        );
        assert_eq!(frame.column("price"), Some(&Column::Numeric(vec![None])));
        // No label key: carried as NaN, never an error.
        assert!(frame.label()[0].is_nan());
    }

    #[test]
    fn record_missing_feature_key_is_a_schema_error() {
        let mut row = HashMap::new();
        row.insert("city".to_string(), "tokyo".to_string());
        let err = DataFrame::from_records(&[row], &config()).unwrap_err();
        assert!(matches!(
            err,
            EncoderError::Schema(SchemaError::MissingColumn(col)) if col == "price"
        ));
    }
}
