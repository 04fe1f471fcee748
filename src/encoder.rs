//! The stateful feature encoder.
//!
//! [`CateEncoder`] learns per-column encoding rules from one training pass
//! (`fit_transform`) and replays them deterministically on any later data
//! (`transform`, `predict`). The learned state is a tagged rule per column:
//!
//! - categorical columns get a rare-value filter (kept symbol set) — values
//!   outside it collapse to `<LESS>`, missing values to `<UNK>`;
//! - numeric columns get quantile bin edges — values bucket to a 0-based bin
//!   index, with -1 for missing or out-of-range;
//! - both kinds get an ordinal map from post-filter/post-bin symbol to a
//!   dense 0-based integer, assigned at first encounter scanning rows
//!   top-to-bottom (columns are fitted independently, so each column's map
//!   depends only on that column's values).
//!
//! Rules are immutable after fitting: `transform`/`predict` take `&self` and
//! are safe to run concurrently against a shared fitted encoder.
//!
//! A symbol that reaches ordinal lookup without a trained mapping (possible
//! only on post-fit data) resolves to a reserved per-column fallback index —
//! one past the last trained index — and is counted in the output's
//! [`EncodeReport`]. Data-quality anomalies never fail a batch.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, EncoderError, SchemaError};
use crate::frame::{Column, DataFrame};
use crate::schema::{ColumnRole, EncoderConfig};

/// Reserved symbol for a categorical value filtered out as rare.
pub const LESS_TOKEN: &str = "<LESS>";
/// Reserved symbol for a missing categorical value.
pub const UNK_TOKEN: &str = "<UNK>";
/// Sentinel bin index for a numeric value with no valid bin.
pub const NO_BIN: i64 = -1;

// ============================================================================
// Learned rules
// ============================================================================

/// The learned encoding rule for one column. Built once during
/// `fit_transform`, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnRule {
    Categorical {
        /// Symbols frequent enough in training to keep.
        kept: HashSet<String>,
        /// Post-filter symbol → dense index, in first-encounter order.
        ordinal: IndexMap<String, i64>,
    },
    Numeric {
        /// Deduplicated quantile boundaries, non-decreasing.
        /// Fewer than 2 edges means no bin can be formed.
        edges: Vec<f64>,
        /// Bin index (including [`NO_BIN`]) → dense index, in
        /// first-encounter order.
        ordinal: IndexMap<i64, i64>,
    },
}

impl ColumnRule {
    /// Number of distinct indices assigned during fitting.
    pub fn cardinality(&self) -> usize {
        match self {
            ColumnRule::Categorical { ordinal, .. } => ordinal.len(),
            ColumnRule::Numeric { ordinal, .. } => ordinal.len(),
        }
    }

    /// Reserved index for symbols never seen during fitting: one past the
    /// last trained index, so it never collides with a trained mapping.
    pub fn fallback_index(&self) -> i64 {
        self.cardinality() as i64
    }

    /// Trained quantile boundaries, for numeric rules.
    pub fn bin_edges(&self) -> Option<&[f64]> {
        match self {
            ColumnRule::Numeric { edges, .. } => Some(edges),
            ColumnRule::Categorical { .. } => None,
        }
    }

    /// Kept symbol set, for categorical rules.
    pub fn kept_values(&self) -> Option<&HashSet<String>> {
        match self {
            ColumnRule::Categorical { kept, .. } => Some(kept),
            ColumnRule::Numeric { .. } => None,
        }
    }
}

// ============================================================================
// Encoded output
// ============================================================================

/// Non-fatal data-quality observations from one fit/transform pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeReport {
    /// Columns whose learned rule carries little information: a rare-value
    /// filter that kept zero symbols, or quantile edges that collapsed below
    /// two distinct boundaries.
    pub degenerate_columns: Vec<String>,
    /// Per-column count of symbols that reached ordinal lookup without a
    /// trained mapping (resolved via the fallback index).
    pub unseen_values: IndexMap<String, u64>,
    /// Per-column count of numeric values outside the trained boundary range
    /// (assigned [`NO_BIN`] before ordinal remapping).
    pub out_of_range: IndexMap<String, u64>,
}

impl EncodeReport {
    pub fn total_unseen(&self) -> u64 {
        self.unseen_values.values().sum()
    }
}

/// An encoded dataset: feature columns replaced by dense integer indices
/// (artifact order: categorical first, then numeric), label untouched.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    col_names: Vec<String>,
    columns: Vec<Vec<i64>>,
    label: Vec<f64>,
    pub report: EncodeReport,
}

impl EncodedFrame {
    pub fn num_rows(&self) -> usize {
        self.label.len()
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    pub fn column(&self, name: &str) -> Option<&[i64]> {
        let pos = self.col_names.iter().position(|c| c == name)?;
        Some(&self.columns[pos])
    }

    pub fn label(&self) -> &[f64] {
        &self.label
    }

    /// Per-column embedding-table size: max observed index + 1.
    pub fn feature_sizes(&self) -> Vec<i64> {
        self.columns
            .iter()
            .map(|codes| codes.iter().copied().max().unwrap_or(-1) + 1)
            .collect()
    }

    /// The index matrix flattened row-major (C order), rows × feature
    /// columns.
    pub fn index_row_major(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.num_rows() * self.num_cols());
        for row in 0..self.num_rows() {
            for codes in &self.columns {
                out.push(codes[row]);
            }
        }
        out
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Stateful categorical/numeric feature encoder.
///
/// Lifecycle: construct with a validated [`EncoderConfig`], populate the
/// learned rules with exactly one [`fit_transform`](Self::fit_transform)
/// call, then apply them read-only with any number of
/// [`transform`](Self::transform) / [`predict`](Self::predict) calls.
/// There is no incremental refit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CateEncoder {
    config: EncoderConfig,
    rules: Option<IndexMap<String, ColumnRule>>,
}

/// Per-column result of the fitting pass.
struct FitColumn {
    name: String,
    rule: ColumnRule,
    codes: Vec<i64>,
    degenerate: bool,
}

/// Per-column result of a rule-application pass.
struct AppliedColumn {
    name: String,
    codes: Vec<i64>,
    unseen: u64,
    out_of_range: u64,
}

impl CateEncoder {
    /// Validate the declaration and store it. Touches no data.
    pub fn new(config: EncoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rules: None,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.rules.is_some()
    }

    /// Learned rules in artifact column order, once fitted.
    pub fn rules(&self) -> Option<&IndexMap<String, ColumnRule>> {
        self.rules.as_ref()
    }

    /// Learn per-column rules from training data and return its encoding.
    ///
    /// After this call the rules fully determine the encoding of any future
    /// schema-compatible row.
    pub fn fit_transform(&mut self, frame: &DataFrame) -> Result<EncodedFrame, EncoderError> {
        let columns = self.resolve_columns(frame)?;

        let pb = column_progress(columns.len(), "Fitting");
        let threshold = self.config.threshold;
        let thresrate = self.config.thresrate;
        let bins = self.config.bins;

        let fitted: Vec<FitColumn> = columns
            .into_par_iter()
            .map(|(name, column)| {
                let out = match column {
                    Column::Categorical(values) => {
                        fit_categorical(name, values, threshold, thresrate)
                    }
                    Column::Numeric(values) => fit_numeric(name, values, bins),
                };
                pb.inc(1);
                out
            })
            .collect();
        pb.finish_and_clear();

        let mut report = EncodeReport::default();
        let mut rules = IndexMap::with_capacity(fitted.len());
        let mut col_names = Vec::with_capacity(fitted.len());
        let mut codes = Vec::with_capacity(fitted.len());
        for col in fitted {
            if col.degenerate {
                warn!(
                    "column '{}': degenerate encoding ({} distinct index(es) learned)",
                    col.name,
                    col.rule.cardinality()
                );
                report.degenerate_columns.push(col.name.clone());
            }
            rules.insert(col.name.clone(), col.rule);
            col_names.push(col.name);
            codes.push(col.codes);
        }

        info!(
            "Fitted {} columns over {} rows",
            rules.len(),
            frame.num_rows()
        );
        self.rules = Some(rules);

        Ok(EncodedFrame {
            col_names,
            columns: codes,
            label: frame.label().to_vec(),
            report,
        })
    }

    /// Apply the learned rules (no re-fit) to new data.
    ///
    /// Filter membership and bin boundaries come from training statistics:
    /// a value that was frequent in training stays kept even if rare here.
    pub fn transform(&self, frame: &DataFrame) -> Result<EncodedFrame, EncoderError> {
        self.apply(frame, true)
    }

    /// Inference-time featurization of raw string records. Same learned
    /// pipeline as [`transform`](Self::transform), no file I/O, no progress
    /// reporting; textual missing markers are normalized before filtering so
    /// the two paths agree.
    pub fn predict(
        &self,
        records: &[HashMap<String, String>],
    ) -> Result<EncodedFrame, EncoderError> {
        let frame = DataFrame::from_records(records, &self.config)?;
        self.apply(&frame, false)
    }

    fn apply(&self, frame: &DataFrame, show_progress: bool) -> Result<EncodedFrame, EncoderError> {
        let rules = self.rules.as_ref().ok_or(EncoderError::NotFitted)?;
        let columns = self.resolve_columns(frame)?;

        let pb = if show_progress {
            column_progress(columns.len(), "Encoding")
        } else {
            ProgressBar::hidden()
        };

        let applied: Vec<AppliedColumn> = columns
            .into_par_iter()
            .map(|(name, column)| {
                // resolve_columns checked role agreement, so the rule variant
                // matches the column variant here.
                let out = match (&rules[name], column) {
                    (ColumnRule::Categorical { kept, ordinal }, Column::Categorical(values)) => {
                        apply_categorical(name, values, kept, ordinal)
                    }
                    (ColumnRule::Numeric { edges, ordinal }, Column::Numeric(values)) => {
                        apply_numeric(name, values, edges, ordinal)
                    }
                    _ => unreachable!("column role checked against rule variant"),
                };
                pb.inc(1);
                out
            })
            .collect();
        pb.finish_and_clear();

        let mut report = EncodeReport::default();
        let mut col_names = Vec::with_capacity(applied.len());
        let mut codes = Vec::with_capacity(applied.len());
        for col in applied {
            if col.unseen > 0 {
                warn!(
                    "column '{}': {} symbol(s) without a trained mapping resolved to the fallback index",
                    col.name, col.unseen
                );
                report.unseen_values.insert(col.name.clone(), col.unseen);
            }
            if col.out_of_range > 0 {
                warn!(
                    "column '{}': {} value(s) outside the trained bin range",
                    col.name, col.out_of_range
                );
                report.out_of_range.insert(col.name.clone(), col.out_of_range);
            }
            col_names.push(col.name);
            codes.push(col.codes);
        }

        Ok(EncodedFrame {
            col_names,
            columns: codes,
            label: frame.label().to_vec(),
            report,
        })
    }

    /// Resolve every declared feature column in the frame, checking role
    /// agreement. Fails fast before any encoding work.
    fn resolve_columns<'a>(
        &'a self,
        frame: &'a DataFrame,
    ) -> Result<Vec<(&'a str, &'a Column)>, SchemaError> {
        let mut out = Vec::with_capacity(self.config.num_features());
        for (name, role) in self.config.feature_cols() {
            let column = frame
                .column(name)
                .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
            let matches = matches!(
                (role, column),
                (ColumnRole::Categorical, Column::Categorical(_))
                    | (ColumnRole::Numeric, Column::Numeric(_))
            );
            if !matches {
                return Err(SchemaError::RoleMismatch(name.to_string()));
            }
            out.push((name, column));
        }
        Ok(out)
    }

    /// Serialize the full encoder (config + learned rules) to JSON.
    pub fn save_state(&self, path: &Path) -> Result<(), EncoderError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load an encoder previously written by [`save_state`](Self::save_state).
    pub fn load_state(path: &Path) -> Result<Self, EncoderError> {
        let reader = BufReader::new(File::open(path)?);
        let encoder: Self = serde_json::from_reader(reader)?;
        encoder.config.validate()?;
        Ok(encoder)
    }
}

// ============================================================================
// Per-column fitting
// ============================================================================

fn fit_categorical(
    name: &str,
    values: &[Option<String>],
    threshold: u64,
    thresrate: f64,
) -> FitColumn {
    // Frequency counts over non-missing values, in first-encounter order so
    // the rank cut below is deterministic under ties.
    let mut counts: IndexMap<&str, u64> = IndexMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }

    // Rank by descending count; the sort is stable, so ties keep
    // first-encounter order. Keep the top thresrate fraction of ranks
    // (a rank cut, not a frequency-mass cut) with count strictly above
    // threshold.
    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let eligible = (ranked.len() as f64 * thresrate) as usize;
    let kept: HashSet<String> = ranked[..eligible]
        .iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(value, _)| value.to_string())
        .collect();
    let degenerate = kept.is_empty();

    // Substitute and ordinal-fit in one row pass. Out-of-set values become
    // <LESS> before missing becomes <UNK>, so a missing value is never
    // mistaken for a rare-but-present one.
    let mut ordinal: IndexMap<String, i64> = IndexMap::new();
    let mut codes = Vec::with_capacity(values.len());
    for value in values {
        let symbol: &str = match value {
            None => UNK_TOKEN,
            Some(v) if kept.contains(v) => v,
            Some(_) => LESS_TOKEN,
        };
        let idx = match ordinal.get(symbol) {
            Some(&idx) => idx,
            None => {
                let idx = ordinal.len() as i64;
                ordinal.insert(symbol.to_string(), idx);
                idx
            }
        };
        codes.push(idx);
    }

    FitColumn {
        name: name.to_string(),
        rule: ColumnRule::Categorical { kept, ordinal },
        codes,
        degenerate,
    }
}

fn fit_numeric(name: &str, values: &[Option<f64>], bins: usize) -> FitColumn {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let edges = if sorted.is_empty() {
        Vec::new()
    } else {
        quantile_edges(&sorted, bins)
    };
    // Near-constant columns collapse to fewer than 2 distinct edges; every
    // value then gets NO_BIN. Low-information, not an error.
    let degenerate = edges.len() < 2;

    let mut ordinal: IndexMap<i64, i64> = IndexMap::new();
    let mut codes = Vec::with_capacity(values.len());
    for value in values {
        let bin = assign_bin(&edges, *value);
        let idx = match ordinal.get(&bin) {
            Some(&idx) => idx,
            None => {
                let idx = ordinal.len() as i64;
                ordinal.insert(bin, idx);
                idx
            }
        };
        codes.push(idx);
    }

    FitColumn {
        name: name.to_string(),
        rule: ColumnRule::Numeric { edges, ordinal },
        codes,
        degenerate,
    }
}

/// Quantile cut points over a sorted non-empty sample: `bins + 1` edges at
/// evenly spaced quantiles, linearly interpolated, with consecutive
/// duplicates dropped (heavy ties shrink the effective bin count).
fn quantile_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let n = sorted.len();
    let mut edges = Vec::with_capacity(bins + 1);
    for k in 0..=bins {
        let pos = (k as f64 / bins as f64) * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let edge = if lo == hi {
            sorted[lo]
        } else {
            sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
        };
        edges.push(edge);
    }
    edges.dedup_by(|a, b| a == b);
    edges
}

/// Bin for a numeric value under trained edges.
///
/// Intervals are right-closed with the lowest edge included
/// (inclusive-lowest): a value equal to an interior boundary falls in the
/// lower bin. Missing values and values outside [first, last] get
/// [`NO_BIN`].
fn assign_bin(edges: &[f64], value: Option<f64>) -> i64 {
    let Some(v) = value else { return NO_BIN };
    if edges.len() < 2 || v < edges[0] || v > edges[edges.len() - 1] {
        return NO_BIN;
    }
    edges[1..edges.len() - 1].partition_point(|&e| e < v) as i64
}

// ============================================================================
// Per-column rule application
// ============================================================================

fn apply_categorical(
    name: &str,
    values: &[Option<String>],
    kept: &HashSet<String>,
    ordinal: &IndexMap<String, i64>,
) -> AppliedColumn {
    let fallback = ordinal.len() as i64;
    let mut unseen = 0u64;
    let mut codes = Vec::with_capacity(values.len());
    for value in values {
        let symbol: &str = match value {
            None => UNK_TOKEN,
            Some(v) if kept.contains(v) => v,
            Some(_) => LESS_TOKEN,
        };
        let idx = match ordinal.get(symbol) {
            Some(&idx) => idx,
            None => {
                unseen += 1;
                fallback
            }
        };
        codes.push(idx);
    }
    AppliedColumn {
        name: name.to_string(),
        codes,
        unseen,
        out_of_range: 0,
    }
}

fn apply_numeric(
    name: &str,
    values: &[Option<f64>],
    edges: &[f64],
    ordinal: &IndexMap<i64, i64>,
) -> AppliedColumn {
    let fallback = ordinal.len() as i64;
    let mut unseen = 0u64;
    let mut out_of_range = 0u64;
    let mut codes = Vec::with_capacity(values.len());
    for value in values {
        let bin = assign_bin(edges, *value);
        if bin == NO_BIN && value.is_some() && edges.len() >= 2 {
            out_of_range += 1;
        }
        let idx = match ordinal.get(&bin) {
            Some(&idx) => idx,
            None => {
                unseen += 1;
                fallback
            }
        };
        codes.push(idx);
    }
    AppliedColumn {
        name: name.to_string(),
        codes,
        unseen,
        out_of_range,
    }
}

fn column_progress(total: usize, stage: &str) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(&format!(
            "  {stage:<10} {{bar:40.cyan/blue}} {{pos}}/{{len}} cols [{{elapsed_precise}}]"
        ))
        .unwrap()
        .progress_chars("##-"),
    );
    pb
}

// ============================================================================
// Tests
// ============================================================================
