//! Feature encoding pipeline for CTR prediction models.
//!
//! Transforms raw, possibly-dirty tabular data into a stable,
//! bounded-cardinality integer-indexed representation suitable for embedding
//! lookup. The pipeline is a sequence of per-column stages: role coercion,
//! rare-value filtering (categorical), quantile binning (numeric), and
//! ordinal encoding — learned once from a training set, then replayed
//! deterministically on any later data.
//!
//! The persisted output is a three-array contract
//! (`label` / `index` / `feature_sizes`, see [`artifact`]) consumed by
//! downstream model code to size embedding tables and build training
//! matrices.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod artifact;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod schema;

pub use encoder::{CateEncoder, ColumnRule, EncodeReport, EncodedFrame, LESS_TOKEN, NO_BIN, UNK_TOKEN};
pub use error::{ConfigError, EncoderError, SchemaError};
pub use frame::{Column, DataFrame};
pub use schema::{ColumnRole, EncoderConfig};
