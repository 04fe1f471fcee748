//! Encoder binary: fits the feature encoder on a training CSV and writes the
//! encoded artifacts consumed by model training.
//!
//! ## Input
//!
//! - `--schema <file>` — JSON column-role declaration:
//!   `{ "cate_cols": [...], "nume_cols": [...], "label": "..." }`
//! - `--train-csv <file>` — training data (header row required)
//! - `--test-csv <file>` — optional held-out data, encoded with the rules
//!   learned from the training set (never re-fit)
//!
//! ## Output
//!
//! Written to `--out-dir`:
//! - `train_label.npy`, `train_index.npy`, `train_feature_sizes.npy`
//! - `train_cate.csv` — readable copy of the encoded training table
//! - the same four files with a `test` prefix when `--test-csv` is given
//! - `encoder.json` — fitted encoder state, when `--save-state` is given
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin encode -- \
//!     --schema schema.json --train-csv train.csv --test-csv test.csv \
//!     --out-dir out -b 10 -t 10 -r 0.99
//! ```

use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{HumanCount, HumanDuration};
use serde::Deserialize;
use tracing::info;

use cate_encoder::{artifact, CateEncoder, DataFrame, EncoderConfig};

#[derive(Parser, Debug)]
#[command(about = "Fit the CTR feature encoder and write npy artifacts")]
struct Args {
    /// Path to the JSON column-role declaration.
    #[arg(long)]
    schema: PathBuf,

    /// Training CSV; the encoder's rules are learned here.
    #[arg(long)]
    train_csv: PathBuf,

    /// Optional test CSV, encoded with the trained rules.
    #[arg(long)]
    test_csv: Option<PathBuf>,

    /// Output directory for the npy/csv artifacts.
    #[arg(long)]
    out_dir: PathBuf,

    /// Target quantile count for numeric discretization.
    #[arg(short = 'b', long, default_value_t = 10)]
    num_bins: usize,

    /// Minimum absolute frequency for a categorical value to be kept.
    #[arg(short = 't', long, default_value_t = 10)]
    threshold: u64,

    /// Fraction of distinct values (by frequency rank) eligible for keeping.
    #[arg(short = 'r', long, default_value_t = 0.99)]
    thresrate: f64,

    /// Also write the fitted encoder state (JSON) to this path.
    #[arg(long)]
    save_state: Option<PathBuf>,
}

/// On-disk shape of the schema declaration file.
#[derive(Deserialize, Debug)]
struct RawSchema {
    cate_cols: Vec<String>,
    nume_cols: Vec<String>,
    label: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let raw: RawSchema = serde_json::from_reader(BufReader::new(File::open(&args.schema)?))?;
    let config = EncoderConfig {
        cate_cols: raw.cate_cols,
        nume_cols: raw.nume_cols,
        label: raw.label,
        threshold: args.threshold,
        thresrate: args.thresrate,
        bins: args.num_bins,
    };

    info!("Schema:   {}", args.schema.display());
    info!("Train:    {}", args.train_csv.display());
    if let Some(test) = &args.test_csv {
        info!("Test:     {}", test.display());
    }
    info!("Output:   {}", args.out_dir.display());
    info!(
        "Params:   threshold={} thresrate={} bins={}",
        config.threshold, config.thresrate, config.bins
    );

    fs::create_dir_all(&args.out_dir)?;
    let start = std::time::Instant::now();

    let mut encoder = CateEncoder::new(config.clone())?;

    info!("Fitting and transforming {}", args.train_csv.display());
    let train = DataFrame::from_csv(&args.train_csv, &config)?;
    let encoded = encoder.fit_transform(&train)?;
    artifact::save_npy(&encoded, &args.out_dir, "train")?;
    artifact::write_csv(&encoded, &args.out_dir.join("train_cate.csv"))?;
    info!(
        "Encoded {} training rows x {} feature columns",
        HumanCount(encoded.num_rows() as u64),
        encoded.num_cols()
    );

    if let Some(test_csv) = &args.test_csv {
        info!("Transforming {}", test_csv.display());
        let test = DataFrame::from_csv(test_csv, &config)?;
        let encoded = encoder.transform(&test)?;
        artifact::save_npy(&encoded, &args.out_dir, "test")?;
        artifact::write_csv(&encoded, &args.out_dir.join("test_cate.csv"))?;
        info!(
            "Encoded {} test rows ({} unseen symbol(s) hit fallback indices)",
            HumanCount(encoded.num_rows() as u64),
            encoded.report.total_unseen()
        );
    }

    if let Some(state_path) = &args.save_state {
        encoder.save_state(state_path)?;
        info!("Saved fitted encoder state to {}", state_path.display());
    }

    info!("Done in {}", HumanDuration(start.elapsed()));
    Ok(())
}
