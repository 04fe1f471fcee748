//! Persisted artifacts: the three-array NPY dump and the readable CSV copy.
//!
//! ## NPY layout
//!
//! Each array is written as NPY format version 1.0, the exact container
//! `np.save` produces: the 6-byte magic `\x93NUMPY`, version bytes `01 00`,
//! a little-endian u16 header length, then an ASCII dict header padded with
//! spaces (newline-terminated) so the data section starts on a 64-byte
//! boundary, followed by the raw little-endian values.
//!
//! Per named run `<name>`:
//! - `<name>_label.npy`          — 1-D f64, one value per row
//! - `<name>_index.npy`          — 2-D i64, rows × feature columns, C order
//! - `<name>_feature_sizes.npy`  — 1-D i64, max observed index + 1 per column
//!
//! Downstream model code sizes its embedding tables from `feature_sizes` and
//! reads `index`/`label` as its training matrix; this module is the only
//! coupling between the encoder and any model.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::encoder::EncodedFrame;
use crate::error::EncoderError;

/// Write the three-array artifact for a named run into `out_dir`.
pub fn save_npy(frame: &EncodedFrame, out_dir: &Path, name: &str) -> Result<(), EncoderError> {
    write_npy_f64_1d(&out_dir.join(format!("{name}_label.npy")), frame.label())?;
    write_npy_i64_2d(
        &out_dir.join(format!("{name}_index.npy")),
        frame.num_rows(),
        frame.num_cols(),
        &frame.index_row_major(),
    )?;
    write_npy_i64_1d(
        &out_dir.join(format!("{name}_feature_sizes.npy")),
        &frame.feature_sizes(),
    )?;
    info!(
        "Wrote {name}_label.npy / {name}_index.npy / {name}_feature_sizes.npy to {}",
        out_dir.display()
    );
    Ok(())
}

/// Write the encoded table as delimited text for inspection: feature columns
/// (artifact order) then the label.
pub fn write_csv(frame: &EncodedFrame, path: &Path) -> Result<(), EncoderError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = frame.col_names().iter().map(String::as_str).collect();
    header.push("label");
    writer.write_record(&header)?;

    let columns: Vec<&[i64]> = frame
        .col_names()
        .iter()
        .map(|name| frame.column(name).expect("encoded frame owns its columns"))
        .collect();
    for row in 0..frame.num_rows() {
        let mut record: Vec<String> = columns.iter().map(|c| c[row].to_string()).collect();
        record.push(frame.label()[row].to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_npy_i64_1d(path: &Path, data: &[i64]) -> Result<(), EncoderError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_npy_header(&mut w, "<i8", &format!("({},)", data.len()))?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

fn write_npy_i64_2d(path: &Path, rows: usize, cols: usize, data: &[i64]) -> Result<(), EncoderError> {
    debug_assert_eq!(data.len(), rows * cols);
    let mut w = BufWriter::new(File::create(path)?);
    write_npy_header(&mut w, "<i8", &format!("({rows}, {cols})"))?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

fn write_npy_f64_1d(path: &Path, data: &[f64]) -> Result<(), EncoderError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_npy_header(&mut w, "<f8", &format!("({},)", data.len()))?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// NPY v1.0 preamble. The dict header is space-padded and newline-terminated
/// so the data section begins at a multiple of 64 bytes.
fn write_npy_header<W: Write>(w: &mut W, descr: &str, shape: &str) -> std::io::Result<()> {
    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    let unpadded = 6 + 2 + 2 + header.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');

    w.write_all(b"\x93NUMPY")?;
    w.write_all(&[0x01, 0x00])?;
    w.write_all(&(header.len() as u16).to_le_bytes())?;
    w.write_all(header.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CateEncoder;
    use crate::frame::DataFrame;
    use crate::schema::EncoderConfig;

    /// Split a raw `.npy` file into (header string, data bytes), checking
    /// the container invariants along the way.
    fn split_npy(bytes: &[u8]) -> (String, &[u8]) {
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        assert_eq!(&bytes[6..8], &[0x01, 0x00]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let data_start = 10 + header_len;
        assert_eq!(data_start % 64, 0, "data must start on a 64-byte boundary");
        let header = String::from_utf8(bytes[10..data_start].to_vec()).unwrap();
        assert!(header.ends_with('\n'));
        (header, &bytes[data_start..])
    }

    fn read_i64(data: &[u8]) -> Vec<i64> {
        data.chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn read_f64(data: &[u8]) -> Vec<f64> {
        data.chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn fitted_frame() -> crate::encoder::EncodedFrame {
        let config = EncoderConfig {
            cate_cols: vec!["city".into()],
            nume_cols: vec!["x".into()],
            label: "label".into(),
            threshold: 0,
            thresrate: 1.0,
            bins: 2,
        };
        let csv = "city,x,label\na,1.0,1\nb,2.0,0\na,3.0,1\nc,4.0,0\n";
        let mut encoder = CateEncoder::new(config.clone()).unwrap();
        let train = DataFrame::from_reader(csv.as_bytes(), &config).unwrap();
        encoder.fit_transform(&train).unwrap()
    }

    #[test]
    fn npy_artifact_round_trips_bytes() {
        let encoded = fitted_frame();
        let dir = tempfile::tempdir().unwrap();
        save_npy(&encoded, dir.path(), "train").unwrap();

        // Index: 4 rows x 2 cols of i64, C order.
        let bytes = std::fs::read(dir.path().join("train_index.npy")).unwrap();
        let (header, data) = split_npy(&bytes);
        assert!(header.contains("'descr': '<i8'"));
        assert!(header.contains("'fortran_order': False"));
        assert!(header.contains("(4, 2)"));
        assert_eq!(read_i64(data), encoded.index_row_major());

        // Feature sizes: one entry per feature column.
        let bytes = std::fs::read(dir.path().join("train_feature_sizes.npy")).unwrap();
        let (header, data) = split_npy(&bytes);
        assert!(header.contains("(2,)"));
        assert_eq!(read_i64(data), encoded.feature_sizes());

        // Label: f64 pass-through.
        let bytes = std::fs::read(dir.path().join("train_label.npy")).unwrap();
        let (header, data) = split_npy(&bytes);
        assert!(header.contains("'descr': '<f8'"));
        assert_eq!(read_f64(data), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn csv_dump_is_readable_and_aligned() {
        let encoded = fitted_frame();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_cate.csv");
        write_csv(&encoded, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("city,x,label"));
        assert_eq!(lines.clone().count(), encoded.num_rows());
        // First training row: city 'a' -> 0, x bin 0 -> 0, label 1.
        assert_eq!(lines.next(), Some("0,0,1"));
    }
}
