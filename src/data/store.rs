use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array};
use ndarray::{Array1, Array2};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::loader::write_columns;
use crate::error::{Error, Result};

/// Column holding the labels in Parquet and CSV training files.
pub const LABEL_COLUMN: &str = "label";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Save a training set (vectors + labels). Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – one Float64 column per feature plus `label`
/// * `.json`            – `{ "vectors": [[...], ...], "labels": [...] }`
/// * `.csv`             – header row, feature columns then `label`
pub fn save_training_set(path: &Path, vectors: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
    if vectors.nrows() != labels.len() {
        return Err(Error::Value(format!(
            "{} vectors but {} labels",
            vectors.nrows(),
            labels.len()
        )));
    }
    match extension(path).as_str() {
        "parquet" | "pq" => save_parquet(path, vectors, labels),
        "json" => save_json(path, vectors, labels),
        "csv" => save_csv(path, vectors, labels),
        other => Err(unsupported(other)),
    }?;
    log::info!(
        "Saved {} training vectors ({} features) to {}",
        vectors.nrows(),
        vectors.ncols(),
        path.display()
    );
    Ok(())
}

/// Load a training set written by [`save_training_set`].
pub fn load_training_set(path: &Path) -> Result<(Array2<f64>, Array1<f64>)> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => Err(unsupported(other)),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn unsupported(ext: &str) -> Error {
    Error::Configuration(format!("unsupported training set extension: .{ext}"))
}

fn feature_name(i: usize) -> String {
    format!("feature_{i}")
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn save_parquet(path: &Path, vectors: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
    let mut columns: Vec<(String, ArrayRef)> = vectors
        .columns()
        .into_iter()
        .enumerate()
        .map(|(i, col)| {
            let values: Float64Array = col.iter().copied().map(Some).collect();
            (feature_name(i), Arc::new(values) as ArrayRef)
        })
        .collect();
    let label_values: Float64Array = labels.iter().copied().map(Some).collect();
    columns.push((LABEL_COLUMN.to_string(), Arc::new(label_values)));
    write_columns(path, columns, HashMap::new())
}

fn load_parquet(path: &Path) -> Result<(Array2<f64>, Array1<f64>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let label_idx = builder.schema().index_of(LABEL_COLUMN).map_err(|_| {
        Error::DataAccess(format!("{} has no '{LABEL_COLUMN}' column", path.display()))
    })?;
    let reader = builder.build()?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels = Vec::new();
    for batch in reader {
        let batch = batch?;
        let columns: Vec<&Float64Array> = batch
            .columns()
            .iter()
            .map(|c| {
                c.as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| Error::Value(format!("expected Float64 column, got {:?}", c.data_type())))
            })
            .collect::<Result<_>>()?;
        for row in 0..batch.num_rows() {
            let mut vector = Vec::with_capacity(columns.len() - 1);
            for (i, col) in columns.iter().enumerate() {
                let value = if col.is_null(row) { f64::NAN } else { col.value(row) };
                if i == label_idx {
                    labels.push(value);
                } else {
                    vector.push(value);
                }
            }
            rows.push(vector);
        }
    }
    assemble(rows, labels)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// NaN has no JSON representation; it is stored as `null`.
#[derive(Debug, Serialize, Deserialize)]
struct TrainingFile {
    vectors: Vec<Vec<Option<f64>>>,
    labels: Vec<Option<f64>>,
}

fn to_json_value(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

fn save_json(path: &Path, vectors: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
    let doc = TrainingFile {
        vectors: vectors
            .rows()
            .into_iter()
            .map(|row| row.iter().copied().map(to_json_value).collect())
            .collect(),
        labels: labels.iter().copied().map(to_json_value).collect(),
    };
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    serde_json::to_writer(BufWriter::new(file), &doc)?;
    Ok(())
}

fn load_json(path: &Path) -> Result<(Array2<f64>, Array1<f64>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let doc: TrainingFile = serde_json::from_reader(BufReader::new(file))?;
    let rows = doc
        .vectors
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect();
    let labels = doc.labels.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    assemble(rows, labels)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn save_csv(path: &Path, vectors: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<String> = (0..vectors.ncols()).map(feature_name).collect();
    header.push(LABEL_COLUMN.to_string());
    writer.write_record(&header)?;
    for (row, label) in vectors.rows().into_iter().zip(labels.iter()) {
        let mut record: Vec<String> = row.iter().map(f64::to_string).collect();
        record.push(label.to_string());
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn load_csv(path: &Path) -> Result<(Array2<f64>, Array1<f64>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let label_idx = reader
        .headers()?
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .ok_or_else(|| Error::DataAccess(format!("{} has no '{LABEL_COLUMN}' column", path.display())))?;

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record?;
        let mut vector = Vec::with_capacity(record.len().saturating_sub(1));
        for (i, field) in record.iter().enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                Error::Value(format!("CSV row {row_no}, column {i}: '{field}' is not a number"))
            })?;
            if i == label_idx {
                labels.push(value);
            } else {
                vector.push(value);
            }
        }
        rows.push(vector);
    }
    assemble(rows, labels)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn assemble(rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_cols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != n_cols) {
        return Err(Error::Value(format!(
            "row {bad} has {} features, expected {n_cols}",
            rows[bad].len()
        )));
    }
    if rows.len() != labels.len() {
        return Err(Error::Value(format!(
            "{} vectors but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let n_rows = rows.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok((Array2::from_shape_vec((n_rows, n_cols), flat)?, Array1::from(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn training_set() -> (Array2<f64>, Array1<f64>) {
        (
            array![[230.5, 241.0, 0.25], [280.0, 279.5, -1.0]],
            array![5.0, 12.0],
        )
    }

    #[test]
    fn test_each_format_restores_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let (vectors, labels) = training_set();
        for name in ["set.parquet", "set.json", "set.csv"] {
            let path = dir.path().join(name);
            save_training_set(&path, &vectors, &labels).unwrap();
            let (v, l) = load_training_set(&path).unwrap();
            assert_eq!(v, vectors, "{name}");
            assert_eq!(l, labels, "{name}");
        }
    }

    #[test]
    fn test_json_keeps_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nan.json");
        let vectors = array![[1.0, f64::NAN]];
        save_training_set(&path, &vectors, &array![f64::NAN]).unwrap();
        let (v, l) = load_training_set(&path).unwrap();
        assert_eq!(v[[0, 0]], 1.0);
        assert!(v[[0, 1]].is_nan());
        assert!(l[0].is_nan());
    }

    #[test]
    fn test_unsupported_extension() {
        let (vectors, labels) = training_set();
        let err = save_training_set(Path::new("set.joblib"), &vectors, &labels).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (vectors, _) = training_set();
        let err = save_training_set(Path::new("set.csv"), &vectors, &array![1.0]).unwrap_err();
        assert!(matches!(err, Error::Value(_)));
    }
}
