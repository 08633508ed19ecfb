use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors raised by the extraction pipeline.
///
/// The first three variants are the ones callers are expected to match on;
/// the rest wrap failures of the underlying format libraries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid parameter, malformed file name template, or no
    /// reference file available.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing file, variable, channel or mask entry.
    #[error("data access error: {0}")]
    DataAccess(String),

    /// Ambiguous label standard, mismatched array lengths, out-of-grid index.
    #[error("value error: {0}")]
    Value(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parquet(#[from] ParquetError),

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[cfg(feature = "netcdf")]
    #[error(transparent)]
    NetCdf(#[from] netcdf::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map an I/O failure on `path`; a missing file is a data access error.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::DataAccess(format!("file not found: {}", path.display()))
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_data_access() {
        let err = Error::io(
            Path::new("nope.parquet"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::DataAccess(_)));
        assert!(err.to_string().contains("nope.parquet"));
    }

    #[test]
    fn test_other_io_errors_are_wrapped() {
        let err = Error::io(
            Path::new("locked"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Io { .. }));
    }
}
