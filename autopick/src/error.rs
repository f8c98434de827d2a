//! Error types for the picking pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a picking run.
///
/// Geometric violations (a patch window leaving the raster) are not listed
/// here: candidate generation excludes them by construction, so they panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Required file '{path}' does not exist")]
    MissingFile { path: PathBuf },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed file '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("No positive examples: the particle template cannot be averaged")]
    NoPositiveExamples,

    #[error("PCA channel {channel} has no training samples")]
    EmptyPcaSamples { channel: usize },

    #[error("Classifier '{stage}' needs both classes, got {positives} positive and {negatives} negative rows")]
    SingleClassTraining {
        stage: String,
        positives: usize,
        negatives: usize,
    },

    #[error("Serialization failed for '{path}': {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Pool(#[from] common::parallel::PoolError),
}

impl Error {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(
        what: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Error::DimensionMismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_message_names_path() {
        let err = Error::MissingFile {
            path: PathBuf::from("/models/run_svm.txt"),
        };
        assert_eq!(
            err.to_string(),
            "Required file '/models/run_svm.txt' does not exist"
        );
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::mismatch("PCA model slices", 30, 25);
        let msg = err.to_string();
        assert!(msg.contains("PCA model slices"));
        assert!(msg.contains("30"));
        assert!(msg.contains("25"));
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as StdError;

        let err = Error::Read {
            path: PathBuf::from("/data/mic.tif"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/data/mic.tif"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_single_class_message() {
        let err = Error::SingleClassTraining {
            stage: "stage 2".to_string(),
            positives: 5,
            negatives: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 2"));
        assert!(msg.contains("5 positive"));
    }
}
