//! File names of a picking session.
//!
//! Per-micrograph files hang off the output root, everything learned hangs
//! off the model root. Suffixes are fixed so sessions can resume.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub filter_bank: PathBuf,
    pub auto_positions: PathBuf,
    /// Table of `auto_positions` holding this model's picks.
    pub auto_table: String,

    pub invariant_positive: PathBuf,
    pub invariant_negative: PathBuf,
    pub particle_positive: PathBuf,
    pub particle_negative: PathBuf,
    pub pca_model: PathBuf,
    pub svm: PathBuf,
    pub svm2: PathBuf,
    pub training_set: PathBuf,
    pub auto_vectors: PathBuf,
    pub rejected_vectors: PathBuf,
    pub particle_avg: PathBuf,
}

impl SessionPaths {
    pub fn new(output_root: &Path, model_root: &Path) -> Self {
        let auto_table = model_root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        Self {
            filter_bank: suffixed(output_root, "_filterbank.stk"),
            auto_positions: suffixed(output_root, "_auto.pos"),
            auto_table,
            invariant_positive: suffixed(model_root, "_invariant_Positive.stk"),
            invariant_negative: suffixed(model_root, "_invariant_Negative.stk"),
            particle_positive: suffixed(model_root, "_particle_Positive.stk"),
            particle_negative: suffixed(model_root, "_particle_Negative.stk"),
            pca_model: suffixed(model_root, "_pca_model.stk"),
            svm: suffixed(model_root, "_svm.txt"),
            svm2: suffixed(model_root, "_svm2.txt"),
            training_set: suffixed(model_root, "_training.txt"),
            auto_vectors: suffixed(model_root, "_auto_vector.txt"),
            rejected_vectors: suffixed(model_root, "_rejected_vector.txt"),
            particle_avg: suffixed(model_root, "_particle_avg.xmp"),
        }
    }
}

fn suffixed(root: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(root.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
