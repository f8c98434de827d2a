//! Picked-position tables.
//!
//! A coordinate file is a JSON object mapping table names to record lists:
//!
//! ```json
//! { "model": [ { "x": 120, "y": 64, "enabled": 1, "cost": 0.73 } ] }
//! ```
//!
//! Coordinates are in original micrograph pixels.

use std::collections::BTreeMap;
use std::path::Path;

use common::FileFormat;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `enabled` value a reviewer sets on a rejected automatic pick.
pub const DISABLED: i32 = -1;

fn default_enabled() -> i32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRecord {
    pub x: i32,
    pub y: i32,
    #[serde(default = "default_enabled")]
    pub enabled: i32,
    #[serde(default)]
    pub cost: f64,
}

impl CoordinateRecord {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            enabled: default_enabled(),
            cost: 0.0,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.enabled == DISABLED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateFile {
    tables: BTreeMap<String, Vec<CoordinateRecord>>,
}

impl CoordinateFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
            });
        }
        common::serde::load_file_as(path, FileFormat::Json).map_err(|source| {
            Error::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Loads `path`, or returns an empty file if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        common::serde::save_file_as(self, path, FileFormat::Json).map_err(|source| {
            Error::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn table(&self, name: &str) -> Option<&[CoordinateRecord]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    /// Replaces (or creates) the table `name`.
    pub fn set_table(&mut self, name: impl Into<String>, records: Vec<CoordinateRecord>) {
        self.tables.insert(name.into(), records);
    }

    /// Records of every table, in table-name order.
    pub fn all_records(&self) -> impl Iterator<Item = &CoordinateRecord> {
        self.tables.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(Vec::is_empty)
    }
}
