use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::file_format::FileFormat;

pub type Result<T> = anyhow::Result<T>;

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> Result<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(serialized: &str, format: FileFormat) -> Result<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads and deserializes `path`, the format given by its extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    load_file_as(path, format)
}

/// Like [`load_file`], but with an explicit format for files whose
/// extension is fixed by convention (e.g. `_svm.txt`).
pub fn load_file_as<T: DeserializeOwned>(path: &Path, format: FileFormat) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    deserialize(&text, format).with_context(|| format!("Failed to parse '{}'", path.display()))
}

pub fn save_file_as<T: Serialize>(value: &T, path: &Path, format: FileFormat) -> Result<()> {
    let text = serialize(value, format)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write '{}'", path.display()))
}
