//! Plain-text feature vector lists.
//!
//! Header line `count cols`, then one whitespace-separated row per vector.

use std::fmt::Write as _;
use std::path::Path;

use super::text::{Tokens, read_text, write_text};
use crate::error::{Error, Result};

/// Writes `rows` (all of the same length) to `path`.
pub fn write(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let cols = rows.first().map_or(0, Vec::len);
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
        return Err(Error::mismatch(
            format!("feature vector {index} length"),
            cols,
            row.len(),
        ));
    }

    let mut text = String::new();
    let _ = writeln!(text, "{} {}", rows.len(), cols);
    for row in rows {
        push_row(&mut text, row);
    }
    write_text(path, &text)
}

pub fn read(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = read_text(path)?;
    let mut tokens = Tokens::new(path, &text);
    let count: usize = tokens.next("vector count")?;
    let cols: usize = tokens.next("vector length")?;
    (0..count).map(|_| tokens.row(cols, "feature value")).collect()
}

pub(crate) fn push_row(text: &mut String, row: &[f64]) {
    for (i, v) in row.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        let _ = write!(text, "{v}");
    }
    text.push('\n');
}
