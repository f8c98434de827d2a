//! Labelled feature-vector training set.
//!
//! Rows accumulate through [`DatasetBuilder`] across training runs and are
//! finalized into an immutable [`Dataset`] before classifier training.
//!
//! Text format: header `rows cols`, then per row the numeric label followed
//! by `cols` values.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::text::{Tokens, read_text, write_text};
use crate::io::vectors::push_row;
use crate::math::min_max_normalize;

/// Sample class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// Manually picked particle.
    Positive,
    /// Background sampled away from known particles.
    Negative,
    /// Automatic pick a reviewer rejected.
    AutoRejected,
}

impl Label {
    pub fn code(self) -> u8 {
        match self {
            Label::Positive => 1,
            Label::Negative => 2,
            Label::AutoRejected => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Label::Positive),
            2 => Some(Label::Negative),
            3 => Some(Label::AutoRejected),
            _ => None,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Append-only accumulation of labelled rows of one width.
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    cols: Option<usize>,
    values: Vec<f64>,
    labels: Vec<Label>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues accumulating on top of a finished dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            cols: (!dataset.is_empty()).then_some(dataset.cols),
            values: dataset.values,
            labels: dataset.labels,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn push(&mut self, label: Label, row: &[f64]) -> Result<()> {
        match self.cols {
            Some(cols) if cols != row.len() => {
                return Err(Error::mismatch("training row length", cols, row.len()));
            }
            Some(_) => {}
            None => self.cols = Some(row.len()),
        }
        self.values.extend_from_slice(row);
        self.labels.push(label);
        debug_assert_eq!(self.values.len(), self.labels.len() * row.len());
        Ok(())
    }

    pub fn extend<R: AsRef<[f64]>>(&mut self, label: Label, rows: &[R]) -> Result<()> {
        rows.iter().try_for_each(|row| self.push(label, row.as_ref()))
    }

    pub fn finish(self) -> Dataset {
        Dataset {
            cols: self.cols.unwrap_or(0),
            values: self.values,
            labels: self.labels,
        }
    }
}

// ============================================================================
// Dataset
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    cols: usize,
    values: Vec<f64>,
    labels: Vec<Label>,
}

impl Dataset {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.cols..(index + 1) * self.cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.len()).map(|i| self.row(i))
    }

    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Every row min-max normalized on its own.
    pub fn normalized_rows(&self) -> Dataset {
        let mut values = self.values.clone();
        if self.cols > 0 {
            values.chunks_mut(self.cols).for_each(min_max_normalize);
        }
        Dataset {
            cols: self.cols,
            values,
            labels: self.labels.clone(),
        }
    }

    /// Positives against everything else.
    pub fn stage1(&self) -> Dataset {
        self.relabel(|label| match label {
            Label::Positive => Some(Label::Positive),
            Label::Negative | Label::AutoRejected => Some(Label::Negative),
        })
    }

    /// Positives against rejected automatic picks only.
    pub fn stage2(&self) -> Dataset {
        self.relabel(|label| match label {
            Label::Positive => Some(Label::Positive),
            Label::AutoRejected => Some(Label::Negative),
            Label::Negative => None,
        })
    }

    fn relabel(&self, map: impl Fn(Label) -> Option<Label>) -> Dataset {
        let mut builder = DatasetBuilder {
            cols: Some(self.cols),
            ..Default::default()
        };
        for (row, &label) in self.rows().zip(&self.labels) {
            if let Some(label) = map(label) {
                builder.values.extend_from_slice(row);
                builder.labels.push(label);
            }
        }
        builder.finish()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "{} {}", self.len(), self.cols);
        for (row, label) in self.rows().zip(&self.labels) {
            let _ = write!(text, "{} ", label.code());
            push_row(&mut text, row);
        }
        write_text(path, &text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_text(path)?;
        let mut tokens = Tokens::new(path, &text);
        let rows: usize = tokens.next("row count")?;
        let cols: usize = tokens.next("column count")?;

        if rows.checked_mul(cols).is_none() {
            return Err(Error::malformed(
                path,
                format!("header size {rows} x {cols} overflows"),
            ));
        }

        // grown as rows parse, the header is not trusted for allocation
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for index in 0..rows {
            let code: u8 = tokens.next("label")?;
            let label = Label::from_code(code).ok_or_else(|| {
                Error::malformed(path, format!("row {index} has unknown label {code}"))
            })?;
            labels.push(label);
            values.extend(tokens.row(cols, "training value")?);
        }
        Ok(Self {
            cols,
            values,
            labels,
        })
    }

    /// Loads `path` if it exists, otherwise an empty dataset.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut builder = DatasetBuilder::new();
        builder.push(Label::Positive, &[1.0, 2.0, 3.0]).unwrap();
        builder.push(Label::Negative, &[4.0, 4.0, 4.0]).unwrap();
        builder.push(Label::AutoRejected, &[0.5, -0.5, 1.5]).unwrap();
        builder.push(Label::Positive, &[9.0, 7.0, 8.0]).unwrap();
        builder.finish()
    }

    #[test]
    fn test_rows_and_labels_stay_in_step() {
        let mut builder = DatasetBuilder::new();
        for i in 0..5 {
            builder.push(Label::Negative, &[i as f64; 4]).unwrap();
            assert_eq!(builder.len(), i + 1);
        }
        builder.extend(Label::Positive, &[vec![1.0; 4], vec![2.0; 4]]).unwrap();
        let dataset = builder.finish();
        assert_eq!(dataset.len(), 7);
        assert_eq!(dataset.rows().count(), dataset.labels().len());
        assert_eq!(dataset.row(6), &[2.0; 4]);
    }

    #[test]
    fn test_push_rejects_other_width() {
        let mut builder = DatasetBuilder::new();
        builder.push(Label::Positive, &[1.0, 2.0]).unwrap();
        let err = builder.push(Label::Positive, &[1.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_save_load_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_training.txt");
        let dataset = sample();
        dataset.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("4 3"));
        assert_eq!(lines.next(), Some("1 1 2 3"));
        assert_eq!(lines.nth(1), Some("3 0.5 -0.5 1.5"));

        assert_eq!(Dataset::load(&path).unwrap(), dataset);
    }

    #[test]
    fn test_unknown_label_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "1 2\n7 0.1 0.2\n").unwrap();
        assert!(matches!(Dataset::load(&path), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_oversized_header_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.txt");

        std::fs::write(&path, "4294967296 4294967296\n1 0.5\n").unwrap();
        assert!(matches!(Dataset::load(&path), Err(Error::Malformed { .. })));

        // fits in memory arithmetic, but the rows are not there
        std::fs::write(&path, "1000000 1000000\n1 0.5\n").unwrap();
        assert!(matches!(Dataset::load(&path), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_appending_to_loaded_dataset() {
        let mut builder = DatasetBuilder::from_dataset(sample());
        builder.push(Label::Negative, &[0.0, 0.0, 0.0]).unwrap();
        assert!(builder.push(Label::Negative, &[0.0]).is_err());
        assert_eq!(builder.finish().len(), 5);

        let mut fresh = DatasetBuilder::from_dataset(Dataset::default());
        fresh.push(Label::Positive, &[1.0]).unwrap();
        assert_eq!(fresh.finish().cols(), 1);
    }

    #[test]
    fn test_row_normalization() {
        let normalized = sample().normalized_rows();
        assert_eq!(normalized.row(0), &[0.0, 0.5, 1.0]);
        // constant row maps to zero
        assert_eq!(normalized.row(1), &[0.0, 0.0, 0.0]);
        assert_eq!(normalized.row(3), &[1.0, 0.0, 0.5]);
        assert_eq!(normalized.labels(), sample().labels());
    }

    #[test]
    fn test_stage_subsets() {
        let dataset = sample();

        let stage1 = dataset.stage1();
        assert_eq!(stage1.len(), 4);
        assert_eq!(
            stage1.labels(),
            &[Label::Positive, Label::Negative, Label::Negative, Label::Positive]
        );

        let stage2 = dataset.stage2();
        assert_eq!(stage2.len(), 3);
        assert_eq!(stage2.labels(), &[Label::Positive, Label::Negative, Label::Positive]);
        assert_eq!(stage2.row(1), &[0.5, -0.5, 1.5]);
        assert_eq!(stage2.count(Label::Positive), 2);
    }
}
