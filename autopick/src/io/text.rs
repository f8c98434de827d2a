//! Whitespace-tokenized reading of the plain-text matrix formats.

use std::path::{Path, PathBuf};
use std::str::{FromStr, SplitWhitespace};

use crate::error::{Error, Result};

pub(crate) struct Tokens<'a> {
    path: PathBuf,
    inner: SplitWhitespace<'a>,
    consumed: usize,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(path: &Path, text: &'a str) -> Self {
        Self {
            path: path.to_path_buf(),
            inner: text.split_whitespace(),
            consumed: 0,
        }
    }

    pub(crate) fn next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.inner.next().ok_or_else(|| {
            Error::malformed(
                &self.path,
                format!("unexpected end of file reading {what} (token {})", self.consumed + 1),
            )
        })?;
        self.consumed += 1;
        token.parse().map_err(|_| {
            Error::malformed(
                &self.path,
                format!("invalid {what} '{token}' (token {})", self.consumed),
            )
        })
    }

    pub(crate) fn row(&mut self, cols: usize, what: &str) -> Result<Vec<f64>> {
        (0..cols).map(|_| self.next::<f64>(what)).collect()
    }
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}
