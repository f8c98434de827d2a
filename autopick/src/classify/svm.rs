//! RBF-kernel C-SVC.
//!
//! Training solves the dual
//!
//! ```text
//! min 1/2 a'Qa - e'a,   0 <= a_i <= C,   y'a = 0,   Q_ij = y_i y_j K(x_i, x_j)
//! ```
//!
//! by sequential minimal optimization, picking the maximal violating pair at
//! every step. [`Label::Positive`] is the `+1` class, every other label `-1`.

use std::path::Path;

use common::FileFormat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SvmParams;
use crate::dataset::{Dataset, Label};
use crate::error::{Error, Result};

/// Stopping tolerance on the maximal KKT violation.
const TOLERANCE: f64 = 1e-3;

/// Floor for the curvature along the working pair.
const MIN_CURVATURE: f64 = 1e-12;

/// Trained classifier: support vectors with their signed dual coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmModel {
    pub params: SvmParams,
    pub rho: f64,
    pub support_vectors: Vec<Vec<f64>>,
    /// `y_i * alpha_i` per support vector.
    pub coefficients: Vec<f64>,
}

impl SvmModel {
    /// Trains on every row of `dataset`.
    ///
    /// `stage` names the classifier in the error raised when only one class
    /// is present.
    pub fn train(dataset: &Dataset, params: SvmParams, stage: &str) -> Result<Self> {
        let positives = dataset.count(Label::Positive);
        let negatives = dataset.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(Error::SingleClassTraining {
                stage: stage.to_string(),
                positives,
                negatives,
            });
        }

        let rows: Vec<&[f64]> = dataset.rows().collect();
        let y: Vec<f64> = dataset
            .labels()
            .iter()
            .map(|&l| if l == Label::Positive { 1.0 } else { -1.0 })
            .collect();

        let solution = Smo::new(&rows, &y, params).solve();

        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = solution
            .alpha
            .iter()
            .zip(&y)
            .zip(&rows)
            .filter(|((a, _), _)| **a > 0.0)
            .map(|((a, yi), row)| (row.to_vec(), a * yi))
            .unzip();

        debug!(
            stage,
            rows = rows.len(),
            positives,
            support_vectors = support_vectors.len(),
            iterations = solution.iterations,
            rho = solution.rho,
            "Trained SVM"
        );

        Ok(Self {
            params,
            rho: solution.rho,
            support_vectors,
            coefficients,
        })
    }

    /// Signed distance-like score; positive means [`Label::Positive`].
    pub fn decision_value(&self, features: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, coef)| coef * rbf(self.params.gamma, sv, features))
            .sum::<f64>()
            - self.rho
    }

    pub fn predict(&self, features: &[f64]) -> (Label, f64) {
        let value = self.decision_value(features);
        let label = if value > 0.0 {
            Label::Positive
        } else {
            Label::Negative
        };
        (label, value)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        common::serde::save_file_as(self, path, FileFormat::Json).map_err(|source| {
            Error::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Loads a model whose support vectors have `feature_len` values.
    pub fn load(path: &Path, feature_len: usize) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let model: Self =
            common::serde::load_file_as(path, FileFormat::Json).map_err(|source| {
                Error::Serialization {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        if model.support_vectors.len() != model.coefficients.len() {
            return Err(Error::malformed(
                path,
                format!(
                    "{} support vectors but {} coefficients",
                    model.support_vectors.len(),
                    model.coefficients.len()
                ),
            ));
        }
        if let Some((index, sv)) = model
            .support_vectors
            .iter()
            .enumerate()
            .find(|(_, sv)| sv.len() != feature_len)
        {
            return Err(Error::malformed(
                path,
                format!(
                    "support vector {index} has {} values, features have {feature_len}",
                    sv.len()
                ),
            ));
        }
        Ok(model)
    }
}

#[inline]
fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    let dist_sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * dist_sq).exp()
}

// ============================================================================
// SMO solver
// ============================================================================

struct Solution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

struct Smo<'a> {
    y: &'a [f64],
    c: f64,
    /// Row-major `Q` matrix.
    q: Vec<f64>,
    n: usize,
}

impl<'a> Smo<'a> {
    fn new(rows: &[&[f64]], y: &'a [f64], params: SvmParams) -> Self {
        let n = rows.len();
        let mut q = vec![0.0; n * n];
        q.par_chunks_mut(n).enumerate().for_each(|(i, q_row)| {
            for (j, q_ij) in q_row.iter_mut().enumerate() {
                *q_ij = y[i] * y[j] * rbf(params.gamma, rows[i], rows[j]);
            }
        });
        Self {
            y,
            c: params.c,
            q,
            n,
        }
    }

    #[inline]
    fn q_row(&self, i: usize) -> &[f64] {
        &self.q[i * self.n..(i + 1) * self.n]
    }

    #[inline]
    fn in_up(&self, alpha: f64, y: f64) -> bool {
        (y > 0.0 && alpha < self.c) || (y < 0.0 && alpha > 0.0)
    }

    #[inline]
    fn in_low(&self, alpha: f64, y: f64) -> bool {
        (y > 0.0 && alpha > 0.0) || (y < 0.0 && alpha < self.c)
    }

    /// Maximal violating pair `(i, j)`, or `None` once within tolerance.
    fn select_pair(&self, alpha: &[f64], grad: &[f64]) -> Option<(usize, usize)> {
        let mut up = (usize::MAX, f64::NEG_INFINITY);
        let mut low = (usize::MAX, f64::INFINITY);
        for t in 0..self.n {
            let v = -self.y[t] * grad[t];
            if self.in_up(alpha[t], self.y[t]) && v > up.1 {
                up = (t, v);
            }
            if self.in_low(alpha[t], self.y[t]) && v < low.1 {
                low = (t, v);
            }
        }
        if up.0 == usize::MAX || low.0 == usize::MAX || up.1 - low.1 < TOLERANCE {
            None
        } else {
            Some((up.0, low.0))
        }
    }

    fn solve(&self) -> Solution {
        let n = self.n;
        let c = self.c;
        let mut alpha = vec![0.0; n];
        let mut grad = vec![-1.0; n];
        let max_iterations = (100 * n).max(100_000);

        let mut iterations = 0;
        while iterations < max_iterations {
            let Some((i, j)) = self.select_pair(&alpha, &grad) else {
                break;
            };
            iterations += 1;

            let (qi, qj) = (self.q_row(i), self.q_row(j));
            let (old_i, old_j) = (alpha[i], alpha[j]);

            if self.y[i] != self.y[j] {
                let curvature = (qi[i] + qj[j] + 2.0 * qi[j]).max(MIN_CURVATURE);
                let delta = (-grad[i] - grad[j]) / curvature;
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let curvature = (qi[i] + qj[j] - 2.0 * qi[j]).max(MIN_CURVATURE);
                let delta = (grad[i] - grad[j]) / curvature;
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
            for (k, g) in grad.iter_mut().enumerate() {
                *g += qi[k] * di + qj[k] * dj;
            }
        }

        Solution {
            rho: self.rho(&alpha, &grad),
            alpha,
            iterations,
        }
    }

    /// Offset from free vectors, or the midpoint of the feasible interval.
    fn rho(&self, alpha: &[f64], grad: &[f64]) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free = 0usize;

        for t in 0..self.n {
            let yg = self.y[t] * grad[t];
            let at_upper = alpha[t] >= self.c;
            let at_lower = alpha[t] <= 0.0;
            if at_upper {
                if self.y[t] < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if at_lower {
                if self.y[t] > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free += 1;
                free_sum += yg;
            }
        }

        if free > 0 {
            free_sum / free as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetBuilder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blobs(seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut builder = DatasetBuilder::new();
        for _ in 0..20 {
            let p = [0.2 + rng.random_range(-0.1..0.1), 0.2 + rng.random_range(-0.1..0.1)];
            builder.push(Label::Positive, &p).unwrap();
            let n = [0.8 + rng.random_range(-0.1..0.1), 0.8 + rng.random_range(-0.1..0.1)];
            builder.push(Label::Negative, &n).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn test_separates_two_blobs() {
        let dataset = blobs(1);
        let model = SvmModel::train(&dataset, SvmParams::new(10.0, 2.0), "stage 1").unwrap();

        for (row, &label) in dataset.rows().zip(dataset.labels()) {
            assert_eq!(model.predict(row).0, label);
        }
        assert_eq!(model.predict(&[0.15, 0.25]).0, Label::Positive);
        assert_eq!(model.predict(&[0.85, 0.75]).0, Label::Negative);
        assert!(model.predict(&[0.2, 0.2]).1 > 0.0);
    }

    #[test]
    fn test_rbf_handles_xor() {
        let mut builder = DatasetBuilder::new();
        for &(x, y, label) in &[
            (0.0, 0.0, Label::Positive),
            (1.0, 1.0, Label::Positive),
            (0.0, 1.0, Label::Negative),
            (1.0, 0.0, Label::Negative),
        ] {
            builder.push(label, &[x, y]).unwrap();
        }
        let dataset = builder.finish();
        let model = SvmModel::train(&dataset, SvmParams::new(100.0, 2.0), "xor").unwrap();
        for (row, &label) in dataset.rows().zip(dataset.labels()) {
            assert_eq!(model.predict(row).0, label, "row {row:?}");
        }
    }

    #[test]
    fn test_dual_constraints_hold() {
        let dataset = blobs(7);
        let params = SvmParams::new(1.0, 1.0);
        let model = SvmModel::train(&dataset, params, "stage 1").unwrap();
        let sum: f64 = model.coefficients.iter().sum();
        assert!(sum.abs() < 1e-9, "y'a = {sum}");
        assert!(model.coefficients.iter().all(|c| c.abs() <= params.c + 1e-12));
        assert!(!model.support_vectors.is_empty());
    }

    #[test]
    fn test_auto_rejected_counts_as_negative() {
        let mut builder = DatasetBuilder::new();
        builder.push(Label::Positive, &[0.0]).unwrap();
        builder.push(Label::AutoRejected, &[1.0]).unwrap();
        let model = SvmModel::train(&builder.finish(), SvmParams::new(10.0, 1.0), "stage 2").unwrap();
        assert_eq!(model.predict(&[0.0]).0, Label::Positive);
        assert_eq!(model.predict(&[1.0]).0, Label::Negative);
    }

    #[test]
    fn test_single_class_is_an_error() {
        let mut builder = DatasetBuilder::new();
        builder.push(Label::Positive, &[0.0, 1.0]).unwrap();
        builder.push(Label::Positive, &[1.0, 0.0]).unwrap();
        let err = SvmModel::train(&builder.finish(), SvmParams::stage2(), "stage 2").unwrap_err();
        assert!(matches!(
            err,
            Error::SingleClassTraining {
                positives: 2,
                negatives: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_save_load_keeps_decisions() {
        let dataset = blobs(3);
        let model = SvmModel::train(&dataset, SvmParams::stage1(), "stage 1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_svm.txt");
        model.save(&path).unwrap();

        let loaded = SvmModel::load(&path, 2).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.decision_value(&[0.3, 0.4]), model.decision_value(&[0.3, 0.4]));
    }

    #[test]
    fn test_load_rejects_other_feature_length() {
        let model = SvmModel::train(&blobs(5), SvmParams::stage1(), "stage 1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_svm.txt");
        model.save(&path).unwrap();

        let err = SvmModel::load(&path, 22).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }), "{err}");
    }

    #[test]
    fn test_load_missing_model() {
        let err = SvmModel::load(Path::new("/nonexistent/model_svm.txt"), 2).unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
    }
}
