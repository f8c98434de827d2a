//! Per-channel PCA of invariant correlation maps.
//!
//! Persisted as one stack in channel-major order:
//! `[avg_0, b_0_0 .. b_0_(npca-1), avg_1, b_1_0, ...]`, every slice shaped
//! like a polar map.

use std::path::Path;

use common::Buffer2;
use nalgebra::{DMatrix, SVD};
use tracing::{debug, info};

use crate::config::Geometry;
use crate::error::{Error, Result};
use crate::io::stack;

/// Singular values below this fraction of the largest are treated as zero.
const RELATIVE_RANK_TOLERANCE: f64 = 1e-9;

/// Average and orthonormal basis of one correlation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaChannel {
    pub average: Vec<f64>,
    pub basis: Vec<Vec<f64>>,
}

impl PcaChannel {
    /// Learns `npca` principal axes of `samples` (equal-length vectors).
    ///
    /// Axes beyond the rank of the centred samples are zero vectors.
    pub fn train(channel: usize, samples: &[&[f64]], npca: usize) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(Error::EmptyPcaSamples { channel });
        };
        let dim = first.len();
        if let Some(bad) = samples.iter().find(|s| s.len() != dim) {
            return Err(Error::mismatch(
                format!("PCA channel {channel} sample length"),
                dim,
                bad.len(),
            ));
        }

        let n = samples.len();
        let mut average = vec![0.0; dim];
        for sample in samples {
            for (a, v) in average.iter_mut().zip(sample.iter()) {
                *a += v;
            }
        }
        average.iter_mut().for_each(|a| *a /= n as f64);

        let centred = DMatrix::from_fn(n, dim, |i, j| samples[i][j] - average[j]);
        let svd = SVD::new(centred, false, true);

        let mut basis = vec![vec![0.0; dim]; npca];
        if let Some(v_t) = svd.v_t {
            let singular = &svd.singular_values;
            let mut order: Vec<usize> = (0..singular.len()).collect();
            order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

            let largest = order.first().map_or(0.0, |&i| singular[i]);
            let tolerance = largest * RELATIVE_RANK_TOLERANCE;
            for (component, &idx) in basis.iter_mut().zip(&order) {
                if !(singular[idx] > tolerance) {
                    break;
                }
                component
                    .iter_mut()
                    .zip(v_t.row(idx).iter())
                    .for_each(|(c, v)| *c = *v);
                orient(component);
            }
        }

        debug!(channel, samples = n, dim, npca, "Trained PCA channel");
        Ok(Self { average, basis })
    }

    /// Dot products of `values - average` with every basis vector.
    pub fn project_into(&self, values: &[f64], out: &mut Vec<f64>) {
        debug_assert_eq!(values.len(), self.average.len());
        let centred: Vec<f64> = values
            .iter()
            .zip(&self.average)
            .map(|(v, a)| v - a)
            .collect();
        out.extend(
            self.basis
                .iter()
                .map(|b| b.iter().zip(&centred).map(|(x, y)| x * y).sum::<f64>()),
        );
    }
}

/// Unit length, largest-magnitude coefficient positive.
fn orient(component: &mut [f64]) {
    let norm = component.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return;
    }
    let pivot = component
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    let scale = if pivot < 0.0 { -1.0 / norm } else { 1.0 / norm };
    component.iter_mut().for_each(|v| *v *= scale);
}

/// PCA bases of every correlation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaModel {
    width: usize,
    height: usize,
    channels: Vec<PcaChannel>,
}

impl PcaModel {
    /// Trains one channel per correlation map from a sample-major invariant
    /// stack (sample `k`, channel `i` at slice `k * num_correlation + i`).
    pub fn train(invariants: &[Buffer2<f64>], geometry: &Geometry) -> Result<Self> {
        let num_corr = geometry.num_correlation;
        if invariants.len() % num_corr != 0 {
            return Err(Error::mismatch(
                "invariant stack length (multiple of the channel count)",
                num_corr,
                invariants.len(),
            ));
        }
        let (width, height) = (geometry.nr_steps, geometry.ang_steps);
        if let Some(bad) = invariants.iter().find(|s| s.dimensions() != (width, height)) {
            return Err(Error::mismatch(
                "invariant map size",
                format!("{:?}", (width, height)),
                format!("{:?}", bad.dimensions()),
            ));
        }

        let channels = (0..num_corr)
            .map(|channel| {
                let samples: Vec<&[f64]> = invariants
                    .iter()
                    .skip(channel)
                    .step_by(num_corr)
                    .map(|s| s.pixels())
                    .collect();
                PcaChannel::train(channel, &samples, geometry.npca)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            channels = num_corr,
            samples = invariants.len() / num_corr,
            npca = geometry.npca,
            "Trained PCA model"
        );
        Ok(Self {
            width,
            height,
            channels,
        })
    }

    #[inline]
    pub fn channels(&self) -> &[PcaChannel] {
        &self.channels
    }

    /// Projects an invariant stack (one map per channel) to
    /// `num_correlation * npca` coefficients, channel-major.
    pub fn project(&self, invariant: &[Buffer2<f64>]) -> Vec<f64> {
        assert_eq!(
            invariant.len(),
            self.channels.len(),
            "invariant channel count does not match PCA model"
        );
        let npca = self.channels.first().map_or(0, |c| c.basis.len());
        let mut out = Vec::with_capacity(self.channels.len() * npca);
        for (channel, map) in self.channels.iter().zip(invariant) {
            channel.project_into(map.pixels(), &mut out);
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut slices = Vec::new();
        for channel in &self.channels {
            slices.push(Buffer2::new(self.width, self.height, channel.average.clone()));
            for b in &channel.basis {
                slices.push(Buffer2::new(self.width, self.height, b.clone()));
            }
        }
        stack::write(path, &slices)
    }

    /// Loads a model and checks it was trained for `geometry`.
    pub fn load(path: &Path, geometry: &Geometry) -> Result<Self> {
        let slices = stack::read(path)?;
        let per_channel = geometry.npca + 1;
        let expected = geometry.num_correlation * per_channel;
        if slices.len() != expected {
            return Err(Error::mismatch("PCA model slices", expected, slices.len()));
        }
        let (width, height) = (geometry.nr_steps, geometry.ang_steps);
        if let Some(bad) = slices.iter().find(|s| s.dimensions() != (width, height)) {
            return Err(Error::mismatch(
                "PCA model slice size",
                format!("{:?}", (width, height)),
                format!("{:?}", bad.dimensions()),
            ));
        }

        let mut slices = slices.into_iter().map(Buffer2::into_vec);
        let channels = (0..geometry.num_correlation)
            .map(|_| {
                let average = slices.next().unwrap_or_default();
                let basis = slices.by_ref().take(geometry.npca).collect();
                PcaChannel { average, basis }
            })
            .collect();

        debug!(path = %path.display(), "Loaded PCA model");
        Ok(Self {
            width,
            height,
            channels,
        })
    }
}
