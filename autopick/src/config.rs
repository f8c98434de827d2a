//! Picker configuration and the geometry derived from it.
//!
//! [`PickerConfig`] holds user-facing parameters (all in original micrograph
//! pixels). [`Geometry`] is computed once per session and carries every
//! size the pipeline actually works with, in downscaled pixels.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of statistical descriptors appended to every feature vector.
pub const STATISTIC_COUNT: usize = 12;

/// Innermost radius of the polar resampling, in pixels.
pub const POLAR_MIN_RADIUS: usize = 3;

/// Particle radius (downscaled pixels) the micrograph is scaled towards.
const CANONICAL_PARTICLE_SIZE: f64 = 50.0;

/// Lower bound for the downscale rate.
const MIN_SCALE_RATE: f64 = 0.25;

/// Smallest scaled radius that still leaves two polar radial steps.
const MIN_PARTICLE_RADIUS: usize = POLAR_MIN_RADIUS + 2;

// ============================================================================
// Classifier parameters
// ============================================================================

/// RBF-kernel SVM hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Box constraint.
    pub c: f64,
    /// RBF width, `exp(-gamma * |a - b|^2)`.
    pub gamma: f64,
}

impl SvmParams {
    pub const fn new(c: f64, gamma: f64) -> Self {
        Self { c, gamma }
    }

    /// Coarse first stage.
    pub const fn stage1() -> Self {
        Self::new(8.0, 0.125)
    }

    /// Refinement stage trained against past false positives.
    pub const fn stage2() -> Self {
        Self::new(1.0, 0.25)
    }

    fn validate(&self, stage: &str) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "{stage} C must be positive, got {}",
                self.c
            )));
        }
        if !(self.gamma > 0.0 && self.gamma.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "{stage} gamma must be positive, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

// ============================================================================
// PickerConfig
// ============================================================================

/// Parameters of a picking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    /// Particle diameter in original micrograph pixels.
    pub particle_size: usize,
    /// Number of band-pass filters in the filter bank.
    pub filter_num: usize,
    /// PCA components kept per correlation channel.
    pub npca: usize,
    /// Window of neighbouring bands each band is cross-correlated with.
    pub corr_num: usize,
    /// Angular steps of the polar resampling over the full circle.
    pub ang_steps: usize,
    /// Worker threads for candidate evaluation.
    pub threads: usize,
    /// Fraction of the ranked candidates forwarded to classification.
    pub candidate_fraction: f64,
    /// Seed for the random subset of negative examples.
    pub negative_seed: u64,
    pub stage1: SvmParams,
    pub stage2: SvmParams,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            particle_size: 100,
            filter_num: 6,
            npca: 4,
            corr_num: 2,
            ang_steps: 120,
            threads: 1,
            candidate_fraction: 0.1,
            negative_seed: 0x5eed,
            stage1: SvmParams::stage1(),
            stage2: SvmParams::stage2(),
        }
    }
}

impl PickerConfig {
    pub fn with_particle_size(particle_size: usize) -> Self {
        Self {
            particle_size,
            ..Default::default()
        }
    }

    /// Loads a YAML or JSON configuration file (format from the extension).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
            });
        }
        common::serde::load_file(path).map_err(|source| Error::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.filter_num == 0 {
            return Err(Error::InvalidConfig("filter_num must be > 0".into()));
        }
        if self.corr_num >= self.filter_num {
            return Err(Error::InvalidConfig(format!(
                "corr_num ({}) must be smaller than filter_num ({})",
                self.corr_num, self.filter_num
            )));
        }
        if self.npca == 0 {
            return Err(Error::InvalidConfig("npca must be > 0".into()));
        }
        if self.ang_steps < 4 {
            return Err(Error::InvalidConfig(format!(
                "ang_steps must be >= 4, got {}",
                self.ang_steps
            )));
        }
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be > 0".into()));
        }
        if !(self.candidate_fraction > 0.0 && self.candidate_fraction <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "candidate_fraction must be in (0, 1], got {}",
                self.candidate_fraction
            )));
        }
        self.stage1.validate("stage1")?;
        self.stage2.validate("stage2")?;

        let radius = scaled_radius(self.particle_size);
        if radius < MIN_PARTICLE_RADIUS {
            return Err(Error::InvalidConfig(format!(
                "particle_size {} gives a scaled radius of {} px, at least {} px required",
                self.particle_size, radius, MIN_PARTICLE_RADIUS
            )));
        }
        Ok(())
    }

    /// Validates and derives the working geometry.
    pub fn geometry(&self) -> Result<Geometry> {
        self.validate()?;

        let scale_rate = scale_rate(self.particle_size);
        let particle_radius = scaled_radius(self.particle_size);
        let num_correlation =
            self.filter_num + (self.filter_num - self.corr_num) * self.corr_num;

        Ok(Geometry {
            scale_rate,
            particle_radius,
            particle_size: particle_radius * 2,
            nr_steps: particle_radius - POLAR_MIN_RADIUS,
            ang_steps: self.ang_steps,
            filter_num: self.filter_num,
            corr_num: self.corr_num,
            npca: self.npca,
            num_correlation,
        })
    }
}

fn scale_rate(particle_size: usize) -> f64 {
    let t = (CANONICAL_PARTICLE_SIZE / particle_size.max(1) as f64).max(MIN_SCALE_RATE);
    t.min(1.0)
}

fn scaled_radius(particle_size: usize) -> usize {
    (particle_size as f64 * scale_rate(particle_size) * 0.5) as usize
}

// ============================================================================
// Geometry
// ============================================================================

/// Sizes derived from a validated [`PickerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Factor from original to working micrograph pixels.
    pub scale_rate: f64,
    /// Particle radius in working pixels.
    pub particle_radius: usize,
    /// Particle diameter in working pixels (`2 * particle_radius`).
    pub particle_size: usize,
    /// Radial steps of the polar grid.
    pub nr_steps: usize,
    /// Angular steps of the polar grid.
    pub ang_steps: usize,
    pub filter_num: usize,
    pub corr_num: usize,
    pub npca: usize,
    /// Self-correlations plus windowed cross-band correlations.
    pub num_correlation: usize,
}

impl Geometry {
    /// Side of a square particle patch (odd, centered on the pick).
    #[inline]
    pub fn patch_side(&self) -> usize {
        2 * self.particle_radius + 1
    }

    /// Number of samples in one polar image.
    #[inline]
    pub fn polar_len(&self) -> usize {
        self.ang_steps * self.nr_steps
    }

    /// Length of every feature vector for this configuration.
    #[inline]
    pub fn feature_len(&self) -> usize {
        self.num_correlation * self.npca + STATISTIC_COUNT
    }

    /// Pairs of filter bands correlated into each invariant channel.
    ///
    /// The first `filter_num` channels are self-correlations; then, for each
    /// band `i < filter_num - corr_num`, bands `i+1 ..= i+corr_num`.
    pub fn channel_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = (0..self.filter_num).map(|n| (n, n)).collect();
        for i in 0..self.filter_num - self.corr_num {
            for j in 1..=self.corr_num {
                pairs.push((i, i + j));
            }
        }
        debug_assert_eq!(pairs.len(), self.num_correlation);
        pairs
    }

    /// Maps an original-scale coordinate to working pixels (truncating).
    #[inline]
    pub fn to_working(&self, value: f64) -> i32 {
        (value * self.scale_rate) as i32
    }

    /// Maps a working-scale coordinate back to original pixels (truncating).
    #[inline]
    pub fn to_original(&self, value: i32) -> i32 {
        (value as f64 / self.scale_rate) as i32
    }
}
