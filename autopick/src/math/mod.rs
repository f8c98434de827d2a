//! Numeric building blocks: 2D FFT, band-pass masks, correlation and
//! descriptive statistics.

pub mod fft;
pub mod statistics;

pub use fft::{BandPass, Fft2, RAISED_COSINE_WIDTH, centered_correlation, correlate_spectra};
pub use statistics::{mean, min_max_normalize, normalize_zero_mean_unit_std, sample_std_dev};
