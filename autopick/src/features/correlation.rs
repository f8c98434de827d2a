use common::Buffer2;
use rustfft::num_complex::Complex;

use crate::math::{Fft2, correlate_spectra};

/// Correlates polar images band against band.
///
/// Output channel `n` is the mean circular correlation of bands
/// `pairs[n].0` and `pairs[n].1`, zero shift at the map centre.
pub fn cross_channel_correlation(
    fft: &Fft2,
    polar: &[Buffer2<f64>],
    pairs: &[(usize, usize)],
) -> Vec<Buffer2<f64>> {
    let spectra: Vec<Vec<Complex<f64>>> = polar.iter().map(|p| fft.forward_real(p)).collect();
    let (w, h) = (fft.width(), fft.height());
    let norm = 1.0 / (w * h) as f64;

    pairs
        .iter()
        .map(|&(a, b)| {
            let raw = correlate_spectra(fft, &spectra[a], &spectra[b]);
            Buffer2::from_fn(w, h, |x, y| {
                raw[((x + w - w / 2) % w, (y + h - h / 2) % h)] * norm
            })
        })
        .collect()
}
