//! 2D FFT on arbitrary raster sizes, band-pass masks and correlation.
//!
//! Transforms are computed by row-column decomposition with cached rustfft
//! plans. The inverse is normalized by `1 / (width * height)`, so
//! `inverse(forward(x)) == x`.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use common::Buffer2;

/// Transition width of the raised-cosine band edges, in digital frequency.
pub const RAISED_COSINE_WIDTH: f64 = 0.02;

/// Cached forward/inverse plans for one raster size.
#[derive(Clone)]
pub struct Fft2 {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Fft2 {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "FFT size must be non-zero");
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Forward transform of a real raster.
    pub fn forward_real(&self, image: &Buffer2<f64>) -> Vec<Complex<f64>> {
        assert_eq!(
            image.dimensions(),
            (self.width, self.height),
            "raster size does not match FFT plan"
        );
        let mut data: Vec<Complex<f64>> = image.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.process(&mut data, &self.row_forward, &self.col_forward);
        data
    }

    /// Normalized inverse transform, keeping the real part.
    pub fn inverse_real(&self, mut spectrum: Vec<Complex<f64>>) -> Buffer2<f64> {
        assert_eq!(spectrum.len(), self.width * self.height);
        self.process(&mut spectrum, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / (self.width * self.height) as f64;
        Buffer2::new(
            self.width,
            self.height,
            spectrum.into_iter().map(|c| c.re * norm).collect(),
        )
    }

    fn process(&self, data: &mut [Complex<f64>], row_fft: &Arc<dyn Fft<f64>>, col_fft: &Arc<dyn Fft<f64>>) {
        let (w, h) = (self.width, self.height);

        for row in data.chunks_exact_mut(w) {
            row_fft.process(row);
        }

        let mut column = vec![Complex::new(0.0, 0.0); h];
        for x in 0..w {
            for (y, c) in column.iter_mut().enumerate() {
                *c = data[y * w + x];
            }
            col_fft.process(&mut column);
            for (y, c) in column.iter().enumerate() {
                data[y * w + x] = *c;
            }
        }
    }
}

/// Signed digital frequency of FFT bin `idx` in a transform of length `n`.
///
/// Bins up to `n / 2` are non-negative, the rest wrap to negative.
#[inline]
pub fn digital_frequency(idx: usize, n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    if idx <= n / 2 {
        idx as f64 / n as f64
    } else {
        (idx as f64 - n as f64) / n as f64
    }
}

// ============================================================================
// Band-pass mask
// ============================================================================

/// Raised-cosine band-pass over the radial digital frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPass {
    pub w1: f64,
    pub w2: f64,
    pub raised_w: f64,
}

impl BandPass {
    pub fn new(w1: f64, w2: f64) -> Self {
        Self {
            w1,
            w2,
            raised_w: RAISED_COSINE_WIDTH,
        }
    }

    /// Gain at radial frequency `w`.
    pub fn gain(&self, w: f64) -> f64 {
        if w < self.w1 - self.raised_w || w > self.w2 + self.raised_w {
            0.0
        } else if w < self.w1 {
            (1.0 + (PI / self.raised_w * (self.w1 - w)).cos()) * 0.5
        } else if w > self.w2 {
            (1.0 + (PI / self.raised_w * (w - self.w2)).cos()) * 0.5
        } else {
            1.0
        }
    }

    /// Multiplies `spectrum` (laid out as produced by `fft`) by the mask.
    pub fn apply(&self, fft: &Fft2, spectrum: &mut [Complex<f64>]) {
        let (w, h) = (fft.width(), fft.height());
        debug_assert_eq!(spectrum.len(), w * h);
        for y in 0..h {
            let fy = digital_frequency(y, h);
            for x in 0..w {
                let fx = digital_frequency(x, w);
                spectrum[y * w + x] *= self.gain((fx * fx + fy * fy).sqrt());
            }
        }
    }

    /// Filters a real raster in one go.
    pub fn filter(&self, image: &Buffer2<f64>) -> Buffer2<f64> {
        let fft = Fft2::new(image.width(), image.height());
        let mut spectrum = fft.forward_real(image);
        self.apply(&fft, &mut spectrum);
        fft.inverse_real(spectrum)
    }
}

// ============================================================================
// Correlation
// ============================================================================

/// Circular cross-correlation `c(s) = sum_p a(p) * b(p + s)` from spectra.
///
/// Shift `s` is stored at index `s mod size` (origin at `(0, 0)`).
pub fn correlate_spectra(
    fft: &Fft2,
    a: &[Complex<f64>],
    b: &[Complex<f64>],
) -> Buffer2<f64> {
    debug_assert_eq!(a.len(), b.len());
    let product: Vec<Complex<f64>> = a.iter().zip(b).map(|(a, b)| a.conj() * b).collect();
    fft.inverse_real(product)
}

/// Mean circular cross-correlation of two equally sized rasters,
/// re-centred so zero shift sits at `(width / 2, height / 2)`.
pub fn centered_correlation(fft: &Fft2, a: &Buffer2<f64>, b: &Buffer2<f64>) -> Buffer2<f64> {
    let spectrum_a = fft.forward_real(a);
    let spectrum_b = fft.forward_real(b);
    let raw = correlate_spectra(fft, &spectrum_a, &spectrum_b);

    let (w, h) = raw.dimensions();
    let norm = 1.0 / (w * h) as f64;
    Buffer2::from_fn(w, h, |x, y| {
        let sx = (x + w - w / 2) % w;
        let sy = (y + h - h / 2) % h;
        raw[(sx, sy)] * norm
    })
}
