use std::path::Path;

use common::Buffer2;
use tracing::info;

use crate::error::Result;
use crate::io::stack;
use crate::math::{BandPass, Fft2};

/// Width of every band in digital frequency; band `i` starts at `i * BAND_WIDTH`.
pub const BAND_WIDTH: f64 = 0.025;

/// Band-pass filtered copies of one micrograph, lowest band first.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    bands: Vec<Buffer2<f64>>,
}

impl FilterBank {
    /// Raised-cosine band `index` of the bank.
    pub fn band_pass(index: usize) -> BandPass {
        let w1 = BAND_WIDTH * index as f64;
        BandPass::new(w1, w1 + BAND_WIDTH)
    }

    /// Filters `micrograph` into `filter_num` bands with a single forward FFT.
    pub fn build(micrograph: &Buffer2<f64>, filter_num: usize) -> Self {
        let fft = Fft2::new(micrograph.width(), micrograph.height());
        let spectrum = fft.forward_real(micrograph);

        let bands = (0..filter_num)
            .map(|i| {
                let mut filtered = spectrum.clone();
                Self::band_pass(i).apply(&fft, &mut filtered);
                fft.inverse_real(filtered)
            })
            .collect();

        info!(
            filter_num,
            width = micrograph.width(),
            height = micrograph.height(),
            "Built filter bank"
        );
        Self { bands }
    }

    /// Writes the bands as one stack, lowest band first.
    pub fn save(&self, path: &Path) -> Result<()> {
        stack::write(path, &self.bands)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[Buffer2<f64>] {
        &self.bands
    }
}
