//! Micrograph loading and Fourier-domain downscaling.

use std::path::Path;

use common::Buffer2;
use common::file_format::get_file_extension;
use rustfft::num_complex::Complex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::stack;
use crate::math::Fft2;

/// Extensions read through the stack format instead of the image decoder.
const STACK_EXTENSIONS: [&str; 2] = ["stk", "xmp"];

/// Loads a micrograph as a single-channel `f64` raster.
///
/// Stack files yield their first slice; anything else goes through the
/// `image` decoder and is converted to luma.
pub fn load(path: &Path) -> Result<Buffer2<f64>> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let is_stack = get_file_extension(path)
        .is_some_and(|ext| STACK_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)));
    if is_stack {
        return stack::read_image(path);
    }

    let decoded = image::open(path).map_err(|source| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = decoded.to_luma32f();
    let (width, height) = (luma.width() as usize, luma.height() as usize);
    let pixels: Vec<f64> = luma.into_raw().into_iter().map(f64::from).collect();

    debug!(path = %path.display(), width, height, "Loaded micrograph");
    Ok(Buffer2::new(width, height, pixels))
}

/// Resamples `image` by `scale` (in `(0, 1]`) by cropping its spectrum.
///
/// The output is `floor(width * scale) x floor(height * scale)` and keeps the
/// mean intensity.
pub fn downscale(image: &Buffer2<f64>, scale: f64) -> Buffer2<f64> {
    assert!(scale > 0.0 && scale <= 1.0, "scale must be in (0, 1], got {scale}");
    let (w, h) = image.dimensions();
    let out_w = ((w as f64 * scale) as usize).max(1);
    let out_h = ((h as f64 * scale) as usize).max(1);
    if (out_w, out_h) == (w, h) {
        return image.clone();
    }

    let spectrum = Fft2::new(w, h).forward_real(image);
    let gain = (out_w * out_h) as f64 / (w * h) as f64;

    let mut cropped = vec![Complex::new(0.0, 0.0); out_w * out_h];
    for oy in 0..out_h {
        let sy = source_bin(oy, out_h, h);
        for ox in 0..out_w {
            let sx = source_bin(ox, out_w, w);
            cropped[oy * out_w + ox] = spectrum[sy * w + sx] * gain;
        }
    }

    debug!(from = ?(w, h), to = ?(out_w, out_h), "Downscaled micrograph");
    Fft2::new(out_w, out_h).inverse_real(cropped)
}

/// Input bin carrying the same signed frequency as output bin `k`.
fn source_bin(k: usize, out_len: usize, in_len: usize) -> usize {
    if k < out_len.div_ceil(2) {
        k
    } else {
        in_len - (out_len - k)
    }
}
