use common::Buffer2;
use glam::IVec2;

use crate::config::STATISTIC_COUNT;
use crate::math::{mean, normalize_zero_mean_unit_std, sample_std_dev};

/// Whether a `(2 * radius + 1)`-sided window centred at `center` lies inside
/// a raster of `dimensions`.
pub fn patch_fits(dimensions: (usize, usize), center: IVec2, radius: usize) -> bool {
    let r = radius as i32;
    center.x >= r
        && center.y >= r
        && center.x + r < dimensions.0 as i32
        && center.y + r < dimensions.1 as i32
}

/// Crops the square window `[center - radius, center + radius]` (inclusive).
///
/// With `normalize`, the crop is rescaled to zero mean and unit standard
/// deviation.
///
/// # Panics
///
/// Panics if the window leaves the raster.
pub fn extract_patch(
    image: &Buffer2<f64>,
    center: IVec2,
    radius: usize,
    normalize: bool,
) -> Buffer2<f64> {
    assert!(
        patch_fits(image.dimensions(), center, radius),
        "patch at {center} with radius {radius} exceeds {:?} raster",
        image.dimensions()
    );
    let side = 2 * radius + 1;
    let mut patch = image.window(
        (center.x - radius as i32) as usize,
        (center.y - radius as i32) as usize,
        side,
        side,
    );
    if normalize {
        normalize_zero_mean_unit_std(patch.pixels_mut());
    }
    patch
}

/// Mean, standard deviation and ten evenly spaced order statistics of the
/// standardized values.
pub fn statistical_descriptors(values: &[f64]) -> [f64; STATISTIC_COUNT] {
    let mut descriptors = [0.0; STATISTIC_COUNT];
    descriptors[0] = mean(values);
    descriptors[1] = sample_std_dev(values);

    let mut sorted = values.to_vec();
    normalize_zero_mean_unit_std(&mut sorted);
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    if n == 0 {
        return descriptors;
    }
    let step = n / 10;
    for (k, slot) in descriptors[2..].iter_mut().enumerate() {
        *slot = sorted[((k + 1) * step).min(n - 1)];
    }
    descriptors
}
