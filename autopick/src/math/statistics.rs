//! Descriptive statistics over flat `f64` slices.

/// Variance below which a vector is treated as constant.
const FLAT_EPSILON: f64 = 1e-12;

/// Arithmetic mean. Returns 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`n - 1` denominator). Returns 0 below two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Subtracts the mean and divides by the sample standard deviation in place.
///
/// A constant input is only centred.
pub fn normalize_zero_mean_unit_std(values: &mut [f64]) {
    let m = mean(values);
    let sd = sample_std_dev(values);
    if sd > FLAT_EPSILON {
        let inv = 1.0 / sd;
        values.iter_mut().for_each(|v| *v = (*v - m) * inv);
    } else {
        values.iter_mut().for_each(|v| *v -= m);
    }
}

/// Maps `values` linearly onto `[0, 1]` using its own min and max.
///
/// A constant vector maps to all zeros.
pub fn min_max_normalize(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !(range > FLAT_EPSILON) {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    values.iter_mut().for_each(|v| *v = (*v - min) / range);
}
