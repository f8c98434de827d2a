//! Template correlation and local-maximum candidate detection.

use common::Buffer2;
use glam::IVec2;
use tracing::debug;

use crate::candidate::{Candidate, rank_by_cost};
use crate::config::Geometry;
use crate::math::{BandPass, Fft2, correlate_spectra, mean, normalize_zero_mean_unit_std, sample_std_dev};

/// Template masked to a disc of radius `side / 2` and normalized inside it.
#[derive(Debug, Clone)]
pub struct MaskedTemplate {
    pub image: Buffer2<f64>,
    /// Pixels inside the disc.
    pub support: usize,
}

impl MaskedTemplate {
    pub fn new(average: &Buffer2<f64>) -> Self {
        let (w, h) = average.dimensions();
        let (cx, cy) = ((w / 2) as i64, (h / 2) as i64);
        let radius = (w.min(h) / 2) as i64;
        let inside = |x: usize, y: usize| {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            dx * dx + dy * dy <= radius * radius
        };

        let values: Vec<f64> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| inside(x, y))
            .map(|(x, y)| average[(x, y)])
            .collect();
        let m = mean(&values);
        let sd = sample_std_dev(&values);
        let scale = if sd > 0.0 { 1.0 / sd } else { 1.0 };

        let image = Buffer2::from_fn(w, h, |x, y| {
            if inside(x, y) {
                (average[(x, y)] - m) * scale
            } else {
                0.0
            }
        });
        Self {
            image,
            support: values.len(),
        }
    }
}

/// Band-passed correlation of the normalized micrograph with `template`.
///
/// The response at `(x, y)` is the mean product with the template centred
/// on `(x, y)`.
pub fn correlation_map(
    micrograph: &Buffer2<f64>,
    template: &MaskedTemplate,
    geometry: &Geometry,
) -> Buffer2<f64> {
    let (w, h) = micrograph.dimensions();
    let (tw, th) = template.image.dimensions();
    assert!(tw <= w && th <= h, "template exceeds micrograph");

    // template centre at the origin, negative offsets wrapped
    let (cx, cy) = (tw / 2, th / 2);
    let mut padded = Buffer2::<f64>::new_default(w, h);
    for ty in 0..th {
        for tx in 0..tw {
            let x = (tx + w - cx) % w;
            let y = (ty + h - cy) % h;
            padded[(x, y)] = template.image[(tx, ty)];
        }
    }

    let mut normalized = micrograph.clone();
    normalize_zero_mean_unit_std(normalized.pixels_mut());

    let fft = Fft2::new(w, h);
    let mut map = correlate_spectra(&fft, &fft.forward_real(&padded), &fft.forward_real(&normalized));
    let inv = 1.0 / template.support.max(1) as f64;
    map.iter_mut().for_each(|v| *v *= inv);

    let size = geometry.particle_size as f64;
    let band = BandPass::new(1.0 / size, 3.0 / size);
    let mut spectrum = fft.forward_real(&map);
    band.apply(&fft, &mut spectrum);
    fft.inverse_real(spectrum)
}

/// Strict 8-neighbour maximum test.
#[inline]
fn is_local_maximum(map: &Buffer2<f64>, x: usize, y: usize) -> bool {
    let v = map[(x, y)];
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = (x as i64 + dx) as usize;
            let ny = (y as i64 + dy) as usize;
            if map[(nx, ny)] >= v {
                return false;
            }
        }
    }
    true
}

/// Local maxima of `map` at least `margin` pixels from every border,
/// in row-major order.
pub fn local_maxima(map: &Buffer2<f64>, margin: usize) -> Vec<Candidate> {
    let (w, h) = map.dimensions();
    let margin = margin.max(1);
    if w <= 2 * margin || h <= 2 * margin {
        return Vec::new();
    }

    let mut found = Vec::new();
    for y in margin..h - margin {
        for x in margin..w - margin {
            if is_local_maximum(map, x, y) {
                found.push(Candidate::new(IVec2::new(x as i32, y as i32), map[(x, y)]));
            }
        }
    }
    found
}

/// Ranked local maxima of the template correlation, truncated to the
/// leading `fraction`.
pub fn search(
    micrograph: &Buffer2<f64>,
    average: &Buffer2<f64>,
    geometry: &Geometry,
    fraction: f64,
) -> Vec<Candidate> {
    let template = MaskedTemplate::new(average);
    let map = correlation_map(micrograph, &template, geometry);

    let mut candidates = local_maxima(&map, geometry.particle_radius);
    let total = candidates.len();
    rank_by_cost(&mut candidates);
    candidates.truncate((total as f64 * fraction) as usize);

    debug!(
        local_maxima = total,
        kept = candidates.len(),
        "Candidate search finished"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PickerConfig;
    use crate::features::extract_patch;
    use crate::testing::{ParticleFieldConfig, grid_positions, particle_field};

    fn geometry() -> Geometry {
        PickerConfig::with_particle_size(24).geometry().unwrap()
    }

    #[test]
    fn test_masked_template_is_normalized_inside_disc() {
        let average = Buffer2::from_fn(9, 9, |x, y| (x * 3 + y) as f64);
        let template = MaskedTemplate::new(&average);
        assert_eq!(template.image[(0, 0)], 0.0);
        assert_eq!(template.image[(8, 8)], 0.0);

        let inside: Vec<f64> = template
            .image
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| {
                let (dx, dy) = ((i % 9) as i64 - 4, (i / 9) as i64 - 4);
                dx * dx + dy * dy <= 16
            })
            .map(|(_, v)| v)
            .collect();
        assert_eq!(inside.len(), template.support);
        assert!(mean(&inside).abs() < 1e-12);
        assert!((sample_std_dev(&inside) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_template_does_not_divide_by_zero() {
        let template = MaskedTemplate::new(&Buffer2::new_filled(7, 7, 3.0));
        assert!(template.image.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_local_maxima_is_strict() {
        let mut map = Buffer2::new_filled(7, 7, 0.0);
        map[(3, 3)] = 2.0;
        map[(5, 1)] = 1.0;
        // plateau: neither pixel is strictly greater
        map[(1, 5)] = 1.0;
        map[(2, 5)] = 1.0;

        let found = local_maxima(&map, 1);
        let positions: Vec<IVec2> = found.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![IVec2::new(5, 1), IVec2::new(3, 3)]);
        assert_eq!(found[1].cost, 2.0);
    }

    #[test]
    fn test_local_maxima_respects_margin() {
        let mut map = Buffer2::new_filled(10, 10, 0.0);
        map[(2, 5)] = 1.0;
        map[(5, 5)] = 1.0;
        let found = local_maxima(&map, 3);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position, IVec2::new(5, 5));
    }

    #[test]
    fn test_correlation_peaks_at_particle_centres() {
        let geometry = geometry();
        let positions = grid_positions(3, 3, 30, 50);
        let micrograph = particle_field(&ParticleFieldConfig {
            positions: positions.clone(),
            radius: 10.0,
            ..Default::default()
        });
        let average = extract_patch(&micrograph, positions[4], geometry.particle_radius, false);

        let candidates = search(&micrograph, &average, &geometry, 1.0);
        let best: Vec<IVec2> = candidates.iter().take(positions.len()).map(|c| c.position).collect();
        for p in &positions {
            assert!(
                best.iter().any(|b| (*b - *p).abs().max_element() <= 1),
                "no candidate near {p}: {best:?}"
            );
        }
        for pair in candidates.windows(2) {
            assert!(pair[0].cost >= pair[1].cost);
        }
    }

    #[test]
    fn test_search_keeps_leading_fraction() {
        let geometry = geometry();
        let micrograph = particle_field(&ParticleFieldConfig {
            positions: grid_positions(2, 2, 40, 60),
            noise: 0.1,
            ..Default::default()
        });
        let average = extract_patch(&micrograph, IVec2::new(40, 40), geometry.particle_radius, false);

        let all = search(&micrograph, &average, &geometry, 1.0);
        let tenth = search(&micrograph, &average, &geometry, 0.1);
        assert_eq!(tenth.len(), all.len() / 10);
        assert_eq!(tenth[..], all[..tenth.len()]);
    }
}
