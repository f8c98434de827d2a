//! Particle template: the average of aligned positive patches.
//!
//! Every new patch is aligned to the running sum before it is added:
//! first rotationally (exhaustive search over the angular steps of a polar
//! resampling), then translationally (peak of the FFT cross-correlation,
//! bounded to half a radius).

use std::f64::consts::TAU;

use common::Buffer2;
use glam::{DMat2, DVec2, IVec2};

use crate::config::{Geometry, POLAR_MIN_RADIUS};
use crate::error::{Error, Result};
use crate::features::PolarGrid;
use crate::math::{Fft2, correlate_spectra, mean};

/// Accumulates aligned positive patches into a template.
#[derive(Debug, Clone)]
pub struct TemplateAccumulator {
    sum: Buffer2<f64>,
    count: usize,
    aligner: Aligner,
}

impl TemplateAccumulator {
    pub fn new(geometry: &Geometry) -> Self {
        let side = geometry.patch_side();
        Self {
            sum: Buffer2::new_default(side, side),
            count: 0,
            aligner: Aligner::new(geometry),
        }
    }

    /// Starts from a previously saved template, counted as one sample.
    pub fn seeded(geometry: &Geometry, average: Buffer2<f64>) -> Result<Self> {
        let side = geometry.patch_side();
        if average.dimensions() != (side, side) {
            return Err(Error::mismatch(
                "particle template size",
                format!("{:?}", (side, side)),
                format!("{:?}", average.dimensions()),
            ));
        }
        Ok(Self {
            sum: average,
            count: 1,
            aligner: Aligner::new(geometry),
        })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Aligns `patch` to the running sum and adds it.
    pub fn add(&mut self, patch: &Buffer2<f64>) {
        assert_eq!(patch.dimensions(), self.sum.dimensions(), "patch size does not match template");
        let aligned = if self.count == 0 {
            patch.clone()
        } else {
            self.aligner.align(&self.sum, patch)
        };
        self.sum
            .iter_mut()
            .zip(aligned.iter())
            .for_each(|(s, v)| *s += v);
        self.count += 1;
    }

    pub fn average(&self) -> Result<Buffer2<f64>> {
        if self.count == 0 {
            return Err(Error::NoPositiveExamples);
        }
        let inv = 1.0 / self.count as f64;
        Ok(self.sum.map(|v| v * inv))
    }
}

// ============================================================================
// Alignment
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct Aligner {
    grid: PolarGrid,
    fft: Fft2,
    max_shift: i32,
}

impl Aligner {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        let side = geometry.patch_side();
        Self {
            grid: PolarGrid::new(
                POLAR_MIN_RADIUS as f64,
                geometry.particle_radius as f64,
                geometry.nr_steps,
                geometry.ang_steps,
            ),
            fft: Fft2::new(side, side),
            max_shift: (geometry.particle_radius / 2) as i32,
        }
    }

    /// Rotates then shifts `patch` onto `reference`.
    pub(crate) fn align(&self, reference: &Buffer2<f64>, patch: &Buffer2<f64>) -> Buffer2<f64> {
        let reference = centred(reference);
        let steps = self.best_rotation(&reference, &centred(patch));
        let angle = TAU * steps as f64 / self.grid.dimensions().1 as f64;
        let rotated = rotate(patch, angle);
        let shift = self.best_translation(&reference, &centred(&rotated));
        translate(&rotated, shift)
    }

    /// Angular steps `s` maximizing `sum ref(k) * patch(k + s)` over polar rows.
    fn best_rotation(&self, reference: &Buffer2<f64>, patch: &Buffer2<f64>) -> usize {
        let a = self.grid.to_polar(reference);
        let b = self.grid.to_polar(patch);
        let ang = a.height();

        (0..ang)
            .map(|s| {
                let score: f64 = (0..ang)
                    .map(|k| {
                        a.row(k)
                            .iter()
                            .zip(b.row((k + s) % ang))
                            .map(|(x, y)| x * y)
                            .sum::<f64>()
                    })
                    .sum();
                (s, score)
            })
            .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
            .0
    }

    /// Shift `s` (bounded by `max_shift`) maximizing `sum ref(p) * patch(p + s)`.
    fn best_translation(&self, reference: &Buffer2<f64>, patch: &Buffer2<f64>) -> IVec2 {
        let map = correlate_spectra(
            &self.fft,
            &self.fft.forward_real(reference),
            &self.fft.forward_real(patch),
        );
        let (w, h) = (map.width() as i32, map.height() as i32);

        let mut best = (IVec2::ZERO, f64::NEG_INFINITY);
        for sy in -self.max_shift..=self.max_shift {
            for sx in -self.max_shift..=self.max_shift {
                let v = map[(sx.rem_euclid(w) as usize, sy.rem_euclid(h) as usize)];
                if v > best.1 {
                    best = (IVec2::new(sx, sy), v);
                }
            }
        }
        best.0
    }
}

fn centred(image: &Buffer2<f64>) -> Buffer2<f64> {
    let m = mean(image.pixels());
    image.map(|v| v - m)
}

/// `out(p) = in(c + R(angle) (p - c))`, bilinear, edges clamped.
pub(crate) fn rotate(image: &Buffer2<f64>, angle: f64) -> Buffer2<f64> {
    let c = DVec2::new((image.width() / 2) as f64, (image.height() / 2) as f64);
    let rotation = DMat2::from_angle(angle);
    Buffer2::from_fn(image.width(), image.height(), |x, y| {
        let p = c + rotation * (DVec2::new(x as f64, y as f64) - c);
        image.sample_bilinear(p.x, p.y)
    })
}

/// `out(p) = in(p + shift)`, edges clamped.
pub(crate) fn translate(image: &Buffer2<f64>, shift: IVec2) -> Buffer2<f64> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    Buffer2::from_fn(image.width(), image.height(), |x, y| {
        let sx = (x as i32 + shift.x).clamp(0, w - 1) as usize;
        let sy = (y as i32 + shift.y).clamp(0, h - 1) as usize;
        image[(sx, sy)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PickerConfig;
    use crate::features::extract_patch;
    use crate::testing::{ParticleFieldConfig, particle_field, rotate_quarter};

    fn geometry() -> Geometry {
        PickerConfig::with_particle_size(24).geometry().unwrap()
    }

    fn reference_patch(geometry: &Geometry, noise: f64) -> Buffer2<f64> {
        let side = 4 * geometry.particle_radius;
        let center = IVec2::splat(side as i32 / 2);
        let field = particle_field(&ParticleFieldConfig {
            width: side,
            height: side,
            positions: vec![center],
            radius: geometry.particle_radius as f64 * 0.8,
            noise,
            ..Default::default()
        });
        extract_patch(&field, center, geometry.particle_radius, false)
    }

    fn max_abs_diff(a: &Buffer2<f64>, b: &Buffer2<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    #[test]
    fn test_rotate_quarter_turn_matches_pixel_permutation() {
        let image = Buffer2::from_fn(9, 9, |x, y| (x * 10 + y) as f64);
        let rotated = rotate(&image, std::f64::consts::FRAC_PI_2);
        // R(90) maps offset (dx, dy) to (-dy, dx)
        let expected = Buffer2::from_fn(9, 9, |x, y| image[(8 - y, x)]);
        assert!(max_abs_diff(&rotated, &expected) < 1e-9);
        assert!(max_abs_diff(&rotated, &rotate_quarter(&image)) < 1e-9);
    }

    #[test]
    fn test_translate_shifts_content() {
        let image = Buffer2::from_fn(6, 6, |x, y| (x + 10 * y) as f64);
        let moved = translate(&image, IVec2::new(1, -2));
        assert_eq!(moved[(2, 3)], image[(3, 1)]);
        assert_eq!(moved[(5, 0)], image[(5, 0)]);
    }

    #[test]
    fn test_best_translation_recovers_shift() {
        let geometry = geometry();
        let reference = reference_patch(&geometry, 0.0);
        let aligner = Aligner::new(&geometry);

        let shifted = translate(&reference, IVec2::new(-3, 2));
        let found = aligner.best_translation(&centred(&reference), &centred(&shifted));
        assert_eq!(found, IVec2::new(3, -2));
    }

    #[test]
    fn test_align_undoes_quarter_turn() {
        let geometry = geometry();
        let reference = reference_patch(&geometry, 0.0);
        let turned = rotate_quarter(&reference);
        assert!(max_abs_diff(&turned, &reference) > 0.1);

        let aligned = Aligner::new(&geometry).align(&reference, &turned);
        assert!(max_abs_diff(&aligned, &reference) < 1e-6);
    }

    #[test]
    fn test_average_of_rotated_copies_matches_reference() {
        let geometry = geometry();
        let reference = reference_patch(&geometry, 0.0);
        let mut accumulator = TemplateAccumulator::new(&geometry);
        accumulator.add(&reference);
        accumulator.add(&rotate_quarter(&reference));
        accumulator.add(&rotate_quarter(&rotate_quarter(&reference)));
        assert_eq!(accumulator.count(), 3);

        let average = accumulator.average().unwrap();
        assert!(max_abs_diff(&average, &reference) < 1e-6);
    }

    #[test]
    fn test_empty_accumulator_is_an_error() {
        let accumulator = TemplateAccumulator::new(&geometry());
        assert!(matches!(accumulator.average(), Err(Error::NoPositiveExamples)));
    }

    #[test]
    fn test_seed_counts_as_one_sample() {
        let geometry = geometry();
        let seed = Buffer2::new_filled(geometry.patch_side(), geometry.patch_side(), 2.0);
        let mut accumulator = TemplateAccumulator::seeded(&geometry, seed).unwrap();
        accumulator.add(&Buffer2::new_filled(geometry.patch_side(), geometry.patch_side(), 4.0));
        let average = accumulator.average().unwrap();
        assert!(average.iter().all(|&v| (v - 3.0).abs() < 1e-12));

        let wrong = Buffer2::new_filled(5, 5, 0.0);
        assert!(TemplateAccumulator::seeded(&geometry, wrong).is_err());
    }
}
