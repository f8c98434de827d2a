use std::f64::consts::TAU;

use common::Buffer2;
use glam::DVec2;

use crate::config::{Geometry, POLAR_MIN_RADIUS};

/// Precomputed sampling offsets of an (angle, radius) grid.
///
/// Polar images are `nr_steps` wide (radius) and `ang_steps` high (angle),
/// so a rotation of the source patch is a cyclic shift of rows.
#[derive(Debug, Clone)]
pub struct PolarGrid {
    nr_steps: usize,
    ang_steps: usize,
    offsets: Vec<DVec2>,
}

impl PolarGrid {
    /// Grid from `min_radius` towards `max_radius` with a full-circle angle
    /// step of `TAU / ang_steps`.
    pub fn new(min_radius: f64, max_radius: f64, nr_steps: usize, ang_steps: usize) -> Self {
        assert!(nr_steps > 0 && ang_steps > 0, "polar grid must be non-empty");
        let radial_step = (max_radius - min_radius + 1.0) / nr_steps as f64;

        let mut offsets = Vec::with_capacity(nr_steps * ang_steps);
        for k in 0..ang_steps {
            let (sin, cos) = (TAU * k as f64 / ang_steps as f64).sin_cos();
            for j in 0..nr_steps {
                let rho = min_radius + j as f64 * radial_step;
                offsets.push(DVec2::new(rho * cos, rho * sin));
            }
        }

        Self {
            nr_steps,
            ang_steps,
            offsets,
        }
    }

    pub fn for_geometry(geometry: &Geometry) -> Self {
        Self::new(
            POLAR_MIN_RADIUS as f64,
            geometry.particle_radius as f64,
            geometry.nr_steps,
            geometry.ang_steps,
        )
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.nr_steps, self.ang_steps)
    }

    /// Bilinear resampling of `patch` around its centre pixel.
    pub fn to_polar(&self, patch: &Buffer2<f64>) -> Buffer2<f64> {
        let center = DVec2::new((patch.width() / 2) as f64, (patch.height() / 2) as f64);
        let pixels = self
            .offsets
            .iter()
            .map(|offset| {
                let p = center + *offset;
                patch.sample_bilinear(p.x, p.y)
            })
            .collect();
        Buffer2::new(self.nr_steps, self.ang_steps, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polar_of_radial_profile_is_row_constant() {
        let patch = Buffer2::from_fn(25, 25, |x, y| {
            let dx = x as f64 - 12.0;
            let dy = y as f64 - 12.0;
            (dx * dx + dy * dy).sqrt()
        });
        let grid = PolarGrid::new(3.0, 12.0, 9, 8);
        let polar = grid.to_polar(&patch);
        assert_eq!(polar.dimensions(), (9, 8));

        // on the axes the profile is linear between pixels, so bilinear is exact
        for k in [0, 2, 4, 6] {
            for j in 0..9 {
                let rho = 3.0 + j as f64 * 10.0 / 9.0;
                assert!((polar[(j, k)] - rho).abs() < 1e-9, "k={k} j={j}");
            }
        }
    }

    #[test]
    fn test_quarter_turn_is_cyclic_row_shift() {
        let side = 21;
        let c = 10;
        let patch = Buffer2::from_fn(side, side, |x, y| ((x * 7 + y * y * 3) % 13) as f64);
        let rotated = Buffer2::from_fn(side, side, |x, y| patch[(2 * c - y, x)]);

        let grid = PolarGrid::new(3.0, 10.0, 7, 120);
        let a = grid.to_polar(&patch);
        let b = grid.to_polar(&rotated);
        for k in 0..120 {
            for j in 0..7 {
                assert!((b[(j, k)] - a[(j, (k + 30) % 120)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_samples_stay_inside_patch() {
        let grid = PolarGrid::new(3.0, 25.0, 22, 120);
        let max = grid.offsets.iter().map(|o| o.length()).fold(0.0, f64::max);
        assert!(max < 25.0);
    }
}
