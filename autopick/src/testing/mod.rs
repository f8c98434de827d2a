//! Synthetic micrographs for tests.

#![allow(dead_code)]

use common::Buffer2;
use glam::IVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A field of identical blob-shaped particles on a noisy background.
#[derive(Debug, Clone)]
pub struct ParticleFieldConfig {
    pub width: usize,
    pub height: usize,
    pub positions: Vec<IVec2>,
    /// Particle radius in pixels.
    pub radius: f64,
    pub amplitude: f64,
    pub background: f64,
    /// Half-width of the uniform noise.
    pub noise: f64,
    pub seed: u64,
}

impl Default for ParticleFieldConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 160,
            positions: Vec::new(),
            radius: 12.0,
            amplitude: 1.0,
            background: 0.2,
            noise: 0.02,
            seed: 42,
        }
    }
}

/// Renders the particle field.
///
/// Each particle is a Gaussian core with a dimmer off-centre lobe, so it is
/// not rotationally symmetric.
pub fn particle_field(config: &ParticleFieldConfig) -> Buffer2<f64> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut image = Buffer2::from_fn(config.width, config.height, |_, _| {
        config.background + rng.random_range(-config.noise..=config.noise)
    });

    let sigma = config.radius * 0.4;
    let lobe_sigma = config.radius * 0.2;
    let lobe_offset = config.radius * 0.5;
    let reach = (config.radius * 1.5).ceil() as i32;

    for p in &config.positions {
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let (x, y) = (p.x + dx, p.y + dy);
                if x < 0 || y < 0 || x >= config.width as i32 || y >= config.height as i32 {
                    continue;
                }
                let (fx, fy) = (dx as f64, dy as f64);
                let core = (-(fx * fx + fy * fy) / (2.0 * sigma * sigma)).exp();
                let lx = fx - lobe_offset;
                let lobe = 0.5 * (-(lx * lx + fy * fy) / (2.0 * lobe_sigma * lobe_sigma)).exp();
                image[(x as usize, y as usize)] += config.amplitude * (core + lobe);
            }
        }
    }
    image
}

/// Well-separated positions on a regular grid, `spacing` apart, starting
/// `margin` pixels from the top-left corner.
pub fn grid_positions(cols: usize, rows: usize, margin: i32, spacing: i32) -> Vec<IVec2> {
    (0..rows as i32)
        .flat_map(|r| (0..cols as i32).map(move |c| IVec2::new(margin + c * spacing, margin + r * spacing)))
        .collect()
}

/// Uniform noise raster in `[-amplitude, amplitude]`.
pub fn noise(width: usize, height: usize, amplitude: f64, seed: u64) -> Buffer2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Buffer2::from_fn(width, height, |_, _| rng.random_range(-amplitude..=amplitude))
}

/// Square raster rotated by a quarter turn about pixel `(c, c)`, `c = (side - 1) / 2`.
pub fn rotate_quarter(image: &Buffer2<f64>) -> Buffer2<f64> {
    let side = image.width();
    assert_eq!(side, image.height(), "quarter turn needs a square raster");
    let c2 = side - 1;
    Buffer2::from_fn(side, side, |x, y| image[(c2 - y, x)])
}
