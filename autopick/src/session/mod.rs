//! Run modes of a picking session.
//!
//! A session binds one micrograph to an output root (per-micrograph files)
//! and a model root (everything learned). The modes form a loop:
//!
//! ```text
//! buildinv -> train -> try -> (review) -> buildinv -> train -> ... -> autoselect
//! ```

mod autoselect;
mod build_invariants;
mod train;


use std::path::{Path, PathBuf};
use std::time::Instant;

use common::Buffer2;
use tracing::info;

use crate::config::{Geometry, PickerConfig};
use crate::error::Result;
use crate::features::FilterBank;
use crate::io::SessionPaths;
use crate::micrograph;

pub use autoselect::PickSummary;
pub use build_invariants::InvariantSummary;
pub use train::TrainSummary;

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Extract invariants of manual picks and background samples.
    #[value(name = "buildinv")]
    BuildInvariants,
    /// Fold extracted invariants into the dataset and retrain.
    Train,
    /// Pick and keep feature vectors for review.
    Try,
    /// Pick.
    #[value(name = "autoselect")]
    AutoSelect,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunSummary {
    Invariants(InvariantSummary),
    Trained(TrainSummary),
    Picked(PickSummary),
}

/// One micrograph, one model.
#[derive(Debug, Clone)]
pub struct Session {
    config: PickerConfig,
    geometry: Geometry,
    paths: SessionPaths,
    micrograph: PathBuf,
    positions: Option<PathBuf>,
}

impl Session {
    pub fn new(
        config: PickerConfig,
        micrograph: impl Into<PathBuf>,
        output_root: &Path,
        model_root: &Path,
    ) -> Result<Self> {
        let geometry = config.geometry()?;
        Ok(Self {
            config,
            geometry,
            paths: SessionPaths::new(output_root, model_root),
            micrograph: micrograph.into(),
            positions: None,
        })
    }

    /// Manual picks (original-scale coordinate file) used by `buildinv`.
    pub fn with_positions(mut self, positions: impl Into<PathBuf>) -> Self {
        self.positions = Some(positions.into());
        self
    }

    #[inline]
    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn run(&self, mode: Mode) -> Result<RunSummary> {
        let start = Instant::now();
        info!(
            mode = ?mode,
            micrograph = %self.micrograph.display(),
            particle_radius = self.geometry.particle_radius,
            scale_rate = self.geometry.scale_rate,
            "Starting run"
        );

        let summary = match mode {
            Mode::BuildInvariants => RunSummary::Invariants(self.build_invariants()?),
            Mode::Train => RunSummary::Trained(self.train()?),
            Mode::Try => RunSummary::Picked(self.pick(true)?),
            Mode::AutoSelect => RunSummary::Picked(self.pick(false)?),
        };

        info!(
            mode = ?mode,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    /// Micrograph at working scale, with its regenerated filter bank.
    fn prepare_micrograph(&self) -> Result<(Buffer2<f64>, FilterBank)> {
        let original = micrograph::load(&self.micrograph)?;
        let image = micrograph::downscale(&original, self.geometry.scale_rate);
        let bank = FilterBank::build(&image, self.geometry.filter_num);
        bank.save(&self.paths.filter_bank)?;
        info!(
            width = image.width(),
            height = image.height(),
            bands = bank.len(),
            "Prepared micrograph"
        );
        Ok((image, bank))
    }
}

/// Removes `path`, ignoring a file that is already gone.
fn remove_consumed(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(crate::error::Error::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}
