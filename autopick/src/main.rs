//! autopick CLI: one picking run over one micrograph.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use autopick::{Mode, PickerConfig, RunSummary, Session};
use common::log_setup::setup_logging;

#[derive(Debug, Parser)]
#[command(name = "autopick")]
#[command(about = "Learning-based automatic particle picking for electron micrographs")]
#[command(version)]
struct Cli {
    /// Micrograph to pick from.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Root name of the per-micrograph output files.
    #[arg(long)]
    output_root: PathBuf,

    /// Root name of the model files.
    #[arg(long)]
    model: PathBuf,

    /// Particle diameter in micrograph pixels.
    #[arg(long)]
    particle_size: Option<usize>,

    #[arg(long, value_enum)]
    mode: Mode,

    /// Manual picks (coordinate file), used by `buildinv`.
    #[arg(long)]
    positions: Option<PathBuf>,

    /// Worker threads for candidate evaluation.
    #[arg(long)]
    thr: Option<usize>,

    /// Number of band-pass filters.
    #[arg(long)]
    filter_num: Option<usize>,

    /// PCA components per correlation channel.
    #[arg(long)]
    npca: Option<usize>,

    /// Neighbouring bands each band is correlated with.
    #[arg(long)]
    ncorr: Option<usize>,

    /// YAML or JSON picker configuration; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rotated logs to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn picker_config(&self) -> Result<PickerConfig> {
        let mut config = match &self.config {
            Some(path) => PickerConfig::load(path)
                .with_context(|| format!("loading configuration '{}'", path.display()))?,
            None => PickerConfig::default(),
        };

        if let Some(size) = self.particle_size {
            config.particle_size = size;
        } else if self.config.is_none() {
            anyhow::bail!("--particle-size is required without --config");
        }
        if let Some(threads) = self.thr {
            config.threads = threads;
        }
        if let Some(filter_num) = self.filter_num {
            config.filter_num = filter_num;
        }
        if let Some(npca) = self.npca {
            config.npca = npca;
        }
        if let Some(ncorr) = self.ncorr {
            config.corr_num = ncorr;
        }
        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.picker_config()?;
    let mut session = Session::new(config, &cli.input, &cli.output_root, &cli.model)?;
    if let Some(positions) = &cli.positions {
        session = session.with_positions(positions);
    }

    match session.run(cli.mode)? {
        RunSummary::Picked(summary) => println!("{}", summary.picked),
        RunSummary::Invariants(summary) => {
            println!(
                "{} positive, {} negative examples extracted",
                summary.positives, summary.negatives
            );
        }
        RunSummary::Trained(summary) => {
            println!(
                "trained on {} rows ({} positive), second stage: {}",
                summary.rows,
                summary.positives,
                if summary.stage2 { "yes" } else { "no" }
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.log_dir.as_deref(), "autopick")?;

    run(&cli).inspect_err(|e| error!("{e:#}"))
}
