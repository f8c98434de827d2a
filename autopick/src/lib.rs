//! Autopick - learning-based particle picking for electron micrographs.
//!
//! The picker learns from a handful of manual picks and scans the whole
//! micrograph for more:
//! - Rotation-invariant features from a filter bank, polar resampling and
//!   cross-band correlation, reduced by per-channel PCA
//! - Candidate search by template correlation and local maxima
//! - A two-stage SVM cascade with overlap suppression
//! - An incremental training loop that feeds reviewed picks back as examples
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use autopick::{Mode, PickerConfig, Session};
//!
//! let config = PickerConfig::with_particle_size(100);
//! let session = Session::new(config, "mic01.tif", "out/mic01".as_ref(), "models/ribo".as_ref())?
//!     .with_positions("mic01_manual.pos");
//! session.run(Mode::BuildInvariants)?;
//! session.run(Mode::Train)?;
//! let summary = session.run(Mode::AutoSelect)?;
//! ```

mod candidate;
pub mod classify;
mod config;
pub mod dataset;
mod error;
pub mod features;
pub mod io;
pub mod math;
pub mod micrograph;
mod occlusion;
mod pca;
pub mod search;
mod session;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Configuration and errors
// ============================================================================

pub use config::{Geometry, PickerConfig, STATISTIC_COUNT, SvmParams};
pub use error::{Error, Result};

// ============================================================================
// Pipeline building blocks
// ============================================================================

pub use candidate::{Candidate, Status, rank_by_cost};
pub use classify::{Cascade, Classifier, SvmModel};
pub use dataset::{Dataset, DatasetBuilder, Label};
pub use features::{FeatureExtractor, FilterBank};
pub use occlusion::resolve_occlusions;
pub use pca::{PcaChannel, PcaModel};

// ============================================================================
// Sessions
// ============================================================================

pub use session::{InvariantSummary, Mode, PickSummary, RunSummary, Session, TrainSummary};
