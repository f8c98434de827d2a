//! On-disk formats of a picking session.
//!
//! - [`stack`]: binary image stacks (filter bank, invariants, patches, PCA
//!   model, particle template)
//! - [`coordinates`]: named tables of picked positions
//! - [`vectors`]: plain-text feature vector lists
//! - [`paths`]: the file names derived from the output and model roots

pub mod coordinates;
pub mod paths;
pub mod stack;
pub(crate) mod text;
pub mod vectors;

pub use coordinates::{CoordinateFile, CoordinateRecord};
pub use paths::SessionPaths;
