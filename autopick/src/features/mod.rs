//! Rotation-invariant feature extraction.
//!
//! A pick location becomes a feature vector in four steps:
//!
//! 1. **Filter bank**: the micrograph is split into band-pass copies
//! 2. **Polar resampling**: the patch of every band around the location is
//!    resampled on an (angle, radius) grid
//! 3. **Cross-band correlation**: polar images are correlated with themselves
//!    and with neighbouring bands; a rotation of the patch is a cyclic shift
//!    along the angle axis, which the correlation maps do not see
//! 4. **Projection**: correlation maps are projected onto per-channel PCA
//!    bases and 12 statistics of the raw patch are appended

mod correlation;
mod extractor;
mod filter_bank;
mod patch;
mod polar;

#[cfg(test)]
mod tests;

pub use correlation::cross_channel_correlation;
pub use extractor::{FeatureExtractor, InvariantStack, project_and_describe};
pub use filter_bank::FilterBank;
pub use patch::{extract_patch, patch_fits, statistical_descriptors};
pub use polar::PolarGrid;
