use common::Buffer2;
use glam::IVec2;

use super::correlation::cross_channel_correlation;
use super::filter_bank::FilterBank;
use super::patch::{extract_patch, patch_fits, statistical_descriptors};
use super::polar::PolarGrid;
use crate::config::Geometry;
use crate::error::{Error, Result};
use crate::math::Fft2;
use crate::pca::PcaModel;

/// One correlation map per channel, in [`Geometry::channel_pairs`] order.
pub type InvariantStack = Vec<Buffer2<f64>>;

/// Turns pick locations into invariant stacks and feature vectors.
///
/// Holds the polar grid and FFT plans for one geometry, so a single
/// instance can be shared across worker threads.
#[derive(Debug)]
pub struct FeatureExtractor<'a> {
    geometry: Geometry,
    micrograph: &'a Buffer2<f64>,
    bank: &'a FilterBank,
    grid: PolarGrid,
    polar_fft: Fft2,
    pairs: Vec<(usize, usize)>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(geometry: Geometry, micrograph: &'a Buffer2<f64>, bank: &'a FilterBank) -> Result<Self> {
        if bank.len() != geometry.filter_num {
            return Err(Error::mismatch("filter bank bands", geometry.filter_num, bank.len()));
        }
        if let Some(band) = bank.bands().first()
            && band.dimensions() != micrograph.dimensions()
        {
            return Err(Error::mismatch(
                "filter bank size",
                format!("{:?}", micrograph.dimensions()),
                format!("{:?}", band.dimensions()),
            ));
        }

        Ok(Self {
            geometry,
            micrograph,
            bank,
            grid: PolarGrid::for_geometry(&geometry),
            polar_fft: Fft2::new(geometry.nr_steps, geometry.ang_steps),
            pairs: geometry.channel_pairs(),
        })
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn micrograph(&self) -> &Buffer2<f64> {
        self.micrograph
    }

    /// Whether a full patch around `position` lies inside the micrograph.
    pub fn fits(&self, position: IVec2) -> bool {
        patch_fits(
            self.micrograph.dimensions(),
            position,
            self.geometry.particle_radius,
        )
    }

    /// Un-normalized micrograph patch around `position`.
    pub fn raw_patch(&self, position: IVec2) -> Buffer2<f64> {
        extract_patch(self.micrograph, position, self.geometry.particle_radius, false)
    }

    /// Crop, polar resampling and cross-band correlation at `position`.
    pub fn build_invariant(&self, position: IVec2) -> InvariantStack {
        let patches: Vec<Buffer2<f64>> = self
            .bank
            .bands()
            .iter()
            .map(|band| extract_patch(band, position, self.geometry.particle_radius, true))
            .collect();
        self.invariant_from_patches(&patches)
    }

    /// Invariant stack of already cropped band patches, lowest band first.
    pub fn invariant_from_patches(&self, band_patches: &[Buffer2<f64>]) -> InvariantStack {
        assert_eq!(band_patches.len(), self.geometry.filter_num);
        let polar: Vec<Buffer2<f64>> = band_patches
            .iter()
            .map(|patch| self.grid.to_polar(patch))
            .collect();
        cross_channel_correlation(&self.polar_fft, &polar, &self.pairs)
    }

    /// Full feature vector at `position`.
    pub fn feature_vector(&self, position: IVec2, pca: &PcaModel) -> Vec<f64> {
        let invariant = self.build_invariant(position);
        let features = project_and_describe(&invariant, &self.raw_patch(position), pca);
        debug_assert_eq!(features.len(), self.geometry.feature_len());
        features
    }
}

/// PCA coefficients of `invariant` followed by the statistics of `raw_patch`.
pub fn project_and_describe(invariant: &[Buffer2<f64>], raw_patch: &Buffer2<f64>, pca: &PcaModel) -> Vec<f64> {
    let mut features = pca.project(invariant);
    features.extend_from_slice(&statistical_descriptors(raw_patch.pixels()));
    features
}
