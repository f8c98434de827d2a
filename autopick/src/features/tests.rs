use common::Buffer2;
use glam::IVec2;

use super::*;
use crate::config::{Geometry, PickerConfig};
use crate::pca::PcaModel;
use crate::testing::{ParticleFieldConfig, noise, particle_field, rotate_quarter};

fn geometry(filter_num: usize, corr_num: usize, npca: usize) -> Geometry {
    PickerConfig {
        particle_size: 24,
        filter_num,
        corr_num,
        npca,
        ..Default::default()
    }
    .geometry()
    .unwrap()
}

fn textured_micrograph(side: usize) -> Buffer2<f64> {
    let c = (side / 2) as i32;
    let mut image = particle_field(&ParticleFieldConfig {
        width: side,
        height: side,
        positions: vec![IVec2::new(c, c), IVec2::new(c - 5, c + 7)],
        radius: 8.0,
        noise: 0.0,
        ..Default::default()
    });
    let grain = noise(side, side, 0.1, 3);
    image.iter_mut().zip(grain.iter()).for_each(|(p, n)| *p += n);
    image
}

fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < tol, "index {i}: {x} vs {y}");
    }
}

#[test]
fn test_filter_bank_band_edges() {
    let band = FilterBank::band_pass(3);
    assert!((band.w1 - 0.075).abs() < 1e-12);
    assert!((band.w2 - 0.1).abs() < 1e-12);
}

#[test]
fn test_filter_bank_only_lowest_band_keeps_mean() {
    let image = textured_micrograph(48);
    let bank = FilterBank::build(&image, 4);
    assert_eq!(bank.len(), 4);
    for band in bank.bands() {
        assert_eq!(band.dimensions(), image.dimensions());
    }
    // only the lowest band passes the DC term
    let dc = |b: &Buffer2<f64>| b.iter().sum::<f64>() / b.len() as f64;
    assert!((dc(&bank.bands()[0]) - dc(&image)).abs() < 1e-9);
    for band in &bank.bands()[1..] {
        assert!(dc(band).abs() < 1e-9);
    }
}

#[test]
fn test_filter_bank_saves_one_slice_per_band() {
    let image = textured_micrograph(32);
    let bank = FilterBank::build(&image, 3);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mic_filterbank.stk");
    bank.save(&path).unwrap();

    assert_eq!(crate::io::stack::read(&path).unwrap(), bank.bands());
}

#[test]
fn test_invariant_has_one_map_per_channel() {
    let geometry = geometry(4, 2, 3);
    let image = textured_micrograph(48);
    let bank = FilterBank::build(&image, geometry.filter_num);
    let extractor = FeatureExtractor::new(geometry, &image, &bank).unwrap();

    let invariant = extractor.build_invariant(IVec2::new(24, 24));
    assert_eq!(invariant.len(), geometry.num_correlation);
    for map in &invariant {
        assert_eq!(map.dimensions(), (geometry.nr_steps, geometry.ang_steps));
    }
}

#[test]
fn test_extractor_rejects_wrong_bank() {
    let geometry = geometry(4, 2, 3);
    let image = textured_micrograph(32);
    let bank = FilterBank::build(&image, 3);
    assert!(FeatureExtractor::new(geometry, &image, &bank).is_err());
}

#[test]
fn test_invariant_is_rotation_invariant() {
    let geometry = geometry(3, 1, 2);
    let side = 41;
    let center = IVec2::new(20, 20);
    let image = textured_micrograph(side);
    let rotated = rotate_quarter(&image);

    let bank = FilterBank::build(&image, geometry.filter_num);
    let rotated_bank = FilterBank::build(&rotated, geometry.filter_num);
    let a = FeatureExtractor::new(geometry, &image, &bank).unwrap();
    let b = FeatureExtractor::new(geometry, &rotated, &rotated_bank).unwrap();

    let inv_a = a.build_invariant(center);
    let inv_b = b.build_invariant(center);
    for (ma, mb) in inv_a.iter().zip(&inv_b) {
        assert_close(ma.pixels(), mb.pixels(), 1e-9);
    }
}

#[test]
fn test_feature_vector_is_rotation_invariant_and_sized() {
    let geometry = geometry(3, 1, 2);
    let side = 41;
    let center = IVec2::new(20, 20);
    let image = textured_micrograph(side);
    let rotated = rotate_quarter(&image);

    let bank = FilterBank::build(&image, geometry.filter_num);
    let rotated_bank = FilterBank::build(&rotated, geometry.filter_num);
    let a = FeatureExtractor::new(geometry, &image, &bank).unwrap();
    let b = FeatureExtractor::new(geometry, &rotated, &rotated_bank).unwrap();

    let training: Vec<Buffer2<f64>> = [IVec2::new(16, 18), IVec2::new(20, 20), IVec2::new(24, 22)]
        .into_iter()
        .flat_map(|p| a.build_invariant(p))
        .collect();
    let pca = PcaModel::train(&training, &geometry).unwrap();

    let fa = a.feature_vector(center, &pca);
    let fb = b.feature_vector(center, &pca);
    assert_eq!(fa.len(), geometry.feature_len());
    assert_eq!(fa.len(), (3 + 2) * 2 + 12);
    assert_close(&fa, &fb, 1e-8);
}

#[test]
fn test_invariant_from_patches_matches_build_invariant() {
    let geometry = geometry(3, 2, 2);
    let image = textured_micrograph(40);
    let bank = FilterBank::build(&image, geometry.filter_num);
    let extractor = FeatureExtractor::new(geometry, &image, &bank).unwrap();
    let position = IVec2::new(19, 21);

    let patches: Vec<Buffer2<f64>> = bank
        .bands()
        .iter()
        .map(|b| extract_patch(b, position, geometry.particle_radius, true))
        .collect();
    let direct = extractor.build_invariant(position);
    let via_patches = extractor.invariant_from_patches(&patches);
    assert_eq!(direct, via_patches);
}

#[test]
fn test_fits_respects_radius() {
    let geometry = geometry(3, 1, 2);
    let image = textured_micrograph(40);
    let bank = FilterBank::build(&image, geometry.filter_num);
    let extractor = FeatureExtractor::new(geometry, &image, &bank).unwrap();
    assert!(extractor.fits(IVec2::new(12, 12)));
    assert!(extractor.fits(IVec2::new(27, 27)));
    assert!(!extractor.fits(IVec2::new(11, 20)));
    assert!(!extractor.fits(IVec2::new(20, 28)));
}
