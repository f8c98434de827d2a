//! `buildinv`: invariants and patches of manual picks and background samples.

use common::Buffer2;
use common::parallel::par_map_with_threads;
use glam::IVec2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::Session;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::io::{CoordinateFile, stack, vectors};
use crate::search::TemplateAccumulator;

/// Negatives drawn when fewer positives than this are known.
const MIN_NEGATIVES: usize = 40;

/// Minimum distance of a negative sample from every positive, in radii.
const NEGATIVE_CLEARANCE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvariantSummary {
    pub positives: usize,
    pub negatives: usize,
    /// Reviewed automatic picks queued as rejected examples.
    pub rejected: usize,
}

/// Positions of manual and accepted automatic picks, plus the feature
/// vectors of rejected automatic picks.
#[derive(Debug, Default)]
struct Picks {
    positions: Vec<IVec2>,
    rejected_vectors: Vec<Vec<f64>>,
}

impl Session {
    pub(super) fn build_invariants(&self) -> Result<InvariantSummary> {
        let (image, bank) = self.prepare_micrograph()?;
        let extractor = FeatureExtractor::new(self.geometry, &image, &bank)?;

        let picks = self.collect_picks()?;
        if !picks.rejected_vectors.is_empty() {
            vectors::write(&self.paths.rejected_vectors, &picks.rejected_vectors)?;
        }

        let positives: Vec<IVec2> = picks
            .positions
            .iter()
            .copied()
            .filter(|&p| {
                let fits = extractor.fits(p);
                if !fits {
                    warn!(x = p.x, y = p.y, "Pick too close to the border, skipped");
                }
                fits
            })
            .collect();

        self.update_template(&extractor, &positives)?;

        let negatives = negative_positions(
            image.dimensions(),
            &positives,
            self.geometry.particle_radius,
            self.config.negative_seed,
        );

        self.append_examples(
            &extractor,
            &positives,
            &self.paths.invariant_positive,
            &self.paths.particle_positive,
        )?;
        self.append_examples(
            &extractor,
            &negatives,
            &self.paths.invariant_negative,
            &self.paths.particle_negative,
        )?;

        let summary = InvariantSummary {
            positives: positives.len(),
            negatives: negatives.len(),
            rejected: picks.rejected_vectors.len(),
        };
        info!(
            positives = summary.positives,
            negatives = summary.negatives,
            rejected = summary.rejected,
            "Built invariants"
        );
        Ok(summary)
    }

    /// Manual picks, then the reviewed automatic picks of this model.
    fn collect_picks(&self) -> Result<Picks> {
        let mut picks = Picks::default();
        let Some(positions) = &self.positions else {
            warn!("No manual positions given");
            return Ok(picks);
        };

        let to_working = |x: i32, y: i32| {
            IVec2::new(
                self.geometry.to_working(x as f64),
                self.geometry.to_working(y as f64),
            )
        };

        let manual = CoordinateFile::load(positions)?;
        picks
            .positions
            .extend(manual.all_records().map(|r| to_working(r.x, r.y)));

        let auto = CoordinateFile::load_or_default(&self.paths.auto_positions)?;
        let records = auto.table(&self.paths.auto_table).unwrap_or_default();
        if !records.is_empty() {
            let auto_vectors = vectors::read(&self.paths.auto_vectors)?;
            if auto_vectors.len() != records.len() {
                return Err(Error::mismatch(
                    "automatic pick vectors",
                    records.len(),
                    auto_vectors.len(),
                ));
            }
            for (record, vector) in records.iter().zip(auto_vectors) {
                if record.is_rejected() {
                    picks.rejected_vectors.push(vector);
                } else {
                    picks.positions.push(to_working(record.x, record.y));
                }
            }
        }

        debug!(
            manual = manual.all_records().count(),
            automatic = records.len(),
            rejected = picks.rejected_vectors.len(),
            "Collected picks"
        );
        Ok(picks)
    }

    /// Folds the positive patches into the particle template and saves it.
    fn update_template(&self, extractor: &FeatureExtractor<'_>, positives: &[IVec2]) -> Result<()> {
        let mut template = if self.paths.particle_avg.exists() {
            TemplateAccumulator::seeded(&self.geometry, stack::read_image(&self.paths.particle_avg)?)?
        } else {
            TemplateAccumulator::new(&self.geometry)
        };
        for &p in positives {
            template.add(&extractor.raw_patch(p));
        }
        stack::write_image(&self.paths.particle_avg, &template.average()?)?;
        debug!(samples = template.count(), "Updated particle template");
        Ok(())
    }

    /// Appends invariant slices and raw patches of `positions` to the stacks.
    fn append_examples(
        &self,
        extractor: &FeatureExtractor<'_>,
        positions: &[IVec2],
        invariant_path: &std::path::Path,
        patch_path: &std::path::Path,
    ) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let extracted: Vec<(Vec<Buffer2<f64>>, Buffer2<f64>)> =
            par_map_with_threads(positions, self.config.threads, |&p| {
                (extractor.build_invariant(p), extractor.raw_patch(p))
            })?;

        let (invariants, patches): (Vec<Vec<Buffer2<f64>>>, Vec<Buffer2<f64>>) =
            extracted.into_iter().unzip();
        let slices: Vec<Buffer2<f64>> = invariants.into_iter().flatten().collect();
        stack::append(invariant_path, &slices)?;
        stack::append(patch_path, &patches)?;
        Ok(())
    }
}

/// Background sample positions: a grid with step `radius / 2`, at least two
/// radii from the border, away from every positive, randomly thinned.
fn negative_positions(
    dimensions: (usize, usize),
    positives: &[IVec2],
    radius: usize,
    seed: u64,
) -> Vec<IVec2> {
    let (w, h) = (dimensions.0 as i32, dimensions.1 as i32);
    let r = radius as i32;
    let step = (r / 2).max(1) as usize;
    let clearance = NEGATIVE_CLEARANCE * radius as f64;

    let clear = |p: IVec2| {
        positives
            .iter()
            .all(|q| (p - *q).as_dvec2().length() > clearance)
    };

    let mut grid: Vec<IVec2> = (2 * r..h - 2 * r)
        .step_by(step)
        .flat_map(|y| (2 * r..w - 2 * r).step_by(step).map(move |x| IVec2::new(x, y)))
        .filter(|&p| clear(p))
        .collect();

    let wanted = if positives.len() < MIN_NEGATIVES {
        MIN_NEGATIVES
    } else {
        2 * positives.len()
    };
    grid.shuffle(&mut StdRng::seed_from_u64(seed));
    grid.truncate(wanted);
    grid
}
