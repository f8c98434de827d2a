//! `try` / `autoselect`: search, classify, resolve overlaps, persist.

use common::parallel::par_map_with_threads;
use tracing::{debug, info};

use super::Session;
use crate::candidate::{Candidate, Status};
use crate::classify::Cascade;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::io::{CoordinateFile, CoordinateRecord, stack, vectors};
use crate::occlusion::resolve_occlusions;
use crate::pca::PcaModel;
use crate::search;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickSummary {
    /// Candidates forwarded to classification.
    pub candidates: usize,
    /// Candidates both stages accepted.
    pub accepted: usize,
    /// Picks written after overlap resolution.
    pub picked: usize,
}

impl Session {
    pub(super) fn pick(&self, keep_vectors: bool) -> Result<PickSummary> {
        let pca = PcaModel::load(&self.paths.pca_model, &self.geometry)?;
        let average = stack::read_image(&self.paths.particle_avg)?;
        let cascade = Cascade::load(
            &self.paths.svm,
            &self.paths.svm2,
            self.geometry.feature_len(),
        )?;

        let (image, bank) = self.prepare_micrograph()?;
        let extractor = FeatureExtractor::new(self.geometry, &image, &bank)?;

        let candidates = search::search(
            &image,
            &average,
            &self.geometry,
            self.config.candidate_fraction,
        );

        let evaluated = par_map_with_threads(&candidates, self.config.threads, |candidate| {
            let mut features = extractor.feature_vector(candidate.position, &pca);
            cascade.classify(&mut features).map(|score| Candidate {
                position: candidate.position,
                cost: score,
                status: Status::Accepted,
                features,
            })
        })?;
        let mut accepted: Vec<Candidate> = evaluated.into_iter().flatten().collect();
        let accepted_count = accepted.len();
        debug!(
            candidates = candidates.len(),
            accepted = accepted_count,
            "Classified candidates"
        );

        resolve_occlusions(&mut accepted, self.geometry.particle_radius);

        let picks: Vec<&Candidate> = accepted
            .iter()
            .filter(|c| c.status == Status::Accepted && c.cost > 0.0)
            .collect();
        self.save_picks(&picks)?;
        if keep_vectors {
            let rows: Vec<Vec<f64>> = picks.iter().map(|c| c.features.clone()).collect();
            vectors::write(&self.paths.auto_vectors, &rows)?;
        }

        let summary = PickSummary {
            candidates: candidates.len(),
            accepted: accepted_count,
            picked: picks.len(),
        };
        info!(
            candidates = summary.candidates,
            accepted = summary.accepted,
            picked = summary.picked,
            "Picked particles"
        );
        Ok(summary)
    }

    /// Replaces this model's table in the automatic positions file.
    fn save_picks(&self, picks: &[&Candidate]) -> Result<()> {
        let records = picks
            .iter()
            .map(|c| CoordinateRecord {
                x: self.geometry.to_original(c.position.x),
                y: self.geometry.to_original(c.position.y),
                enabled: 1,
                cost: c.cost,
            })
            .collect();

        let mut file = CoordinateFile::load_or_default(&self.paths.auto_positions)?;
        file.set_table(self.paths.auto_table.clone(), records);
        file.save(&self.paths.auto_positions)
    }
}
