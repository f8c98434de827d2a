//! `train`: fold extracted examples into the dataset and retrain the cascade.

use std::path::Path;

use tracing::{debug, info};

use super::{Session, remove_consumed};
use crate::classify::Cascade;
use crate::dataset::{Dataset, DatasetBuilder, Label};
use crate::error::{Error, Result};
use crate::features::project_and_describe;
use crate::io::{stack, vectors};
use crate::pca::PcaModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSummary {
    pub rows: usize,
    pub positives: usize,
    pub stage2: bool,
}

impl Session {
    pub(super) fn train(&self) -> Result<TrainSummary> {
        let pca = self.load_or_train_pca()?;

        let mut builder = DatasetBuilder::from_dataset(Dataset::load_or_default(&self.paths.training_set)?);
        let previous = builder.len();

        self.consume_examples(
            &pca,
            Label::Positive,
            &self.paths.invariant_positive,
            &self.paths.particle_positive,
            &mut builder,
        )?;
        self.consume_examples(
            &pca,
            Label::Negative,
            &self.paths.invariant_negative,
            &self.paths.particle_negative,
            &mut builder,
        )?;
        if self.paths.rejected_vectors.exists() {
            let rejected = vectors::read(&self.paths.rejected_vectors)?;
            builder.extend(Label::AutoRejected, &rejected)?;
            remove_consumed(&self.paths.rejected_vectors)?;
            debug!(rows = rejected.len(), "Added rejected automatic picks");
        }

        let dataset = builder.finish();
        dataset.save(&self.paths.training_set)?;
        info!(
            previous,
            rows = dataset.len(),
            positives = dataset.count(Label::Positive),
            negatives = dataset.count(Label::Negative),
            rejected = dataset.count(Label::AutoRejected),
            "Saved training set"
        );

        let cascade = Cascade::train(
            &dataset.normalized_rows(),
            self.config.stage1,
            self.config.stage2,
            &self.paths.svm,
            &self.paths.svm2,
        )?;

        Ok(TrainSummary {
            rows: dataset.len(),
            positives: dataset.count(Label::Positive),
            stage2: cascade.has_stage2(),
        })
    }

    /// The saved PCA model, or one trained from the positive invariants.
    fn load_or_train_pca(&self) -> Result<PcaModel> {
        if self.paths.pca_model.exists() {
            return PcaModel::load(&self.paths.pca_model, &self.geometry);
        }
        let invariants = stack::read(&self.paths.invariant_positive)?;
        let pca = PcaModel::train(&invariants, &self.geometry)?;
        pca.save(&self.paths.pca_model)?;
        info!(
            samples = invariants.len() / self.geometry.num_correlation,
            channels = self.geometry.num_correlation,
            components = self.geometry.npca,
            "Trained PCA model"
        );
        Ok(pca)
    }

    /// Appends feature vectors built from an invariant/patch stack pair and
    /// deletes both stacks.
    fn consume_examples(
        &self,
        pca: &PcaModel,
        label: Label,
        invariant_path: &Path,
        patch_path: &Path,
        builder: &mut DatasetBuilder,
    ) -> Result<()> {
        if !invariant_path.exists() {
            debug!(path = %invariant_path.display(), "No new examples");
            return Ok(());
        }
        let invariants = stack::read(invariant_path)?;
        let patches = stack::read(patch_path)?;
        let channels = self.geometry.num_correlation;
        if invariants.len() != patches.len() * channels {
            return Err(Error::mismatch(
                format!("invariant slices in {}", invariant_path.display()),
                patches.len() * channels,
                invariants.len(),
            ));
        }

        for (invariant, patch) in invariants.chunks(channels).zip(&patches) {
            builder.push(label, &project_and_describe(invariant, patch, pca))?;
        }
        remove_consumed(invariant_path)?;
        remove_consumed(patch_path)?;
        debug!(?label, rows = patches.len(), "Added examples");
        Ok(())
    }
}
