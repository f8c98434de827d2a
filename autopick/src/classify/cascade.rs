use std::path::Path;

use tracing::{debug, warn};

use super::svm::SvmModel;
use crate::config::SvmParams;
use crate::dataset::{Dataset, Label};
use crate::error::{Error, Result};
use crate::math::min_max_normalize;

/// A trained binary classifier.
pub trait Classifier {
    /// Predicted label and its decision value.
    fn predict(&self, features: &[f64]) -> (Label, f64);
}

impl Classifier for SvmModel {
    fn predict(&self, features: &[f64]) -> (Label, f64) {
        SvmModel::predict(self, features)
    }
}

/// Two classifiers applied in sequence; the second one is optional.
#[derive(Debug, Clone)]
pub struct Cascade<C = SvmModel> {
    stage1: C,
    stage2: Option<C>,
}

impl<C: Classifier> Cascade<C> {
    pub fn new(stage1: C, stage2: Option<C>) -> Self {
        Self { stage1, stage2 }
    }

    #[inline]
    pub fn has_stage2(&self) -> bool {
        self.stage2.is_some()
    }

    /// Normalizes `features` in place (row min-max) and classifies them.
    ///
    /// Returns the decision value of the last stage that ran when every
    /// stage accepts.
    pub fn classify(&self, features: &mut [f64]) -> Option<f64> {
        min_max_normalize(features);

        let (label, score) = self.stage1.predict(features);
        if label != Label::Positive {
            return None;
        }
        match &self.stage2 {
            Some(stage2) => match stage2.predict(features) {
                (Label::Positive, score) => Some(score),
                _ => None,
            },
            None => Some(score),
        }
    }
}

impl Cascade<SvmModel> {
    /// Loads stage 1 from `svm` and, if the file exists, stage 2 from `svm2`.
    ///
    /// Both models must have been trained on `feature_len`-value vectors.
    pub fn load(svm: &Path, svm2: &Path, feature_len: usize) -> Result<Self> {
        let stage1 = SvmModel::load(svm, feature_len)?;
        let stage2 = if svm2.exists() {
            Some(SvmModel::load(svm2, feature_len)?)
        } else {
            None
        };
        debug!(stage2 = stage2.is_some(), "Loaded classifier cascade");
        Ok(Self::new(stage1, stage2))
    }

    /// Trains both stages from a row-normalized dataset and saves them.
    ///
    /// Stage 2 needs rejected automatic picks; without them any stale
    /// stage-2 model is removed and the cascade runs on stage 1 alone.
    pub fn train(
        dataset: &Dataset,
        stage1_params: SvmParams,
        stage2_params: SvmParams,
        svm: &Path,
        svm2: &Path,
    ) -> Result<Self> {
        let stage1 = SvmModel::train(&dataset.stage1(), stage1_params, "stage 1")?;
        stage1.save(svm)?;

        let subset = dataset.stage2();
        let stage2 = match SvmModel::train(&subset, stage2_params, "stage 2") {
            Ok(model) => {
                model.save(svm2)?;
                Some(model)
            }
            Err(Error::SingleClassTraining {
                positives,
                negatives,
                ..
            }) => {
                warn!(
                    positives,
                    rejected = negatives,
                    "Stage 2 needs positives and rejected picks, training stage 1 only"
                );
                if svm2.exists() {
                    std::fs::remove_file(svm2).map_err(|source| Error::Write {
                        path: svm2.to_path_buf(),
                        source,
                    })?;
                }
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(stage1, stage2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetBuilder;

    /// Accepts when the first feature exceeds a threshold.
    struct Threshold(f64);

    impl Classifier for Threshold {
        fn predict(&self, features: &[f64]) -> (Label, f64) {
            let score = features[0] - self.0;
            let label = if score > 0.0 {
                Label::Positive
            } else {
                Label::Negative
            };
            (label, score)
        }
    }

    #[test]
    fn test_both_stages_must_accept() {
        let cascade = Cascade::new(Threshold(0.1), Some(Threshold(0.6)));

        // normalized: [1, 0, 0.5]
        let mut strong = vec![10.0, 0.0, 5.0];
        let score = cascade.classify(&mut strong).unwrap();
        assert!((score - 0.4).abs() < 1e-12);
        assert_eq!(strong, vec![1.0, 0.0, 0.5]);

        // normalized first value 0.5: stage 1 yes, stage 2 no
        let mut medium = vec![5.0, 0.0, 10.0];
        assert_eq!(cascade.classify(&mut medium), None);

        let mut weak = vec![0.0, 10.0, 10.0];
        assert_eq!(cascade.classify(&mut weak), None);
    }

    #[test]
    fn test_missing_stage2_uses_stage1_only() {
        let cascade = Cascade::new(Threshold(0.1), None);
        assert!(!cascade.has_stage2());
        let mut medium = vec![5.0, 0.0, 10.0];
        let score = cascade.classify(&mut medium).unwrap();
        assert!((score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_constant_vector_is_not_nan() {
        let cascade = Cascade::new(Threshold(-1.0), None);
        let mut flat = vec![3.0; 5];
        assert_eq!(cascade.classify(&mut flat), Some(1.0));
        assert!(flat.iter().all(|v| *v == 0.0));
    }

    fn rows(label: Label, center: f64, count: usize, builder: &mut DatasetBuilder) {
        for i in 0..count {
            let jitter = i as f64 * 0.01;
            builder
                .push(label, &[center + jitter, 1.0 - center, 0.5, jitter])
                .unwrap();
        }
    }

    #[test]
    fn test_train_without_rejected_drops_stale_stage2() {
        let dir = tempfile::tempdir().unwrap();
        let (svm, svm2) = (dir.path().join("m_svm.txt"), dir.path().join("m_svm2.txt"));
        std::fs::write(&svm2, "stale").unwrap();

        let mut builder = DatasetBuilder::new();
        rows(Label::Positive, 0.9, 5, &mut builder);
        rows(Label::Negative, 0.1, 10, &mut builder);
        let dataset = builder.finish();

        let cascade =
            Cascade::train(&dataset, SvmParams::stage1(), SvmParams::stage2(), &svm, &svm2).unwrap();
        assert!(!cascade.has_stage2());
        assert!(svm.exists());
        assert!(!svm2.exists());

        let reloaded = Cascade::load(&svm, &svm2, 4).unwrap();
        assert!(!reloaded.has_stage2());
    }

    #[test]
    fn test_train_with_rejected_builds_stage2() {
        let dir = tempfile::tempdir().unwrap();
        let (svm, svm2) = (dir.path().join("m_svm.txt"), dir.path().join("m_svm2.txt"));

        let mut builder = DatasetBuilder::new();
        rows(Label::Positive, 0.9, 5, &mut builder);
        rows(Label::Negative, 0.1, 10, &mut builder);
        rows(Label::AutoRejected, 0.5, 4, &mut builder);
        let dataset = builder.finish();

        let cascade =
            Cascade::train(&dataset, SvmParams::stage1(), SvmParams::stage2(), &svm, &svm2).unwrap();
        assert!(cascade.has_stage2());
        assert!(Cascade::load(&svm, &svm2, 4).unwrap().has_stage2());
        assert!(matches!(
            Cascade::load(&svm, &svm2, 6),
            Err(Error::Malformed { .. })
        ));
    }
}
