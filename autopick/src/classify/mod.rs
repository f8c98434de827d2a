//! Two-stage classification of candidate feature vectors.

mod cascade;
mod svm;

pub use cascade::{Cascade, Classifier};
pub use svm::SvmModel;
