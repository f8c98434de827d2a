//! Candidate search: a template built from aligned positive patches is
//! correlated with the micrograph, and local maxima of the band-passed
//! response become ranked candidates.

mod candidates;
mod template;

pub use candidates::{MaskedTemplate, correlation_map, local_maxima, search};
pub use template::TemplateAccumulator;
