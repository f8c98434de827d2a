//! Proposed particle locations.

use glam::IVec2;

/// Review state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Unlabeled,
    Accepted,
    Rejected,
}

/// A particle location in working (downscaled) pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub position: IVec2,
    /// Template correlation during search, classifier margin afterwards.
    pub cost: f64,
    pub status: Status,
    /// Normalized feature vector, empty until classified.
    pub features: Vec<f64>,
}

impl Candidate {
    pub fn new(position: IVec2, cost: f64) -> Self {
        Self {
            position,
            cost,
            status: Status::Unlabeled,
            features: Vec::new(),
        }
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.status == Status::Rejected
    }
}

/// Stable sort by descending cost; equal costs keep their order.
pub fn rank_by_cost(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.cost.total_cmp(&a.cost));
}
