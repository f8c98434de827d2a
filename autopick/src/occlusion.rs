//! Greedy suppression of overlapping picks.

use tracing::debug;

use crate::candidate::{Candidate, Status, rank_by_cost};

/// Resolves overlaps so at most one candidate per particle stays accepted.
///
/// Candidates are ranked by cost first. Two candidates overlap when both
/// `|dx| < radius` and `|dy| < radius`; the lower-cost one is rejected and
/// the survivor keeps being compared against later candidates. Rejected
/// candidates never take part again. Returns the number of survivors.
pub fn resolve_occlusions(candidates: &mut [Candidate], radius: usize) -> usize {
    rank_by_cost(candidates);
    let r = radius as i32;

    for i in 0..candidates.len() {
        if candidates[i].is_rejected() {
            continue;
        }
        let mut reference = i;
        for j in i + 1..candidates.len() {
            if candidates[j].is_rejected() {
                continue;
            }
            let d = (candidates[j].position - candidates[reference].position).abs();
            if d.x >= r || d.y >= r {
                continue;
            }
            if candidates[reference].cost < candidates[j].cost {
                candidates[reference].status = Status::Rejected;
                reference = j;
            } else {
                candidates[j].status = Status::Rejected;
            }
        }
    }

    let survivors = candidates.iter().filter(|c| !c.is_rejected()).count();
    debug!(
        candidates = candidates.len(),
        survivors, "Resolved overlapping picks"
    );
    survivors
}
