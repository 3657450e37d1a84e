//! Greedy box-level non-maximum suppression over candidate masks
//!
//! Candidates are compared by bounding-box IoU, not pixel IoU. This is an
//! approximation that keeps the pass `O(n²)` over box arithmetic only.

use crate::types::SegmentationResult;
use std::cmp::Ordering;

/// Rank order: predicted IoU descending, then area descending
///
/// `total_cmp` keeps the order total even for NaN scores, which sort above
/// every finite score.
fn rank(a: &SegmentationResult, b: &SegmentationResult) -> Ordering {
    b.predicted_iou
        .total_cmp(&a.predicted_iou)
        .then_with(|| b.area.cmp(&a.area))
}

/// Keep candidates whose box IoU with every stronger kept candidate is `<= threshold`
///
/// The sort is stable, so equally ranked candidates keep their input order
/// and the output is deterministic for a given input sequence.
#[must_use]
pub fn deduplicate(
    mut candidates: Vec<SegmentationResult>,
    overlap_threshold: f32,
) -> Vec<SegmentationResult> {
    candidates.sort_by(rank);

    let mut kept: Vec<SegmentationResult> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.bounding_box.iou(&candidate.bounding_box) > overlap_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
