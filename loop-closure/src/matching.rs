//! Cross-checked, ratio-tested descriptor matching between a query
//! descriptor matrix and a candidate descriptor matrix.

use rayon::prelude::*;

use crate::types::DescriptorMatrix;

/// Squared L2 distance between two equal-length descriptor rows.
fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// For every row of `from`, find the best and second-best row of `to` by L2
/// distance. Returns `(best_idx, best_dist, second_dist)` per row of `from`.
fn nearest_two(from: &DescriptorMatrix, to: &DescriptorMatrix) -> Vec<(usize, f32, f32)> {
    (0..from.rows())
        .into_par_iter()
        .map(|i| {
            let q = from.row(i);
            let mut best = (usize::MAX, f32::MAX, f32::MAX);
            for j in 0..to.rows() {
                let d = l2_sq(q, to.row(j));
                if d < best.1 {
                    best = (j, d, best.1);
                } else if d < best.2 {
                    best.2 = d;
                }
            }
            best
        })
        .collect()
}

/// Cross-check threshold matching (Lowe's ratio test in both directions,
/// keeping only mutual nearest neighbors). `ratio_thresh` is compared against
/// `sqrt(best) / sqrt(second)` to operate in linear distance space even
/// though the search itself works in squared distance.
pub fn cross_check_matches(
    query: &DescriptorMatrix,
    candidate: &DescriptorMatrix,
    ratio_thresh: f32,
) -> Vec<(usize, usize)> {
    if query.is_empty() || candidate.is_empty() {
        return Vec::new();
    }

    let q_to_c = nearest_two(query, candidate);
    let c_to_q = nearest_two(candidate, query);

    let passes_ratio = |best: f32, second: f32| -> bool {
        if second <= 0.0 {
            return best <= 0.0;
        }
        (best.sqrt() / second.sqrt()) < ratio_thresh
    };

    let mut matches = Vec::new();
    for (qi, &(cj, best, second)) in q_to_c.iter().enumerate() {
        if cj == usize::MAX || !passes_ratio(best, second) {
            continue;
        }
        // Mutual check: candidate row `cj`'s nearest query row must be `qi`.
        let (back_qi, back_best, back_second) = c_to_q[cj];
        if back_qi == qi && passes_ratio(back_best, back_second) {
            matches.push((qi, cj));
        }
    }

    matches
}
