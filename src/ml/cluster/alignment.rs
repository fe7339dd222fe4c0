use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor for the drift denominator when the previous centroids sit at the origin
pub const DRIFT_EPSILON: f64 = 1e-6;

/// Largest k searched exhaustively (k! candidate orderings)
pub const EXHAUSTIVE_MAX_K: usize = 8;

/// How fresh centroids are matched against the previous run's ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStrategy {
    /// Try the identity and the full reversal only. Exact for k <= 2.
    #[default]
    IdentityOrReversal,
    /// Try every ordering when k <= EXHAUSTIVE_MAX_K, otherwise identity/reversal
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentOutcome {
    /// A non-identity ordering was selected
    pub swapped: bool,
    /// Previous centroids had a different shape; alignment was skipped
    pub shape_mismatch: bool,
}

/// Reorder `centroids` so label i keeps meaning what it meant in `previous`.
///
/// Ties keep the identity ordering. A missing or differently shaped previous
/// set returns the centroids unchanged.
pub fn align_centroids(
    previous: Option<&Array2<f64>>,
    centroids: &Array2<f64>,
    strategy: AlignmentStrategy,
) -> (Array2<f64>, AlignmentOutcome) {
    let previous = match previous {
        Some(prev) => prev,
        None => return (centroids.clone(), AlignmentOutcome::default()),
    };

    if previous.shape() != centroids.shape() {
        warn!(
            "Previous centroids shape {:?} differs from {:?}; skipping alignment",
            previous.shape(),
            centroids.shape()
        );
        return (
            centroids.clone(),
            AlignmentOutcome { swapped: false, shape_mismatch: true },
        );
    }

    let k = centroids.nrows();
    let identity: Vec<usize> = (0..k).collect();
    let mut best_perm = identity.clone();
    let mut best_score = f64::INFINITY;

    for perm in candidate_permutations(k, strategy) {
        let score = permutation_cost(previous, centroids, &perm);
        if score < best_score {
            best_score = score;
            best_perm = perm;
        }
    }

    debug!("Alignment: best ordering {:?} (cost {:.6})", best_perm, best_score);
    let aligned = centroids.select(Axis(0), &best_perm);
    let swapped = best_perm != identity;
    (aligned, AlignmentOutcome { swapped, shape_mismatch: false })
}

/// Sum of row distances between `previous[i]` and `centroids[perm[i]]`
fn permutation_cost(previous: &Array2<f64>, centroids: &Array2<f64>, perm: &[usize]) -> f64 {
    perm.iter()
        .enumerate()
        .map(|(i, &j)| {
            previous
                .row(i)
                .iter()
                .zip(centroids.row(j).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .sum()
}

fn candidate_permutations(k: usize, strategy: AlignmentStrategy) -> Vec<Vec<usize>> {
    let identity: Vec<usize> = (0..k).collect();
    match strategy {
        AlignmentStrategy::Exhaustive if k <= EXHAUSTIVE_MAX_K => all_permutations(identity),
        _ => {
            let reversed: Vec<usize> = identity.iter().rev().copied().collect();
            vec![identity, reversed]
        }
    }
}

/// Heap's algorithm; the first element is the input ordering
fn all_permutations(mut items: Vec<usize>) -> Vec<Vec<usize>> {
    let n = items.len();
    let mut result = vec![items.clone()];
    let mut counters = vec![0usize; n];
    let mut i = 0;
    while i < n {
        if counters[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(counters[i], i);
            }
            result.push(items.clone());
            counters[i] += 1;
            i = 0;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
    result
}

/// Normalized centroid displacement: ||old - new|| / max(||old||, eps).
///
/// 0.0 without a previous set, and 0.0 (with a warning upstream) when the
/// shapes differ since the sets are not comparable.
pub fn prototype_drift(previous: Option<&Array2<f64>>, aligned: &Array2<f64>) -> f64 {
    let previous = match previous {
        Some(prev) if prev.shape() == aligned.shape() => prev,
        _ => return 0.0,
    };
    let displacement = frobenius(&(previous - aligned));
    displacement / frobenius(previous).max(DRIFT_EPSILON)
}

fn frobenius(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reversed_centroids_are_swapped_back() {
        let previous = array![[0.0, 0.0], [10.0, 10.0]];
        let fresh = array![[10.0, 10.0], [0.0, 0.0]];

        let (aligned, outcome) =
            align_centroids(Some(&previous), &fresh, AlignmentStrategy::IdentityOrReversal);
        assert!(outcome.swapped);
        assert!(!outcome.shape_mismatch);
        assert_eq!(aligned, previous);
        assert!(prototype_drift(Some(&previous), &aligned).abs() < 1e-12);
    }

    #[test]
    fn test_identity_kept_when_already_aligned() {
        let previous = array![[0.0, 0.0], [10.0, 10.0]];
        let fresh = array![[0.5, 0.0], [9.5, 10.0]];
        let (aligned, outcome) =
            align_centroids(Some(&previous), &fresh, AlignmentStrategy::IdentityOrReversal);
        assert!(!outcome.swapped);
        assert_eq!(aligned, fresh);
    }

    #[test]
    fn test_shape_mismatch_skips_alignment() {
        let previous = array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let fresh = array![[1.0, 1.0], [0.0, 0.0]];
        let (aligned, outcome) =
            align_centroids(Some(&previous), &fresh, AlignmentStrategy::IdentityOrReversal);
        assert!(outcome.shape_mismatch);
        assert!(!outcome.swapped);
        assert_eq!(aligned, fresh);
        assert_eq!(prototype_drift(Some(&previous), &aligned), 0.0);
    }

    #[test]
    fn test_drift_zero_without_previous() {
        let fresh = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(prototype_drift(None, &fresh), 0.0);
        let (_, outcome) = align_centroids(None, &fresh, AlignmentStrategy::Exhaustive);
        assert_eq!(outcome, AlignmentOutcome::default());
    }

    #[test]
    fn test_drift_scales_linearly_with_displacement() {
        let previous = array![[1.0, 0.0], [0.0, 1.0]];
        let base = frobenius(&previous);
        for step in 1..=5 {
            let shift = step as f64 * 0.1;
            let moved = &previous + shift;
            let drift = prototype_drift(Some(&previous), &moved);
            let expected = (4.0 * shift * shift).sqrt() / base;
            assert!((drift - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_exhaustive_recovers_rotation_for_three_clusters() {
        let previous = array![[0.0, 0.0], [5.0, 0.0], [0.0, 5.0]];
        let fresh = array![[5.0, 0.0], [0.0, 5.0], [0.0, 0.0]];

        let (aligned, outcome) = align_centroids(Some(&previous), &fresh, AlignmentStrategy::Exhaustive);
        assert!(outcome.swapped);
        assert_eq!(aligned, previous);

        // Reversal alone cannot undo a rotation
        let (partial, _) =
            align_centroids(Some(&previous), &fresh, AlignmentStrategy::IdentityOrReversal);
        assert_ne!(partial, previous);
    }

    #[test]
    fn test_all_permutations_count() {
        let perms = all_permutations((0..4).collect());
        assert_eq!(perms.len(), 24);
        assert_eq!(perms[0], vec![0, 1, 2, 3]);
    }
}
