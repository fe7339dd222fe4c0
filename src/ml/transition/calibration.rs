use serde::{Deserialize, Serialize};

/// Number of equal-width probability bins for ECE
pub const ECE_BINS: usize = 10;

/// Calibration diagnostics persisted next to the training artifact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub ece: f64,
    pub brier: f64,
    pub count: usize,
}

impl CalibrationReport {
    pub fn compute(probs: &[f64], targets: &[f64]) -> Self {
        Self {
            ece: expected_calibration_error(probs, targets, ECE_BINS),
            brier: brier_score(probs, targets),
            count: probs.len(),
        }
    }
}

/// Mean squared error between probability and binary outcome (0.0 when empty)
pub fn brier_score(probs: &[f64], targets: &[f64]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    probs
        .iter()
        .zip(targets)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / probs.len() as f64
}

/// Expected calibration error over `bins` equal-width bins of [0, 1].
///
/// Bins are half-open `[lower, upper)` except the last, which also takes 1.0.
/// Each non-empty bin adds |mean confidence - mean outcome| weighted by its share
/// of samples; empty bins are skipped.
pub fn expected_calibration_error(probs: &[f64], targets: &[f64], bins: usize) -> f64 {
    if probs.is_empty() || bins == 0 {
        return 0.0;
    }
    let total = probs.len() as f64;
    let mut ece = 0.0;

    for b in 0..bins {
        let lower = b as f64 / bins as f64;
        let upper = (b + 1) as f64 / bins as f64;
        let last = b == bins - 1;

        let mut count = 0usize;
        let mut conf_sum = 0.0;
        let mut acc_sum = 0.0;
        for (&p, &y) in probs.iter().zip(targets) {
            let in_bin = p >= lower && (p < upper || (last && p <= upper));
            if in_bin {
                count += 1;
                conf_sum += p;
                acc_sum += y;
            }
        }
        if count == 0 {
            continue;
        }
        let n = count as f64;
        ece += n / total * (conf_sum / n - acc_sum / n).abs();
    }
    ece
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ece_zero_on_perfectly_calibrated_data() {
        let probs = [0.25, 0.25, 0.25, 0.25, 0.75, 0.75, 0.75, 0.75];
        let targets = [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        assert!(expected_calibration_error(&probs, &targets, ECE_BINS).abs() < 1e-12);
    }

    #[test]
    fn test_ece_weights_bins_by_occupancy() {
        // bin [0.1, 0.2): conf 0.1, acc 1.0 -> gap 0.9 with weight 1/2
        // bin [0.9, 1.0]: conf 0.9, acc 1.0 -> gap 0.1 with weight 1/2
        let probs = [0.1, 0.9];
        let targets = [1.0, 1.0];
        let ece = expected_calibration_error(&probs, &targets, ECE_BINS);
        assert!((ece - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_probability_one_lands_in_last_bin() {
        let ece = expected_calibration_error(&[1.0], &[1.0], ECE_BINS);
        assert_eq!(ece, 0.0);
        let ece = expected_calibration_error(&[1.0], &[0.0], ECE_BINS);
        assert_eq!(ece, 1.0);
    }

    #[test]
    fn test_brier_score() {
        assert_eq!(brier_score(&[0.0, 1.0], &[0.0, 1.0]), 0.0);
        assert!((brier_score(&[0.5, 0.5], &[0.0, 1.0]) - 0.25).abs() < 1e-12);
        assert_eq!(brier_score(&[], &[]), 0.0);
    }

    #[test]
    fn test_report_counts_samples() {
        let report = CalibrationReport::compute(&[0.2, 0.4, 0.6], &[0.0, 0.0, 1.0]);
        assert_eq!(report.count, 3);
        assert!(report.brier > 0.0);
    }
}
