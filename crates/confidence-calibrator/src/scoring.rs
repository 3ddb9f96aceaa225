//! Proper scoring rules and calibration error.
//!
//! Mismatched or empty inputs are caller errors and fail explicitly; a
//! probability outside [0, 1] is rejected rather than silently clamped.

use cycle_core::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// A bin in the reliability diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    /// Average predicted probability in this bin
    pub avg_predicted: f64,
    /// Fraction of positive outcomes in this bin
    pub observed_rate: f64,
    pub count: usize,
}

/// Calibration summary over a set of scored predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Expected Calibration Error (lower is better)
    pub ece: f64,
    /// Maximum Calibration Error over non-empty bins
    pub mce: f64,
    pub brier_score: f64,
    pub sample_size: usize,
    pub reliability_bins: Vec<ReliabilityBin>,
}

fn validate(probabilities: &[f64], outcomes: &[bool]) -> Result<()> {
    if probabilities.len() != outcomes.len() {
        return Err(ForecastError::LengthMismatch {
            left: probabilities.len(),
            right: outcomes.len(),
        });
    }
    if probabilities.is_empty() {
        return Err(ForecastError::InsufficientData(
            "scoring requires at least one prediction".to_string(),
        ));
    }
    if let Some(p) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(ForecastError::InvalidData(format!(
            "probability {} is outside [0, 1]",
            p
        )));
    }
    Ok(())
}

fn outcome_value(outcome: bool) -> f64 {
    if outcome {
        1.0
    } else {
        0.0
    }
}

/// Mean squared difference between probabilities and binary outcomes.
pub fn brier_score(probabilities: &[f64], outcomes: &[bool]) -> Result<f64> {
    validate(probabilities, outcomes)?;
    let total: f64 = probabilities
        .iter()
        .zip(outcomes)
        .map(|(p, o)| (p - outcome_value(*o)).powi(2))
        .sum();
    Ok(total / probabilities.len() as f64)
}

/// Mean negative log likelihood with probabilities clamped to `[eps, 1 - eps]`.
pub fn negative_log_likelihood(probabilities: &[f64], outcomes: &[bool], epsilon: f64) -> Result<f64> {
    validate(probabilities, outcomes)?;
    let eps = epsilon.clamp(f64::MIN_POSITIVE, 0.5);
    let total: f64 = probabilities
        .iter()
        .zip(outcomes)
        .map(|(p, o)| {
            let p = p.clamp(eps, 1.0 - eps);
            let y = outcome_value(*o);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum();
    Ok((-total / probabilities.len() as f64).max(0.0))
}

/// Expected calibration error over `bins` equal-width probability bins.
pub fn calibration_error(probabilities: &[f64], outcomes: &[bool], bins: usize) -> Result<f64> {
    Ok(calibration_report(probabilities, outcomes, bins)?.ece)
}

pub fn calibration_report(
    probabilities: &[f64],
    outcomes: &[bool],
    bins: usize,
) -> Result<CalibrationReport> {
    validate(probabilities, outcomes)?;
    let n_bins = bins.max(1);
    let mut grouped: Vec<Vec<(f64, bool)>> = vec![Vec::new(); n_bins];

    for (&p, &o) in probabilities.iter().zip(outcomes) {
        let idx = ((p * n_bins as f64) as usize).min(n_bins - 1);
        grouped[idx].push((p, o));
    }

    let n = probabilities.len() as f64;
    let mut ece = 0.0;
    let mut mce: f64 = 0.0;
    let mut reliability_bins = Vec::new();

    for (i, bin) in grouped.iter().enumerate() {
        if bin.is_empty() {
            continue;
        }
        let count = bin.len() as f64;
        let avg_predicted = bin.iter().map(|(p, _)| p).sum::<f64>() / count;
        let observed_rate = bin.iter().filter(|(_, o)| *o).count() as f64 / count;
        let gap = (avg_predicted - observed_rate).abs();

        ece += gap * count / n;
        mce = mce.max(gap);

        reliability_bins.push(ReliabilityBin {
            lower: i as f64 / n_bins as f64,
            upper: (i + 1) as f64 / n_bins as f64,
            avg_predicted,
            observed_rate,
            count: bin.len(),
        });
    }

    Ok(CalibrationReport {
        ece,
        mce,
        brier_score: brier_score(probabilities, outcomes)?,
        sample_size: probabilities.len(),
        reliability_bins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_brier_perfect_and_worst() {
        assert_eq!(brier_score(&[1.0, 0.0], &[true, false]).unwrap(), 0.0);
        assert_eq!(brier_score(&[0.0, 1.0], &[true, false]).unwrap(), 1.0);
    }

    #[test]
    fn test_brier_coin_flip() {
        let score = brier_score(&[0.5, 0.5, 0.5], &[true, false, true]).unwrap();
        assert_relative_eq!(score, 0.25);
    }

    #[test]
    fn test_brier_rejects_bad_input() {
        assert!(matches!(
            brier_score(&[0.5, 0.5], &[true]),
            Err(ForecastError::LengthMismatch { left: 2, right: 1 })
        ));
        assert!(matches!(
            brier_score(&[], &[]),
            Err(ForecastError::InsufficientData(_))
        ));
        assert!(matches!(
            brier_score(&[1.5], &[true]),
            Err(ForecastError::InvalidData(_))
        ));
    }

    #[test]
    fn test_nll_finite_at_extremes() {
        let nll = negative_log_likelihood(&[0.0, 1.0, 1.0, 0.0], &[true, false, true, false], 1e-7)
            .unwrap();
        assert!(nll.is_finite());
        assert!(nll >= 0.0);

        let perfect = negative_log_likelihood(&[1.0, 0.0], &[true, false], 1e-7).unwrap();
        assert!(perfect.is_finite());
        assert!(perfect >= 0.0 && perfect < 1e-5);
    }

    #[test]
    fn test_nll_coin_flip() {
        let nll = negative_log_likelihood(&[0.5, 0.5], &[true, false], 1e-7).unwrap();
        assert_relative_eq!(nll, std::f64::consts::LN_2, epsilon = 1e-12);
    }

    #[test]
    fn test_ece_perfectly_calibrated() {
        // 70% predictions that come true 7 times out of 10
        let probs = vec![0.7; 10];
        let outcomes: Vec<bool> = (0..10).map(|i| i < 7).collect();
        assert_relative_eq!(calibration_error(&probs, &outcomes, 10).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ece_weighted_by_population() {
        let probs = vec![0.9, 0.9, 0.9, 0.9, 0.1];
        let outcomes = vec![false, false, false, false, false];
        let report = calibration_report(&probs, &outcomes, 10).unwrap();
        // 4/5 * 0.9 + 1/5 * 0.1
        assert_relative_eq!(report.ece, 0.74, epsilon = 1e-12);
        assert_relative_eq!(report.mce, 0.9, epsilon = 1e-12);
        assert_eq!(report.reliability_bins.len(), 2);
        assert_eq!(report.reliability_bins[1].count, 4);
    }
}
