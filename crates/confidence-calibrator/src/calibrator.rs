//! Confidence Calibration
//!
//! Fits a monotone map from raw prediction confidence to calibrated probability.
//! Used by the recalibration engine to measure how much of the observed
//! calibration error each strategy can remove.

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Method used for calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Platt scaling - fits a sigmoid to the confidence logits
    PlattScaling,
    /// Isotonic regression - non-parametric monotonic fit
    IsotonicRegression,
    /// Temperature scaling - single parameter scaling
    TemperatureScaling,
    /// No calibration applied
    None,
}

const LOGIT_EPSILON: f64 = 1e-6;

fn logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Confidence calibrator fitted on (confidence, was_accurate) pairs
#[derive(Debug, Clone)]
pub struct ConfidenceCalibrator {
    /// Platt scaling parameters (sigmoid over logits)
    platt_a: f64,
    platt_b: f64,
    /// Temperature for temperature scaling
    temperature: f64,
    /// Isotonic regression lookup table (block mean confidence, block accuracy)
    isotonic_table: Vec<(f64, f64)>,
    method: CalibrationMethod,
    is_fitted: bool,
}

impl Default for ConfidenceCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfidenceCalibrator {
    /// Create a new uncalibrated calibrator (identity map)
    pub fn new() -> Self {
        Self {
            platt_a: 1.0,
            platt_b: 0.0,
            temperature: 1.0,
            isotonic_table: Vec::new(),
            method: CalibrationMethod::None,
            is_fitted: false,
        }
    }

    /// Fit the calibrator using historical predictions and outcomes
    pub fn fit(
        &mut self,
        predictions: &[(f64, bool)], // (predicted_confidence, was_accurate)
        method: CalibrationMethod,
    ) -> anyhow::Result<()> {
        if predictions.len() < 2 {
            bail!("Need at least 2 predictions for calibration");
        }
        if predictions.iter().any(|(p, _)| !p.is_finite()) {
            bail!("Prediction confidences must be finite");
        }

        self.method = method;

        match method {
            CalibrationMethod::PlattScaling => self.fit_platt(predictions),
            CalibrationMethod::IsotonicRegression => self.fit_isotonic(predictions),
            CalibrationMethod::TemperatureScaling => self.fit_temperature(predictions),
            CalibrationMethod::None => {}
        }

        self.is_fitted = true;
        Ok(())
    }

    /// Fit Platt scaling by gradient descent, starting from the identity map
    fn fit_platt(&mut self, predictions: &[(f64, bool)]) {
        // P(accurate | c) = sigmoid(a * logit(c) + b)
        let mut a = 1.0;
        let mut b = 0.0;
        let learning_rate = 0.1;
        let iterations = 2000;
        let n = predictions.len() as f64;

        for _ in 0..iterations {
            let mut grad_a = 0.0;
            let mut grad_b = 0.0;

            for (pred, outcome) in predictions {
                let y = if *outcome { 1.0 } else { 0.0 };
                let x = logit(*pred);
                let error = sigmoid(a * x + b) - y;
                grad_a += error * x;
                grad_b += error;
            }

            a -= learning_rate * grad_a / n;
            b -= learning_rate * grad_b / n;
        }

        self.platt_a = a;
        self.platt_b = b;
    }

    /// Fit isotonic regression (pool adjacent violators algorithm)
    fn fit_isotonic(&mut self, predictions: &[(f64, bool)]) {
        let mut sorted: Vec<_> = predictions.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Each block: (sum of confidences, sum of outcomes, weight)
        let mut blocks: Vec<(f64, f64, f64)> = Vec::with_capacity(sorted.len());
        for (pred, outcome) in sorted {
            blocks.push((pred, if outcome { 1.0 } else { 0.0 }, 1.0));

            // Pool while the last two blocks violate monotonicity
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.1 / prev.2 <= last.1 / last.2 {
                    break;
                }
                blocks.pop();
                let merged = blocks.len() - 1;
                blocks[merged] = (prev.0 + last.0, prev.1 + last.1, prev.2 + last.2);
            }
        }

        self.isotonic_table = blocks
            .iter()
            .map(|(x_sum, y_sum, w)| (x_sum / w, y_sum / w))
            .collect();
    }

    /// Fit temperature scaling by grid search over the negative log likelihood
    fn fit_temperature(&mut self, predictions: &[(f64, bool)]) {
        let mut best_temp = 1.0;
        let mut best_loss = f64::MAX;

        for t in (1..=100).map(|i| i as f64 * 0.1) {
            let loss: f64 = predictions
                .iter()
                .map(|(pred, outcome)| {
                    let scaled = Self::apply_temperature(*pred, t);
                    if *outcome {
                        -scaled.max(1e-10).ln()
                    } else {
                        -(1.0 - scaled).max(1e-10).ln()
                    }
                })
                .sum();

            if loss < best_loss {
                best_loss = loss;
                best_temp = t;
            }
        }

        self.temperature = best_temp;
    }

    fn apply_temperature(confidence: f64, temp: f64) -> f64 {
        sigmoid(logit(confidence) / temp)
    }

    /// Map a raw confidence to its calibrated probability
    pub fn calibrate(&self, raw_confidence: f64) -> f64 {
        if !self.is_fitted {
            return raw_confidence;
        }
        let calibrated = match self.method {
            CalibrationMethod::PlattScaling => {
                sigmoid(self.platt_a * logit(raw_confidence) + self.platt_b)
            }
            CalibrationMethod::IsotonicRegression => self.isotonic_lookup(raw_confidence),
            CalibrationMethod::TemperatureScaling => {
                Self::apply_temperature(raw_confidence, self.temperature)
            }
            CalibrationMethod::None => raw_confidence,
        };
        calibrated.clamp(0.0, 1.0)
    }

    fn isotonic_lookup(&self, value: f64) -> f64 {
        let (first, last) = match (self.isotonic_table.first(), self.isotonic_table.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return value,
        };

        match self
            .isotonic_table
            .binary_search_by(|entry| entry.0.total_cmp(&value))
        {
            Ok(idx) => self.isotonic_table[idx].1,
            Err(0) => first.1,
            Err(idx) if idx >= self.isotonic_table.len() => last.1,
            Err(idx) => {
                // Linear interpolation between neighbouring blocks
                let (x0, y0) = self.isotonic_table[idx - 1];
                let (x1, y1) = self.isotonic_table[idx];
                let t = (value - x0) / (x1 - x0);
                y0 + t * (y1 - y0)
            }
        }
    }

    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    /// Check if calibrator is fitted
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Fitted (slope, intercept) of the Platt sigmoid
    pub fn platt_parameters(&self) -> (f64, f64) {
        (self.platt_a, self.platt_b)
    }

    /// Number of monotone blocks in the isotonic fit
    pub fn isotonic_breakpoints(&self) -> usize {
        self.isotonic_table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overconfident() -> Vec<(f64, bool)> {
        // Stated 90% but only right 60% of the time
        (0..50).map(|i| (0.9, i % 5 < 3)).collect()
    }

    #[test]
    fn test_calibrator_uncalibrated() {
        let calibrator = ConfidenceCalibrator::new();
        assert_eq!(calibrator.calibrate(0.7), 0.7);
        assert!(!calibrator.is_fitted());
    }

    #[test]
    fn test_fit_requires_data() {
        let mut calibrator = ConfidenceCalibrator::new();
        assert!(calibrator.fit(&[(0.5, true)], CalibrationMethod::PlattScaling).is_err());
        assert!(calibrator
            .fit(&[(f64::NAN, true), (0.5, false)], CalibrationMethod::PlattScaling)
            .is_err());
    }

    #[test]
    fn test_temperature_scaling_softens_overconfidence() {
        let mut calibrator = ConfidenceCalibrator::new();
        calibrator
            .fit(&overconfident(), CalibrationMethod::TemperatureScaling)
            .unwrap();
        assert!(calibrator.temperature() > 1.0);
        let calibrated = calibrator.calibrate(0.9);
        assert!(calibrated < 0.9);
        assert!((calibrated - 0.6).abs() < 0.1);
    }

    #[test]
    fn test_platt_scaling_moves_toward_observed_rate() {
        let mut calibrator = ConfidenceCalibrator::new();
        calibrator
            .fit(&overconfident(), CalibrationMethod::PlattScaling)
            .unwrap();
        let calibrated = calibrator.calibrate(0.9);
        assert!(calibrated < 0.85);
    }

    #[test]
    fn test_isotonic_is_monotone() {
        let mut calibrator = ConfidenceCalibrator::new();
        let predictions: Vec<(f64, bool)> = (0..40)
            .map(|i| {
                let pred = 0.2 + (i % 8) as f64 * 0.1;
                (pred, (i * 7) % 10 < (pred * 10.0) as usize)
            })
            .collect();
        calibrator
            .fit(&predictions, CalibrationMethod::IsotonicRegression)
            .unwrap();
        assert!(calibrator.isotonic_breakpoints() >= 1);

        let mut previous = 0.0;
        for step in 0..=20 {
            let value = calibrator.calibrate(step as f64 * 0.05);
            assert!(value + 1e-12 >= previous);
            assert!((0.0..=1.0).contains(&value));
            previous = value;
        }
    }
}
