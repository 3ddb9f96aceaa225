//! Prediction Accuracy Tracking
//!
//! Turns predictions plus ground truth into accuracy records, aggregates the
//! retained history into scoring metrics, and explains the result in plain text.

use chrono::NaiveDate;
use cycle_core::{
    recent_records, AccuracyConfig, AccuracyRecord, Prediction, Result, TrackedEvent,
};
use serde::{Deserialize, Serialize};

use crate::scoring::{self, ReliabilityBin};

/// Aggregated scores over the retained accuracy history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub brier_score: f64,
    pub negative_log_likelihood: f64,
    pub calibration_score: f64,
    pub accuracy_history: Vec<AccuracyRecord>,
    pub sample_size: usize,
    /// Fraction of records that were accurate
    pub accuracy_rate: f64,
    /// Mean |error| in days over records with a known actual date
    pub mean_absolute_error_days: Option<f64>,
    pub reliability_bins: Vec<ReliabilityBin>,
}

impl AccuracyMetrics {
    /// Metrics reported before any ground truth exists
    pub fn empty() -> Self {
        Self {
            brier_score: 0.5,
            negative_log_likelihood: 1.0,
            calibration_score: 0.0,
            accuracy_history: Vec::new(),
            sample_size: 0,
            accuracy_rate: 0.0,
            mean_absolute_error_days: None,
            reliability_bins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceRating {
    Excellent,
    Good,
    NeedsImprovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationQuality {
    WellCalibrated,
    PoorlyCalibrated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyInsights {
    pub overall_performance: PerformanceRating,
    pub calibration_quality: CalibrationQuality,
    pub summary: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyComparison {
    /// older - recent; positive means the recent period scored better
    pub brier_score_improvement: f64,
    pub calibration_improvement: f64,
    pub accuracy_rate_change: f64,
    pub significant_improvement: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AccuracyMetricsCalculator {
    config: AccuracyConfig,
}

impl AccuracyMetricsCalculator {
    pub fn new(config: AccuracyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AccuracyConfig {
        &self.config
    }

    pub fn brier_score(&self, probabilities: &[f64], outcomes: &[bool]) -> Result<f64> {
        scoring::brier_score(probabilities, outcomes)
    }

    pub fn negative_log_likelihood(&self, probabilities: &[f64], outcomes: &[bool]) -> Result<f64> {
        scoring::negative_log_likelihood(probabilities, outcomes, self.config.probability_epsilon)
    }

    pub fn calibration_score(&self, probabilities: &[f64], outcomes: &[bool]) -> Result<f64> {
        scoring::calibration_error(probabilities, outcomes, self.config.calibration_bins)
    }

    pub fn track_period_accuracy(&self, prediction: &Prediction, actual: NaiveDate) -> AccuracyRecord {
        self.track(prediction, Some(actual))
    }

    pub fn track_ovulation_accuracy(
        &self,
        prediction: &Prediction,
        actual: Option<NaiveDate>,
    ) -> AccuracyRecord {
        self.track(prediction, actual)
    }

    /// Score one prediction against its ground truth, if known.
    pub fn track(&self, prediction: &Prediction, actual: Option<NaiveDate>) -> AccuracyRecord {
        let confidence_level = prediction.mass_within(self.config.accuracy_threshold_days);

        match actual {
            Some(actual_date) => {
                let error_days = (actual_date - prediction.predicted_date).num_days().abs();
                let was_accurate = error_days <= self.config.accuracy_threshold_days;
                let outcome = if was_accurate { 1.0 } else { 0.0 };
                AccuracyRecord {
                    event: prediction.event(),
                    prediction_date: prediction.predicted_date,
                    actual_date: Some(actual_date),
                    confidence_level,
                    was_accurate,
                    error_days: Some(error_days),
                    brier_score: (confidence_level - outcome).powi(2).clamp(0.0, 1.0),
                }
            }
            None => {
                tracing::debug!(
                    "No actual date for {:?} prediction on {}; scoring as unverifiable",
                    prediction.event(),
                    prediction.predicted_date
                );
                AccuracyRecord {
                    event: prediction.event(),
                    prediction_date: prediction.predicted_date,
                    actual_date: None,
                    confidence_level,
                    was_accurate: false,
                    error_days: None,
                    brier_score: 1.0,
                }
            }
        }
    }

    /// Aggregate the most recent records into scoring metrics.
    pub fn calculate_accuracy_metrics(&self, history: &[AccuracyRecord]) -> AccuracyMetrics {
        let retained = recent_records(history);
        if retained.is_empty() {
            return AccuracyMetrics::empty();
        }

        let probabilities: Vec<f64> = retained
            .iter()
            .map(|r| sanitize_probability(r.confidence_level))
            .collect();
        let outcomes: Vec<bool> = retained.iter().map(|r| r.was_accurate).collect();
        let n = retained.len() as f64;

        let brier_score = retained
            .iter()
            .map(|r| sanitize_probability(r.brier_score))
            .sum::<f64>()
            / n;
        let negative_log_likelihood = self
            .negative_log_likelihood(&probabilities, &outcomes)
            .unwrap_or(1.0);
        let report = scoring::calibration_report(&probabilities, &outcomes, self.config.calibration_bins);
        let (calibration_score, reliability_bins) = match report {
            Ok(report) => (report.ece, report.reliability_bins),
            Err(_) => (0.0, Vec::new()),
        };

        let errors: Vec<f64> = retained
            .iter()
            .filter_map(|r| r.error_days)
            .map(|e| e.abs() as f64)
            .collect();
        let mean_absolute_error_days = if errors.is_empty() {
            None
        } else {
            Some(errors.iter().sum::<f64>() / errors.len() as f64)
        };

        AccuracyMetrics {
            brier_score,
            negative_log_likelihood,
            calibration_score,
            accuracy_history: retained.to_vec(),
            sample_size: retained.len(),
            accuracy_rate: outcomes.iter().filter(|o| **o).count() as f64 / n,
            mean_absolute_error_days,
            reliability_bins,
        }
    }

    /// Metrics restricted to one kind of prediction.
    pub fn metrics_for_event(&self, history: &[AccuracyRecord], event: TrackedEvent) -> AccuracyMetrics {
        let filtered: Vec<AccuracyRecord> = recent_records(history)
            .iter()
            .filter(|r| r.event == event)
            .cloned()
            .collect();
        self.calculate_accuracy_metrics(&filtered)
    }

    pub fn generate_accuracy_insights(&self, metrics: &AccuracyMetrics) -> AccuracyInsights {
        let overall_performance = if metrics.brier_score < self.config.excellent_brier {
            PerformanceRating::Excellent
        } else if metrics.brier_score < self.config.good_brier {
            PerformanceRating::Good
        } else {
            PerformanceRating::NeedsImprovement
        };

        let calibration_quality = if metrics.calibration_score < self.config.well_calibrated_threshold {
            CalibrationQuality::WellCalibrated
        } else {
            CalibrationQuality::PoorlyCalibrated
        };

        let mut recommendations = Vec::new();

        if overall_performance == PerformanceRating::NeedsImprovement {
            if metrics.sample_size < 6 {
                recommendations.push(
                    "Keep logging period start dates: a few more cycles will sharpen predictions."
                        .to_string(),
                );
            }
            if metrics.accuracy_rate < 0.5 {
                recommendations.push(
                    "Predictions missed more often than they hit. Logging symptoms and period end \
                     dates consistently helps the model separate noise from real changes."
                        .to_string(),
                );
            }
            if let Some(mae) = metrics.mean_absolute_error_days {
                if mae > 3.0 {
                    recommendations.push(format!(
                        "Predictions are off by {:.1} days on average; plan with a wider buffer \
                         until accuracy improves.",
                        mae
                    ));
                }
            }
        }

        if calibration_quality == CalibrationQuality::PoorlyCalibrated {
            recommendations.push(
                "Stated confidence does not match observed accuracy. Run a recalibration to \
                 realign the model's uncertainty."
                    .to_string(),
            );
        }

        let summary = if metrics.sample_size == 0 {
            "No verified predictions yet.".to_string()
        } else {
            format!(
                "{} of {} recent predictions were within {} days (Brier {:.3}, calibration error {:.3}).",
                (metrics.accuracy_rate * metrics.sample_size as f64).round() as usize,
                metrics.sample_size,
                self.config.accuracy_threshold_days,
                metrics.brier_score,
                metrics.calibration_score
            )
        };

        AccuracyInsights {
            overall_performance,
            calibration_quality,
            summary,
            recommendations,
        }
    }

    pub fn compare_accuracy_periods(
        &self,
        recent: &AccuracyMetrics,
        older: &AccuracyMetrics,
    ) -> AccuracyComparison {
        let brier_score_improvement = older.brier_score - recent.brier_score;
        AccuracyComparison {
            brier_score_improvement,
            calibration_improvement: older.calibration_score - recent.calibration_score,
            accuracy_rate_change: recent.accuracy_rate - older.accuracy_rate,
            significant_improvement: brier_score_improvement > self.config.significant_improvement,
        }
    }
}

fn sanitize_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use cycle_core::{
        ConfidenceIntervals, FertilityWindow, PredictionBasis, PredictionKind, UncertaintyFactors,
        DISTRIBUTION_LEN,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period_prediction(predicted: NaiveDate) -> Prediction {
        // 80% of the mass within ±2 days
        let mut dist = vec![0.0; DISTRIBUTION_LEN];
        for (i, p) in dist.iter_mut().enumerate() {
            let offset = i as i64 - 7;
            *p = if offset.abs() <= 2 { 0.16 } else { 0.02 };
        }
        Prediction {
            kind: PredictionKind::Period {
                predicted_end_date: predicted + Duration::days(4),
            },
            basis: PredictionBasis::Posterior,
            predicted_date: predicted,
            confidence_intervals: ConfidenceIntervals::from_widths(1.0, 2.0, 3.0),
            uncertainty_factors: UncertaintyFactors::limited_data(),
            probability_distribution: dist,
            explanation: String::new(),
        }
    }

    fn ovulation_prediction(predicted: NaiveDate) -> Prediction {
        let mut prediction = period_prediction(predicted);
        prediction.kind = PredictionKind::Ovulation {
            fertility_window: FertilityWindow {
                start: predicted - Duration::days(5),
                end: predicted + Duration::days(1),
                ovulation_date: predicted,
            },
        };
        prediction
    }

    fn record(confidence: f64, accurate: bool, error: i64) -> AccuracyRecord {
        AccuracyRecord {
            event: TrackedEvent::Period,
            prediction_date: date(2024, 1, 1),
            actual_date: Some(date(2024, 1, 1) + Duration::days(error)),
            confidence_level: confidence,
            was_accurate: accurate,
            error_days: Some(error),
            brier_score: (confidence - if accurate { 1.0 } else { 0.0 }).powi(2),
        }
    }

    #[test]
    fn test_track_period_accurate() {
        let calc = AccuracyMetricsCalculator::default();
        let prediction = period_prediction(date(2024, 3, 27));
        let rec = calc.track_period_accuracy(&prediction, date(2024, 3, 29));

        assert!(rec.was_accurate);
        assert_eq!(rec.error_days, Some(2));
        assert_eq!(rec.event, TrackedEvent::Period);
        assert_relative_eq!(rec.confidence_level, 0.8, epsilon = 1e-12);
        assert_relative_eq!(rec.brier_score, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_track_period_missed() {
        let calc = AccuracyMetricsCalculator::default();
        let prediction = period_prediction(date(2024, 3, 27));
        let rec = calc.track_period_accuracy(&prediction, date(2024, 3, 22));

        assert!(!rec.was_accurate);
        assert_eq!(rec.error_days, Some(5));
        assert_relative_eq!(rec.brier_score, 0.64, epsilon = 1e-12);
    }

    #[test]
    fn test_track_ovulation_unknown_actual() {
        let calc = AccuracyMetricsCalculator::default();
        let prediction = ovulation_prediction(date(2024, 3, 13));
        let rec = calc.track_ovulation_accuracy(&prediction, None);

        assert!(!rec.was_accurate);
        assert_eq!(rec.error_days, None);
        assert_eq!(rec.brier_score, 1.0);
        assert_eq!(rec.event, TrackedEvent::Ovulation);
    }

    #[test]
    fn test_empty_history_metrics() {
        let calc = AccuracyMetricsCalculator::default();
        let metrics = calc.calculate_accuracy_metrics(&[]);
        assert_eq!(metrics.brier_score, 0.5);
        assert_eq!(metrics.negative_log_likelihood, 1.0);
        assert_eq!(metrics.calibration_score, 0.0);
        assert!(metrics.accuracy_history.is_empty());
    }

    #[test]
    fn test_history_capped_at_most_recent_hundred() {
        let calc = AccuracyMetricsCalculator::default();
        let mut history: Vec<AccuracyRecord> = (0..20).map(|_| record(0.9, false, 6)).collect();
        history.extend((0..100).map(|_| record(0.9, true, 0)));

        let metrics = calc.calculate_accuracy_metrics(&history);
        assert_eq!(metrics.accuracy_history.len(), 100);
        assert_eq!(metrics.sample_size, 100);
        assert_relative_eq!(metrics.accuracy_rate, 1.0);
        assert_relative_eq!(metrics.brier_score, 0.01, epsilon = 1e-12);
        assert_eq!(metrics.mean_absolute_error_days, Some(0.0));
    }

    #[test]
    fn test_metrics_nll_finite_for_extreme_confidence() {
        let calc = AccuracyMetricsCalculator::default();
        let history = vec![record(1.0, false, 5), record(0.0, true, 0)];
        let metrics = calc.calculate_accuracy_metrics(&history);
        assert!(metrics.negative_log_likelihood.is_finite());
        assert!(metrics.negative_log_likelihood >= 0.0);
    }

    #[test]
    fn test_insights_for_good_model() {
        let calc = AccuracyMetricsCalculator::default();
        let history: Vec<_> = (0..20).map(|i| record(0.95, i != 0, 1)).collect();
        let metrics = calc.calculate_accuracy_metrics(&history);
        let insights = calc.generate_accuracy_insights(&metrics);
        assert_eq!(insights.overall_performance, PerformanceRating::Excellent);
        assert_eq!(insights.calibration_quality, CalibrationQuality::WellCalibrated);
        assert!(insights.recommendations.is_empty());
    }

    #[test]
    fn test_insights_for_poor_model() {
        let calc = AccuracyMetricsCalculator::default();
        let history: Vec<_> = (0..4).map(|_| record(0.9, false, 5)).collect();
        let metrics = calc.calculate_accuracy_metrics(&history);
        let insights = calc.generate_accuracy_insights(&metrics);
        assert_eq!(insights.overall_performance, PerformanceRating::NeedsImprovement);
        assert_eq!(insights.calibration_quality, CalibrationQuality::PoorlyCalibrated);
        assert!(insights.recommendations.iter().any(|r| r.contains("logging")));
        assert!(insights.recommendations.iter().any(|r| r.contains("recalibration")));
    }

    #[test]
    fn test_compare_periods() {
        let calc = AccuracyMetricsCalculator::default();
        let older = calc.calculate_accuracy_metrics(&[record(0.8, false, 4), record(0.8, false, 5)]);
        let recent = calc.calculate_accuracy_metrics(&[record(0.8, true, 1), record(0.8, true, 0)]);

        let comparison = calc.compare_accuracy_periods(&recent, &older);
        assert_relative_eq!(comparison.brier_score_improvement, 0.64 - 0.04, epsilon = 1e-12);
        assert!(comparison.significant_improvement);

        let flat = calc.compare_accuracy_periods(&recent, &recent);
        assert_eq!(flat.brier_score_improvement, 0.0);
        assert!(!flat.significant_improvement);
    }

    #[test]
    fn test_metrics_for_event_filters() {
        let calc = AccuracyMetricsCalculator::default();
        let mut ovulation = record(0.5, false, 3);
        ovulation.event = TrackedEvent::Ovulation;
        let history = vec![record(0.8, true, 0), ovulation];

        let period_only = calc.metrics_for_event(&history, TrackedEvent::Period);
        assert_eq!(period_only.sample_size, 1);
        assert_relative_eq!(period_only.accuracy_rate, 1.0);
    }
}
