//! Period and Ovulation Prediction
//!
//! Builds dated predictions with confidence intervals, uncertainty factors and
//! a discretized probability distribution. Histories with fewer than two cycles
//! get an explicit low-confidence default instead of an error.

use chrono::{Datelike, Duration, NaiveDate};
use cycle_core::stats::normalize;
use cycle_core::{
    ConfidenceIntervals, CycleRecord, EngineConfig, FertilityWindow, ForecastError,
    ModelParameters, Prediction, PredictionBasis, PredictionConfig, PredictionKind, Result,
    UncertaintyFactors, DISTRIBUTION_LEN, DISTRIBUTION_RADIUS,
};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::bayesian::{BayesianInferenceEngine, PosteriorSummary};
use crate::pattern::{CyclePattern, CyclePatternAnalyzer};

/// Everything derived from one pass over the cycle history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleForecast {
    pub pattern: CyclePattern,
    /// None when the history was too short for a posterior prediction
    pub posterior: Option<PosteriorSummary>,
    pub period: Prediction,
    pub ovulation: Prediction,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    config: PredictionConfig,
    analyzer: CyclePatternAnalyzer,
    inference: BayesianInferenceEngine,
}

impl PredictionService {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.prediction.clone(),
            analyzer: CyclePatternAnalyzer::new(config.pattern.clone()),
            inference: BayesianInferenceEngine::new(config.bayesian.clone()),
        }
    }

    pub fn analyzer(&self) -> &CyclePatternAnalyzer {
        &self.analyzer
    }

    pub fn inference(&self) -> &BayesianInferenceEngine {
        &self.inference
    }

    /// Run the full pipeline: pattern, posterior, period and ovulation predictions.
    pub fn forecast(
        &self,
        cycles: &[CycleRecord],
        params: &ModelParameters,
        as_of: NaiveDate,
    ) -> CycleForecast {
        let pattern = self.analyzer.analyze(cycles);

        let (period, posterior) = if cycles.len() < self.config.min_cycles {
            (self.default_period_prediction(params, as_of), None)
        } else {
            let posterior = self.inference.update(params, &pattern.cycle_lengths);
            let period = self.posterior_period_prediction(cycles, params, &pattern, &posterior);
            (period, Some(posterior))
        };

        let ovulation = self.ovulation_from_period(&period);

        CycleForecast {
            pattern,
            posterior,
            period,
            ovulation,
        }
    }

    pub fn predict_next_period(
        &self,
        cycles: &[CycleRecord],
        params: &ModelParameters,
        as_of: NaiveDate,
    ) -> Prediction {
        self.forecast(cycles, params, as_of).period
    }

    /// Derive the ovulation prediction from a period prediction.
    pub fn predict_ovulation(&self, period: &Prediction) -> Result<Prediction> {
        match period.kind {
            PredictionKind::Period { .. } => Ok(self.ovulation_from_period(period)),
            PredictionKind::Ovulation { .. } => Err(ForecastError::InvalidData(
                "ovulation must be derived from a period prediction".to_string(),
            )),
        }
    }

    fn default_period_prediction(&self, params: &ModelParameters, as_of: NaiveDate) -> Prediction {
        tracing::info!(
            "Fewer than {} cycles logged; using default {}-day prediction",
            self.config.min_cycles,
            self.config.default_cycle_length
        );

        let predicted_date = as_of + Duration::days(self.config.default_cycle_length);
        let [p50, p80, p95] = self.config.default_intervals;

        Prediction {
            kind: PredictionKind::Period {
                predicted_end_date: predicted_date
                    + Duration::days(period_days(params.period_length_mean) - 1),
            },
            basis: PredictionBasis::Default,
            predicted_date,
            confidence_intervals: ConfidenceIntervals { p50, p80, p95 },
            uncertainty_factors: UncertaintyFactors::limited_data(),
            probability_distribution: vec![1.0 / DISTRIBUTION_LEN as f64; DISTRIBUTION_LEN],
            explanation: format!(
                "Limited data: log at least {} cycles for a personalized prediction. \
                 Showing a typical {}-day cycle estimate.",
                self.config.min_cycles, self.config.default_cycle_length
            ),
        }
    }

    fn posterior_period_prediction(
        &self,
        cycles: &[CycleRecord],
        params: &ModelParameters,
        pattern: &CyclePattern,
        posterior: &PosteriorSummary,
    ) -> Prediction {
        // Ordered input, but the latest start is what anchors the forecast.
        let last_start = cycles
            .iter()
            .map(|c| c.start_date)
            .max()
            .unwrap_or_default();

        let base_length = posterior.posterior.mean;
        let seasonal_shift = self.seasonal_shift(pattern, params, last_start, base_length);
        let cycle_length = self.cycle_days(base_length + seasonal_shift);
        let predicted_date = last_start + Duration::days(cycle_length);

        let factors = self.uncertainty_factors(cycles.len(), pattern);
        let sd = posterior.posterior.std_dev();
        let multiplier = 1.0 + (1.0 - factors.data_quality) * self.config.quality_penalty;
        let [z50, z80, z95] = self.config.z_multipliers;
        let intervals = ConfidenceIntervals::from_widths(
            z50 * sd * multiplier,
            z80 * sd * multiplier,
            z95 * sd * multiplier,
        );

        let period_length = match pattern.period_length_mean {
            Some(observed) => {
                let w = params.personal_history_weight;
                w * observed + (1.0 - w) * params.period_length_mean
            }
            None => params.period_length_mean,
        };
        let predicted_end_date = predicted_date + Duration::days(period_days(period_length) - 1);

        let mut explanation = format!(
            "Based on {} logged cycles (average {:.1} days, {} pattern), your next period \
             is expected around {} (±{:.0} days with 80% confidence).",
            cycles.len(),
            pattern.mean_cycle_length,
            pattern.trend.as_str(),
            predicted_date.format("%Y-%m-%d"),
            intervals.p80
        );
        if seasonal_shift.abs() >= 0.5 {
            explanation.push_str(&format!(
                " Adjusted by {:+.1} days for your seasonal pattern.",
                seasonal_shift
            ));
        }
        if !pattern.outliers.is_empty() {
            explanation.push_str(&format!(
                " {} unusual cycle(s) widen the uncertainty.",
                pattern.outliers.len()
            ));
        }

        Prediction {
            kind: PredictionKind::Period { predicted_end_date },
            basis: PredictionBasis::Posterior,
            predicted_date,
            confidence_intervals: intervals,
            uncertainty_factors: factors,
            probability_distribution: gaussian_distribution(sd.max(self.config.min_std_dev)),
            explanation,
        }
    }

    fn seasonal_shift(
        &self,
        pattern: &CyclePattern,
        params: &ModelParameters,
        last_start: NaiveDate,
        base_length: f64,
    ) -> f64 {
        match &pattern.seasonality {
            Some(seasonality) if seasonality.has_seasonal_variation => {
                let target = last_start + Duration::days(self.cycle_days(base_length));
                params.seasonal_variation
                    * seasonality.deviation(target.month0())
                    * seasonality.reliability
            }
            _ => 0.0,
        }
    }

    /// Whole-day cycle length, held to the physiological range.
    fn cycle_days(&self, length: f64) -> i64 {
        bounded_days(
            length,
            ModelParameters::CYCLE_LENGTH_RANGE,
            self.config.default_cycle_length as f64,
        )
    }

    fn uncertainty_factors(&self, history_length: usize, pattern: &CyclePattern) -> UncertaintyFactors {
        UncertaintyFactors {
            data_quality: pattern.confidence.clamp(0.0, 1.0),
            history_length,
            cycle_length_variability: (pattern.coefficient_of_variation * 5.0).clamp(0.0, 1.0),
            recent_data_reliability: pattern.recent_reliability.clamp(0.0, 1.0),
            seasonal_patterns: pattern.has_seasonal_variation(),
        }
    }

    fn ovulation_from_period(&self, period: &Prediction) -> Prediction {
        let cfg = &self.config;
        let ovulation_date = period.predicted_date - Duration::days(cfg.luteal_phase_days);
        let fertility_window = FertilityWindow {
            start: ovulation_date - Duration::days(cfg.fertile_days_before),
            end: ovulation_date + Duration::days(cfg.fertile_days_after),
            ovulation_date,
        };

        let ci = period.confidence_intervals;
        let [s50, s80, s95] = cfg.ovulation_interval_scale;
        let [f50, f80, f95] = cfg.ovulation_interval_floor;
        let intervals = ConfidenceIntervals::from_widths(
            (ci.p50 * s50).ceil().max(f50),
            (ci.p80 * s80).ceil().max(f80),
            (ci.p95 * s95).ceil().max(f95),
        );

        let mut factors = period.uncertainty_factors;
        factors.data_quality *= cfg.ovulation_quality_factor;
        factors.recent_data_reliability *= cfg.ovulation_reliability_factor;

        let sigma = (intervals.p80 / cfg.z_multipliers[1]).max(cfg.min_std_dev);
        let weights: Vec<f64> = distribution_offsets()
            .map(|offset| {
                if offset < -cfg.fertile_days_before || offset > cfg.fertile_days_after {
                    0.0
                } else {
                    (-0.5 * (offset as f64 / sigma).powi(2)).exp()
                }
            })
            .collect();

        Prediction {
            kind: PredictionKind::Ovulation { fertility_window },
            basis: period.basis,
            predicted_date: ovulation_date,
            confidence_intervals: intervals,
            uncertainty_factors: factors,
            probability_distribution: normalize(&weights),
            explanation: format!(
                "Ovulation is estimated about {} days before your next period, around {}. \
                 Fertile window: {} to {}.",
                cfg.luteal_phase_days,
                ovulation_date.format("%Y-%m-%d"),
                fertility_window.start.format("%Y-%m-%d"),
                fertility_window.end.format("%Y-%m-%d")
            ),
        }
    }
}

fn period_days(length: f64) -> i64 {
    let (min, _) = ModelParameters::PERIOD_LENGTH_RANGE;
    bounded_days(length, ModelParameters::PERIOD_LENGTH_RANGE, min)
}

fn bounded_days(days: f64, (min, max): (f64, f64), fallback: f64) -> i64 {
    let days = if days.is_finite() { days } else { fallback };
    days.round().clamp(min, max) as i64
}

fn distribution_offsets() -> impl Iterator<Item = i64> {
    -DISTRIBUTION_RADIUS..=DISTRIBUTION_RADIUS
}

/// Gaussian kernel over the day offsets, normalized to sum to one.
fn gaussian_distribution(sd: f64) -> Vec<f64> {
    let weights: Vec<f64> = match Normal::new(0.0, sd) {
        Ok(normal) => distribution_offsets().map(|d| normal.pdf(d as f64)).collect(),
        Err(_) => vec![1.0; DISTRIBUTION_LEN],
    };
    normalize(&weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_cycles() -> Vec<CycleRecord> {
        vec![
            CycleRecord::with_end(date(2024, 1, 1), date(2024, 1, 5)),
            CycleRecord::with_end(date(2024, 1, 29), date(2024, 2, 2)),
            CycleRecord::with_end(date(2024, 2, 27), date(2024, 3, 2)),
        ]
    }

    #[test]
    fn test_end_to_end_next_period() {
        let service = PredictionService::default();
        let prediction =
            service.predict_next_period(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));

        // Posterior mean 28.48 days after 2024-02-27 (leap year)
        assert_eq!(prediction.predicted_date, date(2024, 3, 26));
        assert_eq!(prediction.basis, PredictionBasis::Posterior);
        assert_eq!(prediction.uncertainty_factors.history_length, 3);

        let ci = prediction.confidence_intervals;
        assert!(ci.p95 > ci.p80 && ci.p80 > ci.p50 && ci.p50 >= 0.0);
        assert!(prediction.explanation.contains("3 logged cycles"));
    }

    #[test]
    fn test_period_end_uses_logged_period_length() {
        let service = PredictionService::default();
        let prediction =
            service.predict_next_period(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        match prediction.kind {
            PredictionKind::Period { predicted_end_date } => {
                assert_eq!((predicted_end_date - prediction.predicted_date).num_days(), 4);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_default_prediction_with_one_cycle() {
        let service = PredictionService::default();
        let as_of = date(2024, 5, 1);
        let cycles = vec![CycleRecord::new(date(2024, 4, 20))];
        let prediction = service.predict_next_period(&cycles, &ModelParameters::default(), as_of);

        assert!(prediction.is_default());
        assert_eq!(prediction.predicted_date, date(2024, 5, 29));
        assert_eq!(prediction.uncertainty_factors.history_length, 0);
        assert_relative_eq!(prediction.uncertainty_factors.data_quality, 0.1);
        assert_eq!(
            (
                prediction.confidence_intervals.p50,
                prediction.confidence_intervals.p80,
                prediction.confidence_intervals.p95
            ),
            (3.0, 5.0, 7.0)
        );
        assert_eq!(prediction.probability_distribution.len(), 15);
        assert!(prediction
            .probability_distribution
            .iter()
            .all(|p| (p - 1.0 / 15.0).abs() < 1e-12));
        assert!(prediction.explanation.contains("Limited data"));
    }

    #[test]
    fn test_default_prediction_with_no_cycles() {
        let service = PredictionService::default();
        let forecast = service.forecast(&[], &ModelParameters::default(), date(2024, 5, 1));
        assert!(forecast.posterior.is_none());
        assert!(forecast.period.is_default());
        assert!(forecast.ovulation.is_default());
    }

    #[test]
    fn test_out_of_range_parameters_stay_in_calendar() {
        let service = PredictionService::default();
        let params = ModelParameters {
            cycle_length_mean: 1e12,
            period_length_mean: 1e15,
            ..ModelParameters::default()
        };

        let forecast = service.forecast(&sample_cycles(), &params, date(2024, 3, 5));
        let lead = (forecast.period.predicted_date - date(2024, 2, 27)).num_days();
        assert!((15..=50).contains(&lead), "lead {}", lead);
        match forecast.period.kind {
            PredictionKind::Period { predicted_end_date } => {
                assert!((predicted_end_date - forecast.period.predicted_date).num_days() <= 14);
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let fallback = service.forecast(&[], &params, date(2024, 5, 1));
        match fallback.period.kind {
            PredictionKind::Period { predicted_end_date } => {
                assert_eq!(predicted_end_date, date(2024, 5, 29) + Duration::days(14));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_distributions_sum_to_one_for_any_variance() {
        let service = PredictionService::default();
        for variance in [0.0001, 0.5, 4.0, 16.0, 90.0] {
            let params = ModelParameters {
                cycle_length_variance: variance,
                ..ModelParameters::default()
            };
            let forecast = service.forecast(&sample_cycles(), &params, date(2024, 3, 5));
            for prediction in [&forecast.period, &forecast.ovulation] {
                let total: f64 = prediction.probability_distribution.iter().sum();
                assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
                assert!(prediction.probability_distribution.iter().all(|p| *p >= 0.0));
                assert!(prediction.confidence_intervals.is_ordered());
            }
        }
    }

    #[test]
    fn test_period_distribution_peaks_at_predicted_date() {
        let service = PredictionService::default();
        let prediction =
            service.predict_next_period(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        let dist = &prediction.probability_distribution;
        let peak = dist
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, DISTRIBUTION_RADIUS as usize);
        assert_relative_eq!(dist[6], dist[8], epsilon = 1e-12);
    }

    #[test]
    fn test_ovulation_derived_from_period() {
        let service = PredictionService::default();
        let forecast = service.forecast(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        let period = &forecast.period;
        let ovulation = &forecast.ovulation;

        assert_eq!(
            ovulation.predicted_date,
            period.predicted_date - Duration::days(14)
        );
        let window = match ovulation.kind {
            PredictionKind::Ovulation { fertility_window } => fertility_window,
            other => panic!("unexpected kind {:?}", other),
        };
        assert_eq!(window.start, ovulation.predicted_date - Duration::days(5));
        assert_eq!(window.end, ovulation.predicted_date + Duration::days(1));

        let pci = period.confidence_intervals;
        let oci = ovulation.confidence_intervals;
        assert!(oci.p50 >= (pci.p50 * 1.2).ceil().max(1.0));
        assert!(oci.p80 >= (pci.p80 * 1.3).ceil().max(2.0));
        assert!(oci.p95 >= (pci.p95 * 1.5).ceil().max(3.0));

        assert_relative_eq!(
            ovulation.uncertainty_factors.data_quality,
            period.uncertainty_factors.data_quality * 0.9
        );
        assert_relative_eq!(
            ovulation.uncertainty_factors.recent_data_reliability,
            period.uncertainty_factors.recent_data_reliability * 0.85
        );
    }

    #[test]
    fn test_ovulation_mass_restricted_to_fertile_window() {
        let service = PredictionService::default();
        let forecast = service.forecast(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        let ovulation = &forecast.ovulation;
        let window = match ovulation.kind {
            PredictionKind::Ovulation { fertility_window } => fertility_window,
            other => panic!("unexpected kind {:?}", other),
        };

        for (i, p) in ovulation.probability_distribution.iter().enumerate() {
            let day = ovulation.bucket_date(i);
            if window.contains(day) {
                assert!(*p > 0.0);
            } else {
                assert_eq!(*p, 0.0);
            }
        }
        let peak = ovulation
            .probability_distribution
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| ovulation.bucket_date(i))
            .unwrap();
        assert_eq!(peak, ovulation.predicted_date);
    }

    #[test]
    fn test_predict_ovulation_rejects_ovulation_input() {
        let service = PredictionService::default();
        let forecast = service.forecast(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        assert!(service.predict_ovulation(&forecast.period).is_ok());
        assert!(matches!(
            service.predict_ovulation(&forecast.ovulation),
            Err(ForecastError::InvalidData(_))
        ));
    }

    #[test]
    fn test_prediction_json_round_trip() {
        let service = PredictionService::default();
        let prediction =
            service.predict_next_period(&sample_cycles(), &ModelParameters::default(), date(2024, 3, 5));
        let json = serde_json::to_string(&prediction).unwrap();
        let back: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predicted_date, prediction.predicted_date);
        assert_eq!(back.confidence_intervals, prediction.confidence_intervals);
    }
}
