//! Model Recalibration
//!
//! Decides when the stated confidence of past predictions has drifted away from
//! their observed accuracy, and produces adjusted model parameters when it has.
//! Failures are reported through `RecalibrationResult::success`, never as errors.

use chrono::NaiveDate;
use cycle_core::stats::mean;
use cycle_core::{recent_records, AccuracyConfig, AccuracyRecord, ModelParameters, RecalibrationConfig};
use serde::{Deserialize, Serialize};

use crate::calibrator::{CalibrationMethod, ConfidenceCalibrator};
use crate::scoring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationStrategy {
    TemperatureScaling,
    PlattScaling,
    IsotonicRegression,
    BayesianUpdate,
    None,
}

impl RecalibrationStrategy {
    /// Share of the measured miscalibration this strategy is expected to remove
    fn efficacy(self) -> f64 {
        match self {
            Self::TemperatureScaling => 0.7,
            Self::PlattScaling => 0.6,
            Self::IsotonicRegression => 0.8,
            Self::BayesianUpdate => 0.5,
            Self::None => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureScaling => "temperature_scaling",
            Self::PlattScaling => "platt_scaling",
            Self::IsotonicRegression => "isotonic_regression",
            Self::BayesianUpdate => "bayesian_update",
            Self::None => "none",
        }
    }
}

/// Fitted values of the strategy that was applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyAdjustment {
    TemperatureScaling { temperature: f64 },
    PlattScaling { slope: f64, intercept: f64 },
    IsotonicRegression { breakpoints: usize },
    BayesianUpdate { error_growth_days: f64, shrinkage: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationUrgency {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationAssessment {
    pub needs_recalibration: bool,
    pub urgency: RecalibrationUrgency,
    pub recommended_strategy: RecalibrationStrategy,
    pub calibration_error: f64,
    /// Mean confidence minus accuracy rate; positive means overconfident
    pub systematic_bias: f64,
    /// Growth of mean absolute error (days) from the older to the newer half
    pub recent_error_growth: f64,
    pub sample_size: usize,
    pub estimated_improvement: f64,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalibrationResult {
    pub success: bool,
    pub strategy: RecalibrationStrategy,
    pub adjustment: Option<StrategyAdjustment>,
    pub previous_parameters: ModelParameters,
    pub new_parameters: ModelParameters,
    pub before_ece: f64,
    pub after_ece: f64,
    /// Relative ECE reduction, 0 when nothing improved
    pub improvement_significance: f64,
    pub recommendations: Vec<String>,
}

impl RecalibrationResult {
    fn unchanged(
        strategy: RecalibrationStrategy,
        params: &ModelParameters,
        ece: f64,
        success: bool,
        recommendation: String,
    ) -> Self {
        Self {
            success,
            strategy,
            adjustment: None,
            previous_parameters: *params,
            new_parameters: *params,
            before_ece: ece,
            after_ece: ece,
            improvement_significance: 0.0,
            recommendations: vec![recommendation],
        }
    }
}

/// Calibration state of a history, shared by assessment and execution
struct CalibrationSnapshot {
    confidences: Vec<f64>,
    outcomes: Vec<bool>,
    ece: f64,
    bias: f64,
    accuracy_rate: f64,
    error_growth: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RecalibrationEngine {
    config: RecalibrationConfig,
    accuracy: AccuracyConfig,
}

impl RecalibrationEngine {
    pub fn new(config: RecalibrationConfig, accuracy: AccuracyConfig) -> Self {
        Self { config, accuracy }
    }

    pub fn config(&self) -> &RecalibrationConfig {
        &self.config
    }

    pub fn assess_recalibration_need(
        &self,
        history: &[AccuracyRecord],
        params: &ModelParameters,
        last_recalibrated_at: Option<NaiveDate>,
        as_of: NaiveDate,
    ) -> CalibrationAssessment {
        let retained = recent_records(history);
        let sample_size = retained.len();

        if sample_size < self.config.min_history {
            return Self::not_needed(
                sample_size,
                format!(
                    "Insufficient data: {} verified predictions, at least {} required",
                    sample_size, self.config.min_history
                ),
            );
        }

        if let Some(last) = last_recalibrated_at {
            let elapsed = (as_of - last).num_days();
            if elapsed < self.config.cooldown_days {
                return Self::not_needed(
                    sample_size,
                    format!(
                        "Cooldown: last recalibration was {} days ago, minimum spacing is {} days",
                        elapsed, self.config.cooldown_days
                    ),
                );
            }
        }

        let snapshot = match self.snapshot(retained) {
            Some(snapshot) => snapshot,
            None => {
                return Self::not_needed(
                    sample_size,
                    "Insufficient data: accuracy history could not be scored".to_string(),
                )
            }
        };

        let magnitude = snapshot.ece.max(snapshot.bias.abs());
        let needs_recalibration = snapshot.ece > self.config.ece_threshold
            || snapshot.bias.abs() > self.config.bias_threshold;

        let urgency = if magnitude > 0.3 {
            RecalibrationUrgency::Critical
        } else if magnitude > 0.2 {
            RecalibrationUrgency::High
        } else if magnitude > 0.15 {
            RecalibrationUrgency::Medium
        } else {
            RecalibrationUrgency::Low
        };

        let recommended_strategy = if needs_recalibration {
            self.select_strategy(&snapshot, sample_size)
        } else {
            RecalibrationStrategy::None
        };

        let reasoning = if needs_recalibration {
            let direction = if snapshot.bias > 0.0 {
                "overconfident"
            } else {
                "underconfident"
            };
            format!(
                "Calibration error {:.3} with {} bias of {:.3} across {} predictions; {} recommended",
                snapshot.ece,
                direction,
                snapshot.bias.abs(),
                sample_size,
                recommended_strategy.as_str()
            )
        } else {
            format!(
                "Calibration error {:.3} and bias {:.3} are within tolerance",
                snapshot.ece, snapshot.bias
            )
        };

        if needs_recalibration {
            tracing::info!(
                "Recalibration needed: ece={:.3}, bias={:.3}, urgency={:?}, strategy={}, learning_rate={:.3}",
                snapshot.ece,
                snapshot.bias,
                urgency,
                recommended_strategy.as_str(),
                params.adaptive_learning_rate
            );
        }

        CalibrationAssessment {
            needs_recalibration,
            urgency,
            recommended_strategy,
            calibration_error: snapshot.ece,
            systematic_bias: snapshot.bias,
            recent_error_growth: snapshot.error_growth,
            sample_size,
            estimated_improvement: magnitude * recommended_strategy.efficacy(),
            confidence: sample_size as f64 / (sample_size as f64 + 20.0),
            reasoning,
        }
    }

    /// Fit the requested (or automatically selected) strategy and derive new parameters.
    pub fn perform_recalibration(
        &self,
        history: &[AccuracyRecord],
        params: &ModelParameters,
        strategy: Option<RecalibrationStrategy>,
    ) -> RecalibrationResult {
        let retained = recent_records(history);
        let requested = strategy.unwrap_or(RecalibrationStrategy::None);

        if retained.len() < self.config.min_history {
            return RecalibrationResult::unchanged(
                requested,
                params,
                0.0,
                false,
                format!(
                    "Need at least {} verified predictions before recalibrating (have {}). \
                     Keep logging cycles.",
                    self.config.min_history,
                    retained.len()
                ),
            );
        }

        let snapshot = match self.snapshot(retained) {
            Some(snapshot) => snapshot,
            None => {
                return RecalibrationResult::unchanged(
                    requested,
                    params,
                    0.0,
                    false,
                    "Accuracy history could not be scored; parameters unchanged".to_string(),
                )
            }
        };

        let strategy = strategy.unwrap_or_else(|| {
            if snapshot.ece > self.config.ece_threshold
                || snapshot.bias.abs() > self.config.bias_threshold
            {
                self.select_strategy(&snapshot, retained.len())
            } else {
                RecalibrationStrategy::None
            }
        });

        if strategy == RecalibrationStrategy::None {
            return RecalibrationResult::unchanged(
                strategy,
                params,
                snapshot.ece,
                true,
                "Calibration is within tolerance; no adjustment applied".to_string(),
            );
        }

        let (mapped, adjustment) = match self.fit_map(strategy, &snapshot, retained.len()) {
            Ok(fitted) => fitted,
            Err(e) => {
                tracing::warn!("Recalibration with {} failed: {}", strategy.as_str(), e);
                return RecalibrationResult::unchanged(
                    strategy,
                    params,
                    snapshot.ece,
                    false,
                    format!("Could not fit {}: {}", strategy.as_str(), e),
                );
            }
        };

        let after_ece = scoring::calibration_error(&mapped, &snapshot.outcomes, self.accuracy.calibration_bins)
            .unwrap_or(snapshot.ece);

        if after_ece >= snapshot.ece {
            tracing::debug!(
                "{} did not reduce calibration error ({:.3} -> {:.3}); keeping identity map",
                strategy.as_str(),
                snapshot.ece,
                after_ece
            );
            return RecalibrationResult::unchanged(
                strategy,
                params,
                snapshot.ece,
                false,
                format!(
                    "{} did not reduce calibration error; parameters unchanged",
                    strategy.as_str()
                ),
            );
        }

        let improvement = if snapshot.ece > 0.0 {
            (snapshot.ece - after_ece) / snapshot.ece
        } else {
            0.0
        };
        let new_parameters = self.adjust_parameters(params, &adjustment, improvement);

        tracing::info!(
            "Recalibrated with {}: ece {:.3} -> {:.3}",
            strategy.as_str(),
            snapshot.ece,
            after_ece
        );

        RecalibrationResult {
            success: true,
            strategy,
            adjustment: Some(adjustment),
            previous_parameters: *params,
            new_parameters,
            before_ece: snapshot.ece,
            after_ece,
            improvement_significance: improvement,
            recommendations: Self::recommendations(&adjustment, &snapshot),
        }
    }

    fn not_needed(sample_size: usize, reasoning: String) -> CalibrationAssessment {
        CalibrationAssessment {
            needs_recalibration: false,
            urgency: RecalibrationUrgency::Low,
            recommended_strategy: RecalibrationStrategy::None,
            calibration_error: 0.0,
            systematic_bias: 0.0,
            recent_error_growth: 0.0,
            sample_size,
            estimated_improvement: 0.0,
            confidence: 0.0,
            reasoning,
        }
    }

    fn snapshot(&self, records: &[AccuracyRecord]) -> Option<CalibrationSnapshot> {
        let confidences: Vec<f64> = records
            .iter()
            .map(|r| {
                if r.confidence_level.is_finite() {
                    r.confidence_level.clamp(0.0, 1.0)
                } else {
                    0.5
                }
            })
            .collect();
        let outcomes: Vec<bool> = records.iter().map(|r| r.was_accurate).collect();
        let ece = scoring::calibration_error(&confidences, &outcomes, self.accuracy.calibration_bins).ok()?;

        let accuracy_rate = outcomes.iter().filter(|o| **o).count() as f64 / outcomes.len() as f64;
        let bias = mean(&confidences) - accuracy_rate;

        Some(CalibrationSnapshot {
            confidences,
            outcomes,
            ece,
            bias,
            accuracy_rate,
            error_growth: error_growth(records),
        })
    }

    fn select_strategy(&self, snapshot: &CalibrationSnapshot, sample_size: usize) -> RecalibrationStrategy {
        if snapshot.error_growth > self.config.error_growth_threshold_days {
            RecalibrationStrategy::BayesianUpdate
        } else if snapshot.bias.abs() >= 0.8 * snapshot.ece {
            if snapshot.bias.abs() > 0.2 {
                RecalibrationStrategy::TemperatureScaling
            } else {
                RecalibrationStrategy::PlattScaling
            }
        } else if sample_size < self.config.isotonic_min_history {
            RecalibrationStrategy::PlattScaling
        } else {
            RecalibrationStrategy::IsotonicRegression
        }
    }

    /// Fitted confidences under the strategy's map, plus its fitted values.
    fn fit_map(
        &self,
        strategy: RecalibrationStrategy,
        snapshot: &CalibrationSnapshot,
        sample_size: usize,
    ) -> anyhow::Result<(Vec<f64>, StrategyAdjustment)> {
        let pairs: Vec<(f64, bool)> = snapshot
            .confidences
            .iter()
            .copied()
            .zip(snapshot.outcomes.iter().copied())
            .collect();

        let method = match strategy {
            RecalibrationStrategy::TemperatureScaling => CalibrationMethod::TemperatureScaling,
            RecalibrationStrategy::PlattScaling => CalibrationMethod::PlattScaling,
            RecalibrationStrategy::IsotonicRegression => CalibrationMethod::IsotonicRegression,
            RecalibrationStrategy::BayesianUpdate => {
                // Shrink every confidence toward the observed accuracy rate
                let n = sample_size as f64;
                let shrinkage = n / (n + self.config.min_history as f64);
                let mapped = snapshot
                    .confidences
                    .iter()
                    .map(|c| c + shrinkage * (snapshot.accuracy_rate - c))
                    .collect();
                return Ok((
                    mapped,
                    StrategyAdjustment::BayesianUpdate {
                        error_growth_days: snapshot.error_growth,
                        shrinkage,
                    },
                ));
            }
            RecalibrationStrategy::None => anyhow::bail!("no strategy selected"),
        };

        let mut calibrator = ConfidenceCalibrator::new();
        calibrator.fit(&pairs, method)?;
        let mapped = snapshot.confidences.iter().map(|c| calibrator.calibrate(*c)).collect();

        let adjustment = match method {
            CalibrationMethod::TemperatureScaling => StrategyAdjustment::TemperatureScaling {
                temperature: calibrator.temperature(),
            },
            CalibrationMethod::PlattScaling => {
                let (slope, intercept) = calibrator.platt_parameters();
                StrategyAdjustment::PlattScaling { slope, intercept }
            }
            CalibrationMethod::IsotonicRegression => StrategyAdjustment::IsotonicRegression {
                breakpoints: calibrator.isotonic_breakpoints(),
            },
            CalibrationMethod::None => anyhow::bail!("no calibration method fitted"),
        };

        Ok((mapped, adjustment))
    }

    fn adjust_parameters(
        &self,
        params: &ModelParameters,
        adjustment: &StrategyAdjustment,
        improvement: f64,
    ) -> ModelParameters {
        let mut next = *params;
        match *adjustment {
            StrategyAdjustment::TemperatureScaling { temperature } => {
                next.cycle_length_variance = self.bounded_step(
                    params.cycle_length_variance,
                    params.cycle_length_variance * temperature * temperature,
                );
            }
            StrategyAdjustment::PlattScaling { slope, .. } => {
                // A slope below one means confidence should be damped
                next.personal_history_weight = self.bounded_step(
                    params.personal_history_weight,
                    params.personal_history_weight * slope,
                );
            }
            StrategyAdjustment::IsotonicRegression { .. } => {
                next.adaptive_learning_rate = self.bounded_step(
                    params.adaptive_learning_rate,
                    params.adaptive_learning_rate * (1.0 + improvement),
                );
            }
            StrategyAdjustment::BayesianUpdate {
                error_growth_days, ..
            } => {
                let inflation = 1.0 + error_growth_days.max(0.0) * params.adaptive_learning_rate;
                next.cycle_length_variance = self.bounded_step(
                    params.cycle_length_variance,
                    params.cycle_length_variance * inflation,
                );
            }
        }
        next.clamped()
    }

    fn bounded_step(&self, current: f64, proposed: f64) -> f64 {
        if !proposed.is_finite() {
            return current;
        }
        let limit = current.abs() * self.config.max_step_fraction;
        proposed.clamp(current - limit, current + limit)
    }

    fn recommendations(adjustment: &StrategyAdjustment, snapshot: &CalibrationSnapshot) -> Vec<String> {
        let mut recommendations = Vec::new();
        match adjustment {
            StrategyAdjustment::TemperatureScaling { temperature } if *temperature > 1.0 => {
                recommendations.push(
                    "Predictions were overconfident; intervals have been widened.".to_string(),
                );
            }
            StrategyAdjustment::TemperatureScaling { .. } => {
                recommendations.push(
                    "Predictions were underconfident; intervals have been tightened.".to_string(),
                );
            }
            StrategyAdjustment::PlattScaling { .. } => {
                recommendations.push(
                    "Adjusted how much personal history is trusted relative to population norms."
                        .to_string(),
                );
            }
            StrategyAdjustment::IsotonicRegression { .. } => {
                recommendations.push(
                    "Confidence errors were uneven across levels; the model will adapt faster."
                        .to_string(),
                );
            }
            StrategyAdjustment::BayesianUpdate { .. } => {
                recommendations.push(
                    "Recent cycles deviate more than before; cycle length uncertainty was increased."
                        .to_string(),
                );
            }
        }
        if snapshot.accuracy_rate < 0.5 {
            recommendations.push(
                "Fewer than half of recent predictions were accurate; plan with extra buffer days."
                    .to_string(),
            );
        }
        recommendations
    }
}

/// Mean absolute error of the newer half of known errors minus the older half.
fn error_growth(records: &[AccuracyRecord]) -> f64 {
    let errors: Vec<f64> = records
        .iter()
        .filter_map(|r| r.error_days)
        .map(|e| e.abs() as f64)
        .collect();
    if errors.len() < 4 {
        return 0.0;
    }
    let (older, newer) = errors.split_at(errors.len() / 2);
    mean(newer) - mean(older)
}
