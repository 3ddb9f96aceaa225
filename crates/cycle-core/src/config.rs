//! Engine configuration.
//!
//! Every tunable constant lives here with its default stated once. The embedding
//! application may deserialize overrides (missing fields fall back to defaults) and
//! must call [`EngineConfig::validate`] before handing the config to the components.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pattern: PatternConfig,
    pub bayesian: BayesianConfig,
    pub prediction: PredictionConfig,
    pub accuracy: AccuracyConfig,
    pub recalibration: RecalibrationConfig,
    pub decision: DecisionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.pattern.validate()?;
        self.bayesian.validate()?;
        self.prediction.validate()?;
        self.accuracy.validate()?;
        self.recalibration.validate()?;
        self.decision.validate()
    }

    /// Parse a JSON override document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(message: &str) -> ForecastError {
    ForecastError::InvalidConfig(message.to_string())
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Cycle pattern analysis thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Shortest start-to-start delta treated as a real cycle
    pub min_cycle_days: i64,
    /// Longest start-to-start delta treated as a real cycle
    pub max_cycle_days: i64,
    pub min_period_days: i64,
    pub max_period_days: i64,
    /// Number of recent cycles inspected for trend classification
    pub trend_window: usize,
    pub irregular_variance: f64,
    pub outlier_z_threshold: f64,
    pub seasonal_min_cycles: usize,
    pub seasonal_full_reliability_cycles: usize,
    pub seasonal_amplitude_threshold: f64,
    /// Cycle count at which data-volume confidence saturates
    pub full_volume_cycles: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_cycle_days: 1,
            max_cycle_days: 59,
            min_period_days: 1,
            max_period_days: 15,
            trend_window: 6,
            irregular_variance: 25.0,
            outlier_z_threshold: 2.5,
            seasonal_min_cycles: 12,
            seasonal_full_reliability_cycles: 24,
            seasonal_amplitude_threshold: 2.0,
            full_volume_cycles: 12,
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_cycle_days < 1 || self.min_cycle_days > self.max_cycle_days {
            return Err(invalid("cycle day bounds must satisfy 1 <= min <= max"));
        }
        if self.min_period_days < 1 || self.min_period_days > self.max_period_days {
            return Err(invalid("period day bounds must satisfy 1 <= min <= max"));
        }
        if self.trend_window < 2 {
            return Err(invalid("trend_window must be at least 2"));
        }
        if self.outlier_z_threshold <= 0.0 || self.irregular_variance <= 0.0 {
            return Err(invalid("outlier and irregularity thresholds must be positive"));
        }
        if self.seasonal_min_cycles == 0
            || self.seasonal_full_reliability_cycles == 0
            || self.full_volume_cycles == 0
        {
            return Err(invalid("cycle count thresholds must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Floor for the likelihood variance (days^2) so tight histories stay finite
    pub min_likelihood_variance: f64,
    pub support_min_days: u32,
    pub support_max_days: u32,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            min_likelihood_variance: 1.0,
            support_min_days: 15,
            support_max_days: 50,
        }
    }
}

impl BayesianConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_likelihood_variance <= 0.0 {
            return Err(invalid("min_likelihood_variance must be positive"));
        }
        if self.support_min_days >= self.support_max_days {
            return Err(invalid("density support must be a non-empty range"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub min_cycles: usize,
    pub default_cycle_length: i64,
    /// Fallback interval widths (p50, p80, p95) when history is too short
    pub default_intervals: [f64; 3],
    /// Normal quantile multipliers for the p50/p80/p95 half-widths
    pub z_multipliers: [f64; 3],
    /// Interval inflation per unit of missing data quality
    pub quality_penalty: f64,
    /// Lower bound on the standard deviation used by Gaussian kernels
    pub min_std_dev: f64,
    pub luteal_phase_days: i64,
    pub fertile_days_before: i64,
    pub fertile_days_after: i64,
    pub ovulation_interval_scale: [f64; 3],
    pub ovulation_interval_floor: [f64; 3],
    pub ovulation_quality_factor: f64,
    pub ovulation_reliability_factor: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_cycles: 2,
            default_cycle_length: 28,
            default_intervals: [3.0, 5.0, 7.0],
            z_multipliers: [0.67, 1.28, 1.96],
            quality_penalty: 0.5,
            min_std_dev: 0.5,
            luteal_phase_days: 14,
            fertile_days_before: 5,
            fertile_days_after: 1,
            ovulation_interval_scale: [1.2, 1.3, 1.5],
            ovulation_interval_floor: [1.0, 2.0, 3.0],
            ovulation_quality_factor: 0.9,
            ovulation_reliability_factor: 0.85,
        }
    }
}

impl PredictionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_cycles < 2 {
            return Err(invalid("min_cycles must be at least 2"));
        }
        if self.default_cycle_length < 15 || self.default_cycle_length > 50 {
            return Err(invalid("default_cycle_length must be within 15..=50 days"));
        }
        let ascending = |v: &[f64; 3]| v[0] > 0.0 && v[0] < v[1] && v[1] < v[2];
        if !ascending(&self.default_intervals) || !ascending(&self.z_multipliers) {
            return Err(invalid("interval widths and multipliers must be positive and ascending"));
        }
        if self.quality_penalty < 0.0 || self.min_std_dev <= 0.0 {
            return Err(invalid("quality_penalty must be >= 0 and min_std_dev > 0"));
        }
        if self.luteal_phase_days <= 0 || self.fertile_days_before < 0 || self.fertile_days_after < 0 {
            return Err(invalid("luteal and fertile window offsets must be non-negative"));
        }
        if self.fertile_days_before > 7 || self.fertile_days_after > 7 {
            return Err(invalid("fertile window must fit inside the distribution support"));
        }
        if self.ovulation_interval_scale.iter().any(|s| *s <= 0.0) {
            return Err(invalid("ovulation interval scales must be positive"));
        }
        if !unit_interval(self.ovulation_quality_factor)
            || !unit_interval(self.ovulation_reliability_factor)
        {
            return Err(invalid("ovulation factors must be within [0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// A prediction within this many days of the actual date counts as accurate
    pub accuracy_threshold_days: i64,
    pub calibration_bins: usize,
    pub probability_epsilon: f64,
    pub excellent_brier: f64,
    pub good_brier: f64,
    pub well_calibrated_threshold: f64,
    pub significant_improvement: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_days: 2,
            calibration_bins: 10,
            probability_epsilon: 1e-7,
            excellent_brier: 0.1,
            good_brier: 0.25,
            well_calibrated_threshold: 0.1,
            significant_improvement: 0.05,
        }
    }
}

impl AccuracyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.accuracy_threshold_days < 0 || self.accuracy_threshold_days > 7 {
            return Err(invalid("accuracy_threshold_days must be within 0..=7"));
        }
        if self.calibration_bins == 0 {
            return Err(invalid("calibration_bins must be non-zero"));
        }
        if self.probability_epsilon <= 0.0 || self.probability_epsilon >= 0.5 {
            return Err(invalid("probability_epsilon must be in (0, 0.5)"));
        }
        if self.excellent_brier >= self.good_brier {
            return Err(invalid("excellent_brier must be below good_brier"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalibrationConfig {
    pub min_history: usize,
    pub cooldown_days: i64,
    pub ece_threshold: f64,
    pub bias_threshold: f64,
    /// Largest relative change any parameter may take in a single recalibration
    pub max_step_fraction: f64,
    pub error_growth_threshold_days: f64,
    pub isotonic_min_history: usize,
}

impl Default for RecalibrationConfig {
    fn default() -> Self {
        Self {
            min_history: 10,
            cooldown_days: 7,
            ece_threshold: 0.1,
            bias_threshold: 0.1,
            max_step_fraction: 0.25,
            error_growth_threshold_days: 1.0,
            isotonic_min_history: 20,
        }
    }
}

impl RecalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_history < 2 {
            return Err(invalid("min_history must be at least 2"));
        }
        if self.cooldown_days < 0 {
            return Err(invalid("cooldown_days must be non-negative"));
        }
        if !unit_interval(self.ece_threshold) || !unit_interval(self.bias_threshold) {
            return Err(invalid("ece and bias thresholds must be within [0, 1]"));
        }
        if self.max_step_fraction <= 0.0 || self.max_step_fraction >= 1.0 {
            return Err(invalid("max_step_fraction must be in (0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Past decisions required before recommendations are personalized
    pub min_personal_history: usize,
    pub high_regret: f64,
    pub low_regret: f64,
    pub high_risk: f64,
    pub low_risk: f64,
    pub high_uncertainty_spread: f64,
    pub medium_uncertainty_spread: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_personal_history: 3,
            high_regret: 0.6,
            low_regret: 0.3,
            high_risk: 0.7,
            low_risk: 0.3,
            high_uncertainty_spread: 3.0,
            medium_uncertainty_spread: 1.5,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(unit_interval(self.low_regret) && unit_interval(self.high_regret))
            || self.low_regret >= self.high_regret
        {
            return Err(invalid("regret thresholds must satisfy 0 <= low < high <= 1"));
        }
        if !(unit_interval(self.low_risk) && unit_interval(self.high_risk))
            || self.low_risk >= self.high_risk
        {
            return Err(invalid("risk thresholds must satisfy 0 <= low < high <= 1"));
        }
        if self.medium_uncertainty_spread >= self.high_uncertainty_spread {
            return Err(invalid("medium uncertainty spread must be below the high spread"));
        }
        Ok(())
    }
}
