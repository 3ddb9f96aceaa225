use std::collections::VecDeque;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Number of day offsets on either side of a predicted date covered by a
/// probability distribution. Distributions have `2 * DISTRIBUTION_RADIUS + 1` buckets.
pub const DISTRIBUTION_RADIUS: i64 = 7;

/// Bucket count of every prediction probability distribution.
pub const DISTRIBUTION_LEN: usize = (2 * DISTRIBUTION_RADIUS + 1) as usize;

/// Maximum number of accuracy records retained for scoring.
pub const ACCURACY_HISTORY_CAPACITY: usize = 100;

/// A symptom logged on a specific day of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub date: NaiveDate,
    pub symptom: String,
    #[serde(default)]
    pub severity: Option<u8>,
}

/// One historical cycle, as handed over by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub symptoms: Vec<SymptomEntry>,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date: None,
            symptoms: Vec::new(),
        }
    }

    pub fn with_end(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date: Some(end_date),
            symptoms: Vec::new(),
        }
    }

    /// Inclusive bleeding length in days, if the period end was logged.
    pub fn period_length(&self) -> Option<i64> {
        self.end_date
            .map(|end| (end - self.start_date).num_days() + 1)
    }
}

/// Personal model parameters, persisted between sessions by the caller.
///
/// Only the recalibration engine produces new values; everything else reads a copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub cycle_length_mean: f64,
    pub cycle_length_variance: f64,
    pub period_length_mean: f64,
    pub period_length_variance: f64,
    /// How strongly detected month-to-month variation shifts a prediction (0-1)
    pub seasonal_variation: f64,
    /// Trust placed in personal history versus population priors (0-1]
    pub personal_history_weight: f64,
    /// Step size used when adapting parameters (0-0.5]
    pub adaptive_learning_rate: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            cycle_length_mean: 28.0,
            cycle_length_variance: 16.0,
            period_length_mean: 5.0,
            period_length_variance: 1.5,
            seasonal_variation: 0.5,
            personal_history_weight: 0.7,
            adaptive_learning_rate: 0.1,
        }
    }
}

impl ModelParameters {
    pub const CYCLE_LENGTH_RANGE: (f64, f64) = (15.0, 50.0);
    pub const PERIOD_LENGTH_RANGE: (f64, f64) = (1.0, 15.0);
    pub const MIN_VARIANCE: f64 = 0.25;
    pub const MAX_CYCLE_VARIANCE: f64 = 100.0;
    pub const MAX_PERIOD_VARIANCE: f64 = 25.0;
    pub const MIN_LEARNING_RATE: f64 = 0.01;
    pub const MAX_LEARNING_RATE: f64 = 0.5;
    pub const MIN_HISTORY_WEIGHT: f64 = 0.05;

    /// Reject parameter sets outside the model's domain.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.cycle_length_mean,
            self.cycle_length_variance,
            self.period_length_mean,
            self.period_length_variance,
            self.seasonal_variation,
            self.personal_history_weight,
            self.adaptive_learning_rate,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(ForecastError::InvalidConfig(
                "model parameters must be finite".to_string(),
            ));
        }
        let (min_cycle, max_cycle) = Self::CYCLE_LENGTH_RANGE;
        if !(min_cycle..=max_cycle).contains(&self.cycle_length_mean) {
            return Err(ForecastError::InvalidConfig(format!(
                "cycle_length_mean must be in [{}, {}] days",
                min_cycle, max_cycle
            )));
        }
        let (min_period, max_period) = Self::PERIOD_LENGTH_RANGE;
        if !(min_period..=max_period).contains(&self.period_length_mean) {
            return Err(ForecastError::InvalidConfig(format!(
                "period_length_mean must be in [{}, {}] days",
                min_period, max_period
            )));
        }
        if self.cycle_length_variance <= 0.0 || self.cycle_length_variance > Self::MAX_CYCLE_VARIANCE {
            return Err(ForecastError::InvalidConfig(format!(
                "cycle_length_variance must be in (0, {}]",
                Self::MAX_CYCLE_VARIANCE
            )));
        }
        if self.period_length_variance <= 0.0 || self.period_length_variance > Self::MAX_PERIOD_VARIANCE {
            return Err(ForecastError::InvalidConfig(format!(
                "period_length_variance must be in (0, {}]",
                Self::MAX_PERIOD_VARIANCE
            )));
        }
        if self.adaptive_learning_rate <= 0.0 || self.adaptive_learning_rate > Self::MAX_LEARNING_RATE {
            return Err(ForecastError::InvalidConfig(
                "adaptive_learning_rate must be in (0, 0.5]".to_string(),
            ));
        }
        if self.personal_history_weight <= 0.0 || self.personal_history_weight > 1.0 {
            return Err(ForecastError::InvalidConfig(
                "personal_history_weight must be in (0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.seasonal_variation) {
            return Err(ForecastError::InvalidConfig(
                "seasonal_variation must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Force every field back into its domain bounds.
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        let or_default = |v: f64, d: f64| if v.is_finite() { v } else { d };

        self.cycle_length_mean = or_default(self.cycle_length_mean, defaults.cycle_length_mean)
            .clamp(Self::CYCLE_LENGTH_RANGE.0, Self::CYCLE_LENGTH_RANGE.1);
        self.cycle_length_variance =
            or_default(self.cycle_length_variance, defaults.cycle_length_variance)
                .clamp(Self::MIN_VARIANCE, Self::MAX_CYCLE_VARIANCE);
        self.period_length_mean = or_default(self.period_length_mean, defaults.period_length_mean)
            .clamp(Self::PERIOD_LENGTH_RANGE.0, Self::PERIOD_LENGTH_RANGE.1);
        self.period_length_variance =
            or_default(self.period_length_variance, defaults.period_length_variance)
                .clamp(Self::MIN_VARIANCE, Self::MAX_PERIOD_VARIANCE);
        self.seasonal_variation =
            or_default(self.seasonal_variation, defaults.seasonal_variation).clamp(0.0, 1.0);
        self.personal_history_weight =
            or_default(self.personal_history_weight, defaults.personal_history_weight)
                .clamp(Self::MIN_HISTORY_WEIGHT, 1.0);
        self.adaptive_learning_rate =
            or_default(self.adaptive_learning_rate, defaults.adaptive_learning_rate)
                .clamp(Self::MIN_LEARNING_RATE, Self::MAX_LEARNING_RATE);
        self
    }
}

/// Half-widths (in whole days) of the central 50/80/95% intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub p50: f64,
    pub p80: f64,
    pub p95: f64,
}

impl ConfidenceIntervals {
    /// Round each width up to whole days and make the ordering strict.
    pub fn from_widths(p50: f64, p80: f64, p95: f64) -> Self {
        let whole = |v: f64| if v.is_finite() { v.max(0.0).ceil() } else { 0.0 };
        let p50 = whole(p50).max(1.0);
        let p80 = whole(p80).max(p50 + 1.0);
        let p95 = whole(p95).max(p80 + 1.0);
        Self { p50, p80, p95 }
    }

    /// Distance between the 95% and 50% bounds.
    pub fn spread(&self) -> f64 {
        self.p95 - self.p50
    }

    pub fn is_ordered(&self) -> bool {
        self.p50 >= 0.0 && self.p50 < self.p80 && self.p80 < self.p95
    }
}

/// What limits the reliability of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyFactors {
    pub data_quality: f64,
    pub history_length: usize,
    pub cycle_length_variability: f64,
    pub recent_data_reliability: f64,
    pub seasonal_patterns: bool,
}

impl UncertaintyFactors {
    /// Markers used whenever there is not enough history to say anything personal.
    pub fn limited_data() -> Self {
        Self {
            data_quality: 0.1,
            history_length: 0,
            cycle_length_variability: 0.5,
            recent_data_reliability: 0.1,
            seasonal_patterns: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FertilityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub ovulation_date: NaiveDate,
}

impl FertilityWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictionKind {
    Period { predicted_end_date: NaiveDate },
    Ovulation { fertility_window: FertilityWindow },
}

/// Whether a prediction came from the posterior or the limited-data fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionBasis {
    Posterior,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub kind: PredictionKind,
    pub basis: PredictionBasis,
    pub predicted_date: NaiveDate,
    pub confidence_intervals: ConfidenceIntervals,
    pub uncertainty_factors: UncertaintyFactors,
    /// Probability per day offset, `-DISTRIBUTION_RADIUS..=DISTRIBUTION_RADIUS`
    pub probability_distribution: Vec<f64>,
    pub explanation: String,
}

impl Prediction {
    pub fn event(&self) -> TrackedEvent {
        match self.kind {
            PredictionKind::Period { .. } => TrackedEvent::Period,
            PredictionKind::Ovulation { .. } => TrackedEvent::Ovulation,
        }
    }

    pub fn is_default(&self) -> bool {
        self.basis == PredictionBasis::Default
    }

    /// Calendar date represented by a distribution bucket.
    pub fn bucket_date(&self, index: usize) -> NaiveDate {
        self.predicted_date + Duration::days(index as i64 - DISTRIBUTION_RADIUS)
    }

    /// Probability mass assigned to days within `days` of the predicted date.
    pub fn mass_within(&self, days: i64) -> f64 {
        let radius = days.max(0);
        self.probability_distribution
            .iter()
            .enumerate()
            .filter(|(i, _)| (*i as i64 - DISTRIBUTION_RADIUS).abs() <= radius)
            .map(|(_, p)| *p)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedEvent {
    Period,
    Ovulation,
}

/// Outcome of one prediction once ground truth is (or is not) known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub event: TrackedEvent,
    pub prediction_date: NaiveDate,
    pub actual_date: Option<NaiveDate>,
    pub confidence_level: f64,
    pub was_accurate: bool,
    pub error_days: Option<i64>,
    pub brier_score: f64,
}

/// Append-only accuracy log that keeps only the most recent records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyHistory {
    records: VecDeque<AccuracyRecord>,
}

impl Default for AccuracyHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl AccuracyHistory {
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(ACCURACY_HISTORY_CAPACITY),
        }
    }

    /// Build a history from an arbitrary list, keeping the newest records.
    pub fn from_records(records: impl IntoIterator<Item = AccuracyRecord>) -> Self {
        let mut history = Self::new();
        history.extend(records);
        history
    }

    pub fn push(&mut self, record: AccuracyRecord) {
        if self.records.len() == ACCURACY_HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = AccuracyRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccuracyRecord> {
        self.records.iter()
    }

    /// Owned copy of the records, oldest first.
    pub fn to_vec(&self) -> Vec<AccuracyRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Slice view of the newest `ACCURACY_HISTORY_CAPACITY` records.
pub fn recent_records(history: &[AccuracyRecord]) -> &[AccuracyRecord] {
    let skip = history.len().saturating_sub(ACCURACY_HISTORY_CAPACITY);
    &history[skip..]
}
