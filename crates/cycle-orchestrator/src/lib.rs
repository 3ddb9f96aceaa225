//! Forecast Session
//!
//! Wires the forecasting, accuracy, recalibration and decision-support engines
//! around one user's persisted state. The storage layer owns persistence and
//! exchanges that state through [`SessionSnapshot`].

use chrono::NaiveDate;
use confidence_calibrator::{
    AccuracyInsights, AccuracyMetrics, AccuracyMetricsCalculator, CalibrationAssessment,
    RecalibrationEngine, RecalibrationResult,
};
use cycle_core::{
    AccuracyHistory, AccuracyRecord, CycleRecord, EngineConfig, ForecastError, ModelParameters,
    Prediction, PredictionKind, Result,
};
use cycle_forecast::{CycleForecast, PredictionService};
use decision_support::{
    DecisionContext, DecisionSupportEngine, DecisionSupportRecommendation, UserDecision,
};
use serde::{Deserialize, Serialize};

/// Persistent per-user state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub parameters: ModelParameters,
    #[serde(default)]
    pub accuracy_history: Vec<AccuracyRecord>,
    #[serde(default)]
    pub last_recalibrated_at: Option<NaiveDate>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            parameters: ModelParameters::default(),
            accuracy_history: Vec::new(),
            last_recalibrated_at: None,
        }
    }
}

/// Outcome of a calibration review: the assessment, and the recalibration if one ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReview {
    pub assessment: CalibrationAssessment,
    pub recalibration: Option<RecalibrationResult>,
}

pub struct ForecastSession {
    predictions: PredictionService,
    accuracy: AccuracyMetricsCalculator,
    recalibration: RecalibrationEngine,
    decisions: DecisionSupportEngine,
    parameters: ModelParameters,
    history: AccuracyHistory,
    last_recalibrated_at: Option<NaiveDate>,
}

impl ForecastSession {
    /// Start a fresh session with default model parameters.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::restore(config, SessionSnapshot::default())
    }

    /// Rebuild a session from persisted state.
    pub fn restore(config: EngineConfig, snapshot: SessionSnapshot) -> Result<Self> {
        config.validate()?;
        snapshot.parameters.validate()?;

        tracing::debug!(
            "Restoring forecast session with {} accuracy records",
            snapshot.accuracy_history.len()
        );

        Ok(Self {
            predictions: PredictionService::new(&config),
            accuracy: AccuracyMetricsCalculator::new(config.accuracy.clone()),
            recalibration: RecalibrationEngine::new(config.recalibration.clone(), config.accuracy.clone()),
            decisions: DecisionSupportEngine::new(config.decision.clone()),
            parameters: snapshot.parameters,
            history: AccuracyHistory::from_records(snapshot.accuracy_history),
            last_recalibrated_at: snapshot.last_recalibrated_at,
        })
    }

    pub fn from_json(config: EngineConfig, json: &str) -> Result<Self> {
        let snapshot: SessionSnapshot = serde_json::from_str(json)?;
        Self::restore(config, snapshot)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            parameters: self.parameters,
            accuracy_history: self.history.to_vec(),
            last_recalibrated_at: self.last_recalibrated_at,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Copy of the current model parameters.
    pub fn parameters(&self) -> ModelParameters {
        self.parameters
    }

    pub fn accuracy_history(&self) -> &AccuracyHistory {
        &self.history
    }

    pub fn last_recalibrated_at(&self) -> Option<NaiveDate> {
        self.last_recalibrated_at
    }

    pub fn forecast(&self, cycles: &[CycleRecord], as_of: NaiveDate) -> CycleForecast {
        self.predictions.forecast(cycles, &self.parameters, as_of)
    }

    /// Score a period prediction once the actual start date is logged.
    pub fn record_period_outcome(
        &mut self,
        prediction: &Prediction,
        actual: NaiveDate,
    ) -> Result<AccuracyRecord> {
        if !matches!(prediction.kind, PredictionKind::Period { .. }) {
            return Err(ForecastError::InvalidData(
                "expected a period prediction".to_string(),
            ));
        }
        let record = self.accuracy.track_period_accuracy(prediction, actual);
        self.push_record(record.clone());
        Ok(record)
    }

    /// Score an ovulation prediction; `None` when ovulation was never confirmed.
    pub fn record_ovulation_outcome(
        &mut self,
        prediction: &Prediction,
        actual: Option<NaiveDate>,
    ) -> Result<AccuracyRecord> {
        if !matches!(prediction.kind, PredictionKind::Ovulation { .. }) {
            return Err(ForecastError::InvalidData(
                "expected an ovulation prediction".to_string(),
            ));
        }
        let record = self.accuracy.track_ovulation_accuracy(prediction, actual);
        self.push_record(record.clone());
        Ok(record)
    }

    fn push_record(&mut self, record: AccuracyRecord) {
        tracing::debug!(
            "Recorded {:?} outcome: accurate={}, error_days={:?}",
            record.event,
            record.was_accurate,
            record.error_days
        );
        self.history.push(record);
    }

    pub fn accuracy_metrics(&self) -> AccuracyMetrics {
        self.accuracy.calculate_accuracy_metrics(&self.history.to_vec())
    }

    pub fn accuracy_insights(&self) -> AccuracyInsights {
        self.accuracy.generate_accuracy_insights(&self.accuracy_metrics())
    }

    /// Assess calibration and, when needed, recalibrate and adopt the new parameters.
    pub fn review_calibration(&mut self, as_of: NaiveDate) -> CalibrationReview {
        let history = self.history.to_vec();
        let assessment = self.recalibration.assess_recalibration_need(
            &history,
            &self.parameters,
            self.last_recalibrated_at,
            as_of,
        );

        if !assessment.needs_recalibration {
            tracing::debug!("Calibration review: {}", assessment.reasoning);
            return CalibrationReview {
                assessment,
                recalibration: None,
            };
        }

        let result = self.recalibration.perform_recalibration(
            &history,
            &self.parameters,
            Some(assessment.recommended_strategy),
        );

        if result.success {
            tracing::info!(
                "Adopting recalibrated parameters ({}), ece {:.3} -> {:.3}",
                result.strategy.as_str(),
                result.before_ece,
                result.after_ece
            );
            self.parameters = result.new_parameters;
            self.last_recalibrated_at = Some(as_of);
        } else {
            tracing::warn!(
                "Recalibration with {} did not succeed; keeping current parameters",
                result.strategy.as_str()
            );
        }

        CalibrationReview {
            assessment,
            recalibration: Some(result),
        }
    }

    pub fn decision_support(
        &self,
        prediction: &Prediction,
        context: &DecisionContext,
        decisions: &[UserDecision],
    ) -> DecisionSupportRecommendation {
        self.decisions.generate_recommendation(prediction, context, decisions)
    }
}
