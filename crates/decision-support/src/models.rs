use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What the user is deciding about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Protection,
    Conception,
    EventPlanning,
    Travel,
    HealthTracking,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Protection => "protection",
            DecisionType::Conception => "conception",
            DecisionType::EventPlanning => "event planning",
            DecisionType::Travel => "travel",
            DecisionType::HealthTracking => "health tracking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakesLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Immediate,
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeHorizon {
    pub fn is_short(&self) -> bool {
        matches!(self, TimeHorizon::Immediate | TimeHorizon::ShortTerm)
    }
}

/// Uncertainty classification from the width of the prediction intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyLevel {
    Low,
    Medium,
    High,
}

impl UncertaintyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyLevel::Low => "Low",
            UncertaintyLevel::Medium => "Medium",
            UncertaintyLevel::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub decision_type: DecisionType,
    pub stakes: StakesLevel,
    pub time_horizon: TimeHorizon,
    pub alternatives_available: bool,
    /// Social or time pressure felt by the user (0-1)
    #[serde(default)]
    pub external_pressure: f64,
}

impl DecisionContext {
    pub fn new(decision_type: DecisionType, stakes: StakesLevel, time_horizon: TimeHorizon) -> Self {
        Self {
            decision_type,
            stakes,
            time_horizon,
            alternatives_available: true,
            external_pressure: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegretMetrics {
    /// Regret reported after the outcome was known (0-1)
    pub experienced_regret: f64,
    #[serde(default)]
    pub anticipated_regret: Option<f64>,
}

/// A past decision, owned by the caller and read-only here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDecision {
    pub context: DecisionContext,
    pub confidence_level_used: f64,
    pub regret: RegretMetrics,
    #[serde(default)]
    pub prediction_was_accurate: Option<bool>,
    pub decided_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Base,
    Personalized,
    RiskAdjusted,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub action: String,
    /// Expected reduction of regret if followed (0-1)
    pub expected_regret_reduction: f64,
    pub source: RecommendationSource,
}

impl Recommendation {
    pub(crate) fn new(
        title: &str,
        action: impl Into<String>,
        expected_regret_reduction: f64,
        source: RecommendationSource,
    ) -> Self {
        Self {
            title: title.to_string(),
            action: action.into(),
            expected_regret_reduction,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeStrategy {
    pub name: String,
    pub description: String,
    pub confidence_threshold: f64,
    pub buffer_days: u32,
    pub expected_accuracy: f64,
    pub expected_regret: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceGuidance {
    pub uncertainty_level: UncertaintyLevel,
    pub recommended_min: f64,
    pub recommended_max: f64,
    /// Range of confidence levels that historically led to low regret
    pub personal_range: Option<(f64, f64)>,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingWindow {
    Early,
    Optimal,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecommendation {
    pub window: TimingWindow,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferRecommendation {
    pub buffer_days: u32,
    pub rationale: String,
    /// Contingency advice that applies regardless of the buffer size
    pub strategic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrediction {
    pub expected_accuracy: f64,
    pub estimated_regret: f64,
    pub factors: Vec<String>,
}

/// Per-user tendencies derived from past decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalProfile {
    pub decisions_considered: usize,
    pub optimal_confidence_range: Option<(f64, f64)>,
    /// Mean experienced regret for the current decision type
    pub type_regret: Option<f64>,
    /// Share of accurate predictions behind past decisions of this type
    pub type_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSupportRecommendation {
    pub uncertainty_level: UncertaintyLevel,
    pub risk_score: f64,
    pub primary: Recommendation,
    pub supporting: Vec<Recommendation>,
    pub alternatives: Vec<AlternativeStrategy>,
    pub confidence_guidance: ConfidenceGuidance,
    pub timing: Vec<TimingRecommendation>,
    pub buffer: BufferRecommendation,
    pub contextual_insights: Vec<String>,
    pub predicted_outcome: OutcomePrediction,
}
