//! Decision Support Engine
//!
//! Translates prediction uncertainty and the user's decision history into
//! regret-aware guidance: what to do, how much confidence to require, when to
//! act and how much buffer to keep.

use chrono::Duration;
use cycle_core::{DecisionConfig, Prediction, DISTRIBUTION_RADIUS};

use crate::models::*;

#[derive(Debug, Clone, Default)]
pub struct DecisionSupportEngine {
    config: DecisionConfig,
}

impl DecisionSupportEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Build the full recommendation bundle for one upcoming decision.
    pub fn generate_recommendation(
        &self,
        prediction: &Prediction,
        context: &DecisionContext,
        history: &[UserDecision],
    ) -> DecisionSupportRecommendation {
        let uncertainty_level = self.uncertainty_level(prediction);
        let risk_score = self.risk_score(uncertainty_level, context);
        let profile = self.personal_profile(context, history);

        let mut candidates = self.base_recommendations(uncertainty_level, context);
        if let Some(profile) = &profile {
            candidates.extend(self.personalized_recommendations(profile, context));
        }
        candidates.extend(self.risk_adjusted_recommendations(risk_score, context));

        // Highest expected regret reduction first
        candidates.sort_by(|a, b| b.expected_regret_reduction.total_cmp(&a.expected_regret_reduction));
        let mut candidates = candidates.into_iter();
        let primary = candidates.next().unwrap_or_else(|| {
            Recommendation::new(
                "Use your judgment",
                "No specific guidance applies; weigh the prediction against what you know about your body.",
                0.0,
                RecommendationSource::Fallback,
            )
        });

        tracing::debug!(
            "Decision support for {}: uncertainty={}, risk={:.2}, primary='{}'",
            context.decision_type.as_str(),
            uncertainty_level.as_str(),
            risk_score,
            primary.title
        );

        DecisionSupportRecommendation {
            uncertainty_level,
            risk_score,
            primary,
            supporting: candidates.collect(),
            alternatives: self.alternative_strategies(context),
            confidence_guidance: self.confidence_guidance(uncertainty_level, profile.as_ref()),
            timing: self.timing_recommendations(prediction, context),
            buffer: self.buffer_recommendation(uncertainty_level, context),
            contextual_insights: self.contextual_insights(prediction, context, profile.as_ref()),
            predicted_outcome: self.predict_outcome(prediction, uncertainty_level, context, profile.as_ref()),
        }
    }

    pub fn uncertainty_level(&self, prediction: &Prediction) -> UncertaintyLevel {
        let spread = prediction.confidence_intervals.spread();
        if spread > self.config.high_uncertainty_spread {
            UncertaintyLevel::High
        } else if spread > self.config.medium_uncertainty_spread {
            UncertaintyLevel::Medium
        } else {
            UncertaintyLevel::Low
        }
    }

    /// Composite risk in [0, 1].
    pub fn risk_score(&self, uncertainty: UncertaintyLevel, context: &DecisionContext) -> f64 {
        let uncertainty_component: f64 = match uncertainty {
            UncertaintyLevel::High => 0.4,
            UncertaintyLevel::Medium => 0.25,
            UncertaintyLevel::Low => 0.1,
        };
        let stakes_component: f64 = match context.stakes {
            StakesLevel::High => 0.3,
            StakesLevel::Medium => 0.15,
            StakesLevel::Low => 0.05,
        };
        let horizon_component = if context.time_horizon.is_short() { 0.15 } else { 0.0 };
        let alternatives_penalty = if context.alternatives_available { 0.0 } else { 0.15 };

        (uncertainty_component + stakes_component + horizon_component + alternatives_penalty)
            .clamp(0.0, 1.0)
    }

    /// Summarize past decisions, once there are enough of them.
    pub fn personal_profile(
        &self,
        context: &DecisionContext,
        history: &[UserDecision],
    ) -> Option<PersonalProfile> {
        if history.len() < self.config.min_personal_history {
            return None;
        }

        let low_regret: Vec<f64> = history
            .iter()
            .filter(|d| d.regret.experienced_regret < self.config.low_regret)
            .map(|d| d.confidence_level_used)
            .filter(|c| c.is_finite())
            .collect();
        let optimal_confidence_range = if low_regret.is_empty() {
            None
        } else {
            let lo = low_regret.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = low_regret.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some((lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0)))
        };

        let same_type: Vec<&UserDecision> = history
            .iter()
            .filter(|d| d.context.decision_type == context.decision_type)
            .collect();
        let type_regret = if same_type.is_empty() {
            None
        } else {
            Some(
                same_type.iter().map(|d| d.regret.experienced_regret).sum::<f64>()
                    / same_type.len() as f64,
            )
        };

        let verified: Vec<bool> = same_type
            .iter()
            .filter_map(|d| d.prediction_was_accurate)
            .collect();
        let type_accuracy = if verified.is_empty() {
            None
        } else {
            Some(verified.iter().filter(|a| **a).count() as f64 / verified.len() as f64)
        };

        Some(PersonalProfile {
            decisions_considered: history.len(),
            optimal_confidence_range,
            type_regret,
            type_accuracy,
        })
    }

    fn base_recommendations(
        &self,
        uncertainty: UncertaintyLevel,
        context: &DecisionContext,
    ) -> Vec<Recommendation> {
        let mut recs = Vec::new();

        match uncertainty {
            UncertaintyLevel::High => recs.push(Recommendation::new(
                "Widen your planning window",
                "This prediction is uncertain. Plan around the full 95% range rather than a single day.",
                0.3,
                RecommendationSource::Base,
            )),
            UncertaintyLevel::Medium => recs.push(Recommendation::new(
                "Allow a moderate buffer",
                "Expect the event within a few days of the predicted date and plan a small margin.",
                0.15,
                RecommendationSource::Base,
            )),
            UncertaintyLevel::Low => recs.push(Recommendation::new(
                "Rely on the predicted date",
                "Your cycles are consistent; the predicted date is a dependable anchor.",
                0.05,
                RecommendationSource::Base,
            )),
        }

        if context.stakes == StakesLevel::High {
            let action = match context.decision_type {
                DecisionType::Protection => {
                    "Use backup contraception throughout the fertile window, not just on peak days."
                }
                DecisionType::Conception => {
                    "Confirm ovulation with tests or temperature tracking instead of relying on dates alone."
                }
                _ => "Have a backup plan ready in case the prediction is off by several days.",
            };
            recs.push(Recommendation::new(
                "Add a safety margin",
                action,
                0.25,
                RecommendationSource::Base,
            ));
        }

        if context.time_horizon.is_short() {
            recs.push(Recommendation::new(
                "Focus on the optimal window",
                "The decision is close; act on the optimal timing window and keep supplies at hand.",
                0.1,
                RecommendationSource::Base,
            ));
        }

        recs
    }

    fn personalized_recommendations(
        &self,
        profile: &PersonalProfile,
        context: &DecisionContext,
    ) -> Vec<Recommendation> {
        let mut recs = Vec::new();

        if let Some(regret) = profile.type_regret {
            if regret > self.config.high_regret {
                recs.push(Recommendation::new(
                    "Be more conservative than usual",
                    format!(
                        "Past {} decisions left you with high regret ({:.0}%). Require more confidence before acting.",
                        context.decision_type.as_str(),
                        regret * 100.0
                    ),
                    0.35,
                    RecommendationSource::Personalized,
                ));
            } else if regret < self.config.low_regret && context.stakes == StakesLevel::Low {
                recs.push(Recommendation::new(
                    "You can be less conservative",
                    format!(
                        "Past {} decisions rarely caused regret; a lighter buffer is reasonable here.",
                        context.decision_type.as_str()
                    ),
                    0.1,
                    RecommendationSource::Personalized,
                ));
            }
        }

        if let Some((lo, hi)) = profile.optimal_confidence_range {
            recs.push(Recommendation::new(
                "Use your proven confidence range",
                format!(
                    "Decisions made at {:.0}-{:.0}% confidence have worked well for you.",
                    lo * 100.0,
                    hi * 100.0
                ),
                0.12,
                RecommendationSource::Personalized,
            ));
        }

        recs
    }

    fn risk_adjusted_recommendations(
        &self,
        risk_score: f64,
        context: &DecisionContext,
    ) -> Vec<Recommendation> {
        if risk_score > self.config.high_risk {
            let action = if context.alternatives_available {
                "Prepare your alternative option now so you can switch if the prediction is wrong."
            } else {
                "With no fallback available, add extra buffer days and re-check the forecast as the date approaches."
            };
            vec![Recommendation::new(
                "Mitigate the downside",
                action,
                0.4,
                RecommendationSource::RiskAdjusted,
            )]
        } else if risk_score < self.config.low_risk {
            vec![Recommendation::new(
                "Keep it simple",
                "Risk is low; plan directly around the predicted date without extra precautions.",
                0.08,
                RecommendationSource::RiskAdjusted,
            )]
        } else {
            Vec::new()
        }
    }

    pub fn alternative_strategies(&self, context: &DecisionContext) -> Vec<AlternativeStrategy> {
        let mut strategies = vec![
            AlternativeStrategy {
                name: "Conservative".to_string(),
                description: "Act only on high-confidence predictions and keep a wide buffer."
                    .to_string(),
                confidence_threshold: 0.95,
                buffer_days: 3,
                expected_accuracy: 0.9,
                expected_regret: 0.1,
            },
            AlternativeStrategy {
                name: "Balanced".to_string(),
                description: "Trade a small buffer for fewer unnecessary precautions.".to_string(),
                confidence_threshold: 0.8,
                buffer_days: 2,
                expected_accuracy: 0.8,
                expected_regret: 0.2,
            },
        ];

        if context.stakes != StakesLevel::High {
            strategies.push(AlternativeStrategy {
                name: "Optimistic".to_string(),
                description: "Plan around the predicted date itself with no buffer.".to_string(),
                confidence_threshold: 0.5,
                buffer_days: 0,
                expected_accuracy: 0.65,
                expected_regret: 0.35,
            });
        }

        strategies
    }

    pub fn confidence_guidance(
        &self,
        uncertainty: UncertaintyLevel,
        profile: Option<&PersonalProfile>,
    ) -> ConfidenceGuidance {
        let (base_min, base_max): (f64, f64) = match uncertainty {
            UncertaintyLevel::High => (0.85, 0.95),
            UncertaintyLevel::Medium => (0.75, 0.9),
            UncertaintyLevel::Low => (0.6, 0.8),
        };
        let personal_range = profile.and_then(|p| p.optimal_confidence_range);

        let overlap = personal_range.and_then(|(lo, hi)| {
            let min = base_min.max(lo);
            let max = base_max.min(hi);
            (min <= max).then_some((min, max))
        });

        let (recommended_min, recommended_max, explanation) = match overlap {
            Some((min, max)) => (
                min,
                max,
                format!(
                    "{} uncertainty; narrowed to the range that has worked for you before.",
                    uncertainty.as_str()
                ),
            ),
            None => (
                base_min,
                base_max,
                format!(
                    "{} uncertainty; require at least {:.0}% confidence before acting.",
                    uncertainty.as_str(),
                    base_min * 100.0
                ),
            ),
        };

        ConfidenceGuidance {
            uncertainty_level: uncertainty,
            recommended_min,
            recommended_max,
            personal_range,
            explanation,
        }
    }

    pub fn timing_recommendations(
        &self,
        prediction: &Prediction,
        context: &DecisionContext,
    ) -> Vec<TimingRecommendation> {
        let date = prediction.predicted_date;
        let intervals = prediction.confidence_intervals;
        // Windows never reach past the distribution support
        let p95 = whole_days(intervals.p95).clamp(1, DISTRIBUTION_RADIUS);
        let p50 = whole_days(intervals.p50).clamp(0, p95 - 1);
        let base = prediction.mass_within(p50);

        let mut windows = vec![
            TimingRecommendation {
                window: TimingWindow::Early,
                start: date - Duration::days(p95),
                end: date - Duration::days(p50 + 1),
                confidence: base * 0.3,
                rationale: "Acting early protects against a shorter than expected cycle.".to_string(),
            },
            TimingRecommendation {
                window: TimingWindow::Optimal,
                start: date - Duration::days(p50),
                end: date + Duration::days(p50),
                confidence: base,
                rationale: "The central 50% interval around the predicted date.".to_string(),
            },
        ];

        if context.decision_type != DecisionType::Protection {
            windows.push(TimingRecommendation {
                window: TimingWindow::Late,
                start: date + Duration::days(p50 + 1),
                end: date + Duration::days(p95),
                confidence: base * 0.7,
                rationale: "Still plausible if this cycle runs long.".to_string(),
            });
        }

        windows
    }

    pub fn buffer_recommendation(
        &self,
        uncertainty: UncertaintyLevel,
        context: &DecisionContext,
    ) -> BufferRecommendation {
        let base: i64 = match uncertainty {
            UncertaintyLevel::High => 3,
            UncertaintyLevel::Medium => 2,
            UncertaintyLevel::Low => 1,
        };
        let stakes_adjustment: i64 = match context.stakes {
            StakesLevel::High => 2,
            StakesLevel::Medium => 0,
            StakesLevel::Low => -1,
        };
        let horizon_adjustment: i64 = if context.time_horizon.is_short() { 1 } else { 0 };
        let buffer_days = (base + stakes_adjustment + horizon_adjustment).max(0) as u32;

        BufferRecommendation {
            buffer_days,
            rationale: format!(
                "{} uncertainty with {:?} stakes suggests {} buffer day(s) on each side.",
                uncertainty.as_str(),
                context.stakes,
                buffer_days
            ),
            strategic: "Keep a contingency plan ready and revisit it when the next forecast updates."
                .to_string(),
        }
    }

    pub fn predict_outcome(
        &self,
        prediction: &Prediction,
        uncertainty: UncertaintyLevel,
        context: &DecisionContext,
        profile: Option<&PersonalProfile>,
    ) -> OutcomePrediction {
        let mut factors = Vec::new();

        let level_accuracy: f64 = match uncertainty {
            UncertaintyLevel::Low => 0.85,
            UncertaintyLevel::Medium => 0.7,
            UncertaintyLevel::High => 0.55,
        };
        let data_quality = prediction.uncertainty_factors.data_quality.clamp(0.0, 1.0);
        let base_accuracy = level_accuracy * (0.7 + 0.3 * data_quality);
        factors.push(format!(
            "{} uncertainty with data quality {:.0}%",
            uncertainty.as_str(),
            data_quality * 100.0
        ));

        let user_adjustment = match profile.and_then(|p| p.type_accuracy) {
            Some(accuracy) => {
                factors.push(format!(
                    "Past {} predictions were right {:.0}% of the time",
                    context.decision_type.as_str(),
                    accuracy * 100.0
                ));
                0.8 + 0.4 * accuracy
            }
            None => 1.0,
        };

        let mut context_adjustment = 1.0;
        if context.stakes == StakesLevel::High {
            context_adjustment -= 0.05;
            factors.push("High stakes leave little room for error".to_string());
        }
        if context.time_horizon == TimeHorizon::Immediate {
            context_adjustment -= 0.05;
            factors.push("Immediate decisions cannot wait for more data".to_string());
        }
        let pressure = context.external_pressure.clamp(0.0, 1.0);
        if pressure > 0.0 {
            context_adjustment -= 0.1 * pressure;
            if pressure > 0.5 {
                factors.push("External pressure raises the chance of a rushed decision".to_string());
            }
        }

        let expected_accuracy = (base_accuracy * user_adjustment * context_adjustment).clamp(0.1, 0.95);
        let regret_multiplier: f64 = match context.stakes {
            StakesLevel::High => 1.5,
            StakesLevel::Medium => 1.0,
            StakesLevel::Low => 0.6,
        };

        OutcomePrediction {
            expected_accuracy,
            estimated_regret: ((1.0 - expected_accuracy) * regret_multiplier).clamp(0.0, 1.0),
            factors,
        }
    }

    fn contextual_insights(
        &self,
        prediction: &Prediction,
        context: &DecisionContext,
        profile: Option<&PersonalProfile>,
    ) -> Vec<String> {
        let mut insights = Vec::new();
        let factors = &prediction.uncertainty_factors;

        if prediction.is_default() {
            insights.push(
                "This forecast uses population averages; log a few more cycles for a personal prediction."
                    .to_string(),
            );
        } else {
            insights.push(format!("Based on {} logged cycles.", factors.history_length));
        }
        if factors.seasonal_patterns {
            insights.push("Your cycle length varies with the season; this month is accounted for.".to_string());
        }
        if factors.recent_data_reliability < 0.5 {
            insights.push("Recent cycles were irregular, which lowers confidence.".to_string());
        }
        match profile {
            Some(p) => insights.push(format!(
                "Guidance personalized from {} past decisions.",
                p.decisions_considered
            )),
            None => insights.push(format!(
                "Record at least {} decisions to personalize this guidance.",
                self.config.min_personal_history
            )),
        }
        if context.external_pressure > 0.5 {
            insights.push("Take a moment before deciding; outside pressure is high.".to_string());
        }

        insights
    }
}

fn whole_days(width: f64) -> i64 {
    if width.is_finite() {
        width.max(0.0).ceil() as i64
    } else {
        DISTRIBUTION_RADIUS
    }
}
