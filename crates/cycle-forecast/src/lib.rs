//! Cycle Forecasting
//!
//! Turns a user's cycle history into period and ovulation predictions:
//! pattern extraction, a conjugate normal update of the cycle-length belief,
//! and interval/distribution generation around the predicted dates.

pub mod bayesian;
pub mod pattern;
pub mod prediction;

pub use bayesian::{BayesianInferenceEngine, DensityPoint, NormalBelief, PosteriorSummary};
pub use pattern::{CycleOutlier, CyclePattern, CyclePatternAnalyzer, CycleTrend, SeasonalPattern};
pub use prediction::{CycleForecast, PredictionService};
