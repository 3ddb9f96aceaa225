//! Confidence Calibrator Module
//!
//! Scores verified predictions (Brier, log-loss, calibration error), tracks
//! accuracy over time, and recalibrates model parameters when stated confidence
//! drifts from observed accuracy.

pub mod accuracy;
pub mod calibrator;
pub mod recalibration;
pub mod scoring;

pub use accuracy::{
    AccuracyComparison, AccuracyInsights, AccuracyMetrics, AccuracyMetricsCalculator,
    CalibrationQuality, PerformanceRating,
};
pub use calibrator::{CalibrationMethod, ConfidenceCalibrator};
pub use recalibration::{
    CalibrationAssessment, RecalibrationEngine, RecalibrationResult, RecalibrationStrategy,
    RecalibrationUrgency, StrategyAdjustment,
};
pub use scoring::{CalibrationReport, ReliabilityBin};
