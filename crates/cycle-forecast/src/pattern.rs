//! Cycle Pattern Analysis
//!
//! Derives length statistics, trend, seasonality and outliers from the ordered
//! cycle history. Start-to-start deltas outside the physiological range are
//! dropped before any statistic is computed.

use chrono::Datelike;
use cycle_core::stats::{coefficient_of_variation, is_outlier, mean, sample_variance, z_score};
use cycle_core::{CycleRecord, PatternConfig};
use serde::{Deserialize, Serialize};

/// Direction of recent cycle-length change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrend {
    Stable,
    Increasing,
    Decreasing,
    Irregular,
}

impl CycleTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleTrend::Stable => "stable",
            CycleTrend::Increasing => "lengthening",
            CycleTrend::Decreasing => "shortening",
            CycleTrend::Irregular => "irregular",
        }
    }
}

/// Month-of-year variation in cycle length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    /// Average cycle length per calendar month, January first
    pub monthly_averages: Vec<f64>,
    pub amplitude: f64,
    pub has_seasonal_variation: bool,
    pub reliability: f64,
    overall_mean: f64,
}

impl SeasonalPattern {
    /// Deviation of a month's average from the overall mean. `month0` is 0-based.
    pub fn deviation(&self, month0: u32) -> f64 {
        self.monthly_averages
            .get(month0 as usize)
            .map(|avg| avg - self.overall_mean)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutlier {
    /// Position in `CyclePattern::cycle_lengths`
    pub index: usize,
    pub length: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePattern {
    pub record_count: usize,
    /// Valid start-to-start deltas in chronological order
    pub cycle_lengths: Vec<f64>,
    pub discarded_deltas: usize,
    pub mean_cycle_length: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub trend: CycleTrend,
    pub seasonality: Option<SeasonalPattern>,
    pub outliers: Vec<CycleOutlier>,
    pub period_length_mean: Option<f64>,
    pub period_length_variance: f64,
    /// Mean of data-volume and consistency confidence (0-1)
    pub confidence: f64,
    /// Share of the latest deltas that are valid and not outliers (0-1)
    pub recent_reliability: f64,
}

impl CyclePattern {
    pub fn has_seasonal_variation(&self) -> bool {
        self.seasonality
            .as_ref()
            .map(|s| s.has_seasonal_variation)
            .unwrap_or(false)
    }
}

/// Stateless analyzer over an ordered cycle history
#[derive(Debug, Clone, Default)]
pub struct CyclePatternAnalyzer {
    config: PatternConfig,
}

struct Delta {
    days: f64,
    /// 0-based month of the cycle start that closes this delta
    month0: u32,
}

impl CyclePatternAnalyzer {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    pub fn analyze(&self, records: &[CycleRecord]) -> CyclePattern {
        let raw: Vec<Delta> = records
            .windows(2)
            .map(|w| Delta {
                days: (w[1].start_date - w[0].start_date).num_days() as f64,
                month0: w[1].start_date.month0(),
            })
            .collect();

        let (valid, discarded): (Vec<&Delta>, Vec<&Delta>) =
            raw.iter().partition(|d| self.in_cycle_range(d.days));

        if !discarded.is_empty() {
            tracing::debug!(
                "Discarded {} non-physiological cycle deltas out of {}",
                discarded.len(),
                raw.len()
            );
        }

        let cycle_lengths: Vec<f64> = valid.iter().map(|d| d.days).collect();
        let mean_cycle_length = mean(&cycle_lengths);
        let variance = sample_variance(&cycle_lengths);
        let std_dev = variance.sqrt();
        let cv = coefficient_of_variation(&cycle_lengths);

        let trend = self.classify_trend(&cycle_lengths, variance);
        let seasonality = self.detect_seasonality(records.len(), &valid, mean_cycle_length);
        let outliers = self.detect_outliers(&cycle_lengths, mean_cycle_length, variance);
        let (period_length_mean, period_length_variance) = self.period_lengths(records);
        let confidence = self.pattern_confidence(cycle_lengths.len(), cv);
        let recent_reliability = self.recent_reliability(&raw, mean_cycle_length, variance);

        CyclePattern {
            record_count: records.len(),
            cycle_lengths,
            discarded_deltas: discarded.len(),
            mean_cycle_length,
            variance,
            std_dev,
            coefficient_of_variation: cv,
            trend,
            seasonality,
            outliers,
            period_length_mean,
            period_length_variance,
            confidence,
            recent_reliability,
        }
    }

    fn in_cycle_range(&self, days: f64) -> bool {
        days >= self.config.min_cycle_days as f64 && days <= self.config.max_cycle_days as f64
    }

    /// Compare the halves of the most recent window of cycles.
    fn classify_trend(&self, lengths: &[f64], variance: f64) -> CycleTrend {
        let window = lengths.len().min(self.config.trend_window);
        if window < 2 {
            return CycleTrend::Stable;
        }
        let recent = &lengths[lengths.len() - window..];
        let (first, second) = recent.split_at(window / 2);
        let diff = mean(second) - mean(first);

        if diff.abs() < variance.sqrt() {
            CycleTrend::Stable
        } else if variance > self.config.irregular_variance {
            CycleTrend::Irregular
        } else if diff > 0.0 {
            CycleTrend::Increasing
        } else {
            CycleTrend::Decreasing
        }
    }

    fn detect_seasonality(
        &self,
        record_count: usize,
        deltas: &[&Delta],
        overall_mean: f64,
    ) -> Option<SeasonalPattern> {
        if record_count < self.config.seasonal_min_cycles || deltas.is_empty() {
            return None;
        }

        let mut sums = [0.0_f64; 12];
        let mut counts = [0usize; 12];
        for delta in deltas {
            let month = delta.month0 as usize;
            sums[month] += delta.days;
            counts[month] += 1;
        }

        let monthly_averages: Vec<f64> = sums
            .iter()
            .zip(counts.iter())
            .map(|(sum, &count)| {
                if count == 0 {
                    overall_mean
                } else {
                    sum / count as f64
                }
            })
            .collect();

        let deviations = monthly_averages.iter().map(|avg| avg - overall_mean);
        let max_dev = deviations.clone().fold(f64::MIN, f64::max);
        let min_dev = deviations.fold(f64::MAX, f64::min);
        let amplitude = max_dev - min_dev;

        Some(SeasonalPattern {
            monthly_averages,
            amplitude,
            has_seasonal_variation: amplitude > self.config.seasonal_amplitude_threshold,
            reliability: (record_count as f64
                / self.config.seasonal_full_reliability_cycles as f64)
                .min(1.0),
            overall_mean,
        })
    }

    fn detect_outliers(&self, lengths: &[f64], mean: f64, variance: f64) -> Vec<CycleOutlier> {
        lengths
            .iter()
            .enumerate()
            .filter(|&(_, &len)| is_outlier(len, mean, variance, self.config.outlier_z_threshold))
            .map(|(index, &length)| CycleOutlier {
                index,
                length,
                z_score: z_score(length, mean, variance),
            })
            .collect()
    }

    fn period_lengths(&self, records: &[CycleRecord]) -> (Option<f64>, f64) {
        let lengths: Vec<f64> = records
            .iter()
            .filter_map(CycleRecord::period_length)
            .filter(|len| *len >= self.config.min_period_days && *len <= self.config.max_period_days)
            .map(|len| len as f64)
            .collect();

        if lengths.is_empty() {
            (None, 0.0)
        } else {
            (Some(mean(&lengths)), sample_variance(&lengths))
        }
    }

    fn pattern_confidence(&self, n: usize, cv: f64) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let volume = (n as f64 / self.config.full_volume_cycles as f64).min(1.0);
        let consistency = (1.0 - cv).max(0.0);
        (volume + consistency) / 2.0
    }

    fn recent_reliability(&self, raw: &[Delta], mean: f64, variance: f64) -> f64 {
        let window = raw.len().min(self.config.trend_window);
        if window == 0 {
            return 0.0;
        }
        let reliable = raw[raw.len() - window..]
            .iter()
            .filter(|d| {
                self.in_cycle_range(d.days)
                    && !is_outlier(d.days, mean, variance, self.config.outlier_z_threshold)
            })
            .count();
        reliable as f64 / window as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cycles_from_lengths(start: NaiveDate, lengths: &[i64]) -> Vec<CycleRecord> {
        let mut current = start;
        let mut records = vec![CycleRecord::with_end(current, current + Duration::days(4))];
        for len in lengths {
            current += Duration::days(*len);
            records.push(CycleRecord::with_end(current, current + Duration::days(4)));
        }
        records
    }

    #[test]
    fn test_basic_statistics() {
        let records = cycles_from_lengths(date(2024, 1, 1), &[28, 29]);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);

        assert_eq!(pattern.record_count, 3);
        assert_eq!(pattern.cycle_lengths, vec![28.0, 29.0]);
        assert_relative_eq!(pattern.mean_cycle_length, 28.5);
        assert_relative_eq!(pattern.variance, 0.5);
        assert_eq!(pattern.period_length_mean, Some(5.0));
        assert_eq!(pattern.trend, CycleTrend::Increasing); // +1 day exceeds the 0.71-day spread
        assert!(pattern.seasonality.is_none());
        assert_relative_eq!(pattern.recent_reliability, 1.0);
    }

    #[test]
    fn test_non_physiological_deltas_are_dropped() {
        let records = vec![
            CycleRecord::new(date(2024, 1, 1)),
            CycleRecord::new(date(2024, 1, 1)),
            CycleRecord::new(date(2024, 1, 29)),
            CycleRecord::new(date(2024, 5, 1)),
        ];
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        assert_eq!(pattern.cycle_lengths, vec![28.0]);
        assert_eq!(pattern.discarded_deltas, 2);
        assert_eq!(pattern.variance, 0.0);
        assert_relative_eq!(pattern.recent_reliability, 1.0 / 3.0);
    }

    #[test]
    fn test_empty_history() {
        let pattern = CyclePatternAnalyzer::default().analyze(&[]);
        assert!(pattern.cycle_lengths.is_empty());
        assert_eq!(pattern.confidence, 0.0);
        assert_eq!(pattern.recent_reliability, 0.0);
        assert_eq!(pattern.trend, CycleTrend::Stable);
    }

    #[test]
    fn test_increasing_trend() {
        let records = cycles_from_lengths(date(2024, 1, 1), &[26, 26, 27, 30, 31, 31]);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        assert_eq!(pattern.trend, CycleTrend::Increasing);
    }

    #[test]
    fn test_decreasing_trend() {
        let records = cycles_from_lengths(date(2024, 1, 1), &[32, 32, 31, 28, 27, 27]);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        assert_eq!(pattern.trend, CycleTrend::Decreasing);
    }

    #[test]
    fn test_irregular_trend() {
        let records = cycles_from_lengths(date(2024, 1, 1), &[22, 24, 23, 40, 42, 41]);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        assert!(pattern.variance > 25.0);
        assert_eq!(pattern.trend, CycleTrend::Irregular);
    }

    #[test]
    fn test_outlier_detection() {
        let mut lengths = vec![28; 12];
        lengths.push(50);
        let records = cycles_from_lengths(date(2022, 1, 1), &lengths);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        assert_eq!(pattern.outliers.len(), 1);
        assert_eq!(pattern.outliers[0].length, 50.0);
        assert!(pattern.outliers[0].z_score > 2.5);
    }

    #[test]
    fn test_seasonality_requires_twelve_cycles() {
        let records = cycles_from_lengths(date(2023, 1, 1), &[28; 10]);
        assert!(CyclePatternAnalyzer::default().analyze(&records).seasonality.is_none());

        let records = cycles_from_lengths(date(2023, 1, 1), &[28; 13]);
        let seasonality = CyclePatternAnalyzer::default()
            .analyze(&records)
            .seasonality
            .unwrap();
        assert!(!seasonality.has_seasonal_variation);
        assert_relative_eq!(seasonality.amplitude, 0.0);
        assert_relative_eq!(seasonality.reliability, 14.0 / 24.0);
    }

    #[test]
    fn test_seasonal_variation_detected() {
        // Starts on the 1st of each month, except July which runs five days late.
        let mut records = Vec::new();
        for i in 0..25u32 {
            let year = 2022 + (i / 12) as i32;
            let month = i % 12 + 1;
            let day = if month == 7 { 6 } else { 1 };
            records.push(CycleRecord::new(date(year, month, day)));
        }
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        let seasonality = pattern.seasonality.unwrap();
        assert!(seasonality.has_seasonal_variation);
        assert!(seasonality.amplitude > 2.0);
        assert_relative_eq!(seasonality.reliability, 1.0);
        assert!(seasonality.deviation(6) > 4.0);
        assert!(seasonality.deviation(7) < -4.0);
    }

    #[test]
    fn test_confidence_components() {
        let records = cycles_from_lengths(date(2023, 1, 1), &[28; 12]);
        let pattern = CyclePatternAnalyzer::default().analyze(&records);
        // full volume and zero variation
        assert_relative_eq!(pattern.confidence, 1.0);
    }
}
