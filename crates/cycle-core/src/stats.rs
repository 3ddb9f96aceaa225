//! Summary statistics shared by the forecasting and calibration crates.
//!
//! All helpers are total: empty or degenerate inputs yield 0.0 rather than NaN,
//! so callers can feed them partially filtered cycle data without special-casing.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (divisor n-1). Zero when fewer than two values.
pub fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Compute sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

/// Standard deviation over mean. Returns 0.0 when the mean is not positive.
pub fn coefficient_of_variation(data: &[f64]) -> f64 {
    let m = mean(data);
    if m <= f64::EPSILON {
        return 0.0;
    }
    std_dev(data) / m
}

/// Z-score of `value` against a known mean and variance.
/// Returns 0.0 if the variance is degenerate.
pub fn z_score(value: f64, mean: f64, variance: f64) -> f64 {
    let sd = variance.max(0.0).sqrt();
    if sd < f64::EPSILON {
        return 0.0;
    }
    (value - mean) / sd
}

/// Determine if a value is an outlier (|z| > threshold).
pub fn is_outlier(value: f64, mean: f64, variance: f64, z_threshold: f64) -> bool {
    z_score(value, mean, variance).abs() > z_threshold
}

/// Normalize non-negative weights so they sum to one.
///
/// Falls back to a uniform vector when the total is zero or not finite.
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if !total.is_finite() || total <= 0.0 {
        return vec![1.0 / weights.len() as f64; weights.len()];
    }
    weights.iter().map(|w| w.max(0.0) / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_variance() {
        let data = vec![28.0, 29.0];
        assert_relative_eq!(mean(&data), 28.5);
        assert_relative_eq!(sample_variance(&data), 0.5);
        assert_eq!(sample_variance(&[30.0]), 0.0);
        assert_eq!(sample_variance(&[]), 0.0);
    }

    #[test]
    fn test_z_score_degenerate_variance() {
        assert_eq!(z_score(35.0, 28.0, 0.0), 0.0);
        assert!(!is_outlier(35.0, 28.0, 0.0, 2.5));
        assert!(is_outlier(40.0, 28.0, 4.0, 2.5));
    }

    #[test]
    fn test_normalize() {
        let w = normalize(&[1.0, 3.0]);
        assert_relative_eq!(w[0], 0.25);
        assert_relative_eq!(w[1], 0.75);

        let uniform = normalize(&[0.0, 0.0, 0.0, 0.0]);
        assert!(uniform.iter().all(|v| (*v - 0.25).abs() < 1e-12));

        let nan = normalize(&[f64::NAN, 1.0]);
        assert_relative_eq!(nan.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_coefficient_of_variation() {
        let data = vec![28.0, 28.0, 28.0];
        assert_eq!(coefficient_of_variation(&data), 0.0);
        assert_eq!(coefficient_of_variation(&[]), 0.0);
    }
}
