//! Bayesian Cycle-Length Inference
//!
//! Conjugate normal-normal update of the cycle-length belief: the persisted
//! model parameters act as the prior, the observed cycle lengths as the likelihood.

use cycle_core::stats::{mean, normalize, sample_variance};
use cycle_core::{BayesianConfig, ModelParameters};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// A normal belief over cycle length in days
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalBelief {
    pub mean: f64,
    pub variance: f64,
}

impl NormalBelief {
    pub fn new(mean: f64, variance: f64) -> Self {
        Self { mean, variance }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }

    /// Central interval `mean ± z·sd`.
    pub fn credible_interval(&self, z: f64) -> (f64, f64) {
        let margin = z.abs() * self.std_dev();
        (self.mean - margin, self.mean + margin)
    }
}

/// Probability of one integer day under a discretized belief
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub day: u32,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub prior: NormalBelief,
    pub likelihood: NormalBelief,
    pub posterior: NormalBelief,
    pub sample_size: usize,
    /// Agreement between prior and data, diagnostic only (0-1]
    pub evidence: f64,
    /// n / (n + 1)
    pub update_strength: f64,
    /// True when there were no observations and the prior was used as likelihood
    pub used_prior_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BayesianInferenceEngine {
    config: BayesianConfig,
}

impl BayesianInferenceEngine {
    pub fn new(config: BayesianConfig) -> Self {
        Self { config }
    }

    pub fn prior(&self, params: &ModelParameters) -> NormalBelief {
        NormalBelief::new(
            params.cycle_length_mean,
            params.cycle_length_variance.max(ModelParameters::MIN_VARIANCE),
        )
    }

    /// Combine the parameter prior with observed cycle lengths.
    pub fn update(&self, params: &ModelParameters, cycle_lengths: &[f64]) -> PosteriorSummary {
        let prior = self.prior(params);
        let n = cycle_lengths.len();

        let (likelihood, used_prior_fallback) = if n == 0 {
            (prior, true)
        } else {
            let variance = sample_variance(cycle_lengths).max(self.config.min_likelihood_variance);
            (NormalBelief::new(mean(cycle_lengths), variance), false)
        };

        let n_f = n as f64;
        let posterior_variance = 1.0 / (1.0 / prior.variance + n_f / likelihood.variance);
        let posterior_mean = posterior_variance
            * (prior.mean / prior.variance + n_f * likelihood.mean / likelihood.variance);

        let evidence = (-0.5 * (prior.mean - likelihood.mean).powi(2)
            / (prior.variance + likelihood.variance))
            .exp();

        tracing::debug!(
            "Posterior cycle length {:.2} (var {:.3}) from prior {:.2} and {} observations",
            posterior_mean,
            posterior_variance,
            prior.mean,
            n
        );

        PosteriorSummary {
            prior,
            likelihood,
            posterior: NormalBelief::new(posterior_mean, posterior_variance),
            sample_size: n,
            evidence,
            update_strength: n_f / (n_f + 1.0),
            used_prior_fallback,
        }
    }

    /// Discretize a belief over the configured day support, normalized to sum to one.
    pub fn density(&self, belief: &NormalBelief) -> Vec<DensityPoint> {
        let days: Vec<u32> = (self.config.support_min_days..=self.config.support_max_days).collect();
        let weights: Vec<f64> = match Normal::new(belief.mean, belief.std_dev()) {
            Ok(normal) => days.iter().map(|d| normal.pdf(*d as f64)).collect(),
            Err(_) => vec![1.0; days.len()],
        };

        days.into_iter()
            .zip(normalize(&weights))
            .map(|(day, probability)| DensityPoint { day, probability })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_conjugate_update() {
        let engine = BayesianInferenceEngine::default();
        let params = ModelParameters::default();
        let summary = engine.update(&params, &[28.0, 29.0]);

        // likelihood variance 0.5 is floored at 1.0
        assert_relative_eq!(summary.likelihood.variance, 1.0);
        let expected_var = 1.0 / (1.0 / 16.0 + 2.0 / 1.0);
        assert_relative_eq!(summary.posterior.variance, expected_var);
        assert_relative_eq!(
            summary.posterior.mean,
            expected_var * (28.0 / 16.0 + 2.0 * 28.5),
            epsilon = 1e-12
        );
        assert_relative_eq!(summary.update_strength, 2.0 / 3.0);
        assert!(!summary.used_prior_fallback);
    }

    #[test]
    fn test_no_observations_returns_prior() {
        let engine = BayesianInferenceEngine::default();
        let params = ModelParameters::default();
        let summary = engine.update(&params, &[]);

        assert!(summary.used_prior_fallback);
        assert_relative_eq!(summary.posterior.mean, 28.0);
        assert_relative_eq!(summary.posterior.variance, 16.0);
        assert_relative_eq!(summary.evidence, 1.0);
        assert_eq!(summary.update_strength, 0.0);
    }

    #[test]
    fn test_posterior_narrows_with_more_data() {
        let engine = BayesianInferenceEngine::default();
        let params = ModelParameters::default();
        let few = engine.update(&params, &[30.0, 31.0, 29.0]);
        let many = engine.update(&params, &[30.0, 31.0, 29.0, 30.0, 31.0, 29.0, 30.0]);
        assert!(many.posterior.variance < few.posterior.variance);
        assert!(many.posterior.mean > 29.5);
    }

    #[test]
    fn test_evidence_drops_with_disagreement() {
        let engine = BayesianInferenceEngine::default();
        let params = ModelParameters::default();
        let agree = engine.update(&params, &[28.0, 28.0]);
        let disagree = engine.update(&params, &[40.0, 41.0]);
        assert!(agree.evidence > disagree.evidence);
        assert!(disagree.evidence < 0.1);
    }

    #[test]
    fn test_density_sums_to_one() {
        let engine = BayesianInferenceEngine::default();
        for variance in [0.01, 1.0, 16.0, 400.0] {
            let density = engine.density(&NormalBelief::new(28.0, variance));
            assert_eq!(density.len(), 36);
            assert_eq!(density.first().unwrap().day, 15);
            let total: f64 = density.iter().map(|p| p.probability).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_density_degenerate_variance_is_uniform() {
        let engine = BayesianInferenceEngine::default();
        let density = engine.density(&NormalBelief::new(28.0, 0.0));
        assert!(density
            .iter()
            .all(|p| (p.probability - 1.0 / 36.0).abs() < 1e-12));
    }

    #[test]
    fn test_credible_interval() {
        let belief = NormalBelief::new(28.0, 4.0);
        let (lo, hi) = belief.credible_interval(1.96);
        assert_relative_eq!(lo, 28.0 - 3.92);
        assert_relative_eq!(hi, 28.0 + 3.92);
    }
}
