// src/io/demand.rs

//! Monte Carlo scenario generation.
//!
//! Generation is a pure function of `(model, horizon, count, seed)`. Every
//! scenario draws from its own random stream derived from the seed and the
//! scenario index, so scenario `i` is the same whatever `count` is and the
//! scenarios can be sampled in parallel.

use std::fmt::Debug;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson, StandardNormal};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, StockingError};
use crate::model::scenario::{DemandScenario, ScenarioSet};

/// Above this rate the Poisson inverse CDF falls back to a normal approximation.
const POISSON_NORMAL_APPROX_LAMBDA: f64 = 500.0;

/// Caller-supplied demand process for one item.
///
/// Samplers only see their own random stream, which keeps generation
/// reproducible for a fixed seed.
pub trait DemandSampler: Debug + Send + Sync {
    fn sample(&self, period: usize, rng: &mut dyn RngCore) -> f64;
}

/// Shared handle to a [`DemandSampler`].
///
/// Custom samplers are supplied in code; configuration files cannot name one.
#[derive(Debug, Clone)]
pub struct SamplerHandle(pub Arc<dyn DemandSampler>);

impl SamplerHandle {
    pub fn new(sampler: impl DemandSampler + 'static) -> Self {
        Self(Arc::new(sampler))
    }
}

impl PartialEq for SamplerHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for SamplerHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:?}", self.0))
    }
}

impl<'de> Deserialize<'de> for SamplerHandle {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> std::result::Result<Self, D::Error> {
        Err(D::Error::custom(
            "custom demand samplers must be supplied programmatically",
        ))
    }
}

/// Marginal demand distribution of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "kebab-case")]
pub enum DemandDistribution {
    Normal { mean: f64, std_dev: f64 },
    Poisson { lambda: f64 },
    /// Resamples observed demand values with replacement.
    EmpiricalBootstrap { history: Vec<f64> },
    Custom { sampler: SamplerHandle },
}

/// Correlation structure of the latent Gaussian driving all items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Correlation {
    /// AR(1) coefficient between consecutive periods, in (-1, 1).
    pub autocorrelation: f64,
    /// Pairwise correlation between items through one common factor, in [0, 1).
    pub cross_item: f64,
}

/// The stochastic demand process scenarios are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandModel {
    /// One marginal distribution per item.
    pub items: Vec<DemandDistribution>,
    #[serde(default)]
    pub correlation: Option<Correlation>,
    /// Per-period multipliers, cycled when shorter than the horizon.
    #[serde(default)]
    pub seasonality: Option<Vec<f64>>,
    /// Round every sample to whole units.
    #[serde(default)]
    pub round_to_units: bool,
}

impl DemandModel {
    /// A single item with independent demand.
    pub fn single(distribution: DemandDistribution) -> Self {
        Self {
            items: vec![distribution],
            correlation: None,
            seasonality: None,
            round_to_units: false,
        }
    }

    pub fn with_seasonality(mut self, multipliers: Vec<f64>) -> Self {
        self.seasonality = Some(multipliers);
        self
    }

    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn rounded(mut self) -> Self {
        self.round_to_units = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(invalid("demand model has no items"));
        }
        for (k, item) in self.items.iter().enumerate() {
            match item {
                DemandDistribution::Normal { mean, std_dev } => {
                    if !mean.is_finite() {
                        return Err(invalid(format!("item {}: mean {} is not finite", k, mean)));
                    }
                    if !std_dev.is_finite() || *std_dev < 0.0 {
                        return Err(invalid(format!(
                            "item {}: std_dev {} must be finite and non-negative",
                            k, std_dev
                        )));
                    }
                }
                DemandDistribution::Poisson { lambda } => {
                    if !lambda.is_finite() || *lambda < 0.0 {
                        return Err(invalid(format!(
                            "item {}: lambda {} must be finite and non-negative",
                            k, lambda
                        )));
                    }
                }
                DemandDistribution::EmpiricalBootstrap { history } => {
                    if history.is_empty() {
                        return Err(invalid(format!("item {}: bootstrap history is empty", k)));
                    }
                    if history.iter().any(|h| !h.is_finite() || *h < 0.0) {
                        return Err(invalid(format!(
                            "item {}: bootstrap history must be finite and non-negative",
                            k
                        )));
                    }
                }
                DemandDistribution::Custom { .. } => {
                    if self.correlation.is_some() {
                        return Err(invalid(format!(
                            "item {}: custom samplers cannot be correlated",
                            k
                        )));
                    }
                }
            }
        }
        if let Some(season) = &self.seasonality {
            if season.is_empty() {
                return Err(invalid("seasonality must have at least one multiplier"));
            }
            if season.iter().any(|m| !m.is_finite() || *m < 0.0) {
                return Err(invalid("seasonality multipliers must be finite and non-negative"));
            }
        }
        if let Some(c) = &self.correlation {
            if !(c.autocorrelation > -1.0 && c.autocorrelation < 1.0) {
                return Err(invalid(format!(
                    "autocorrelation {} must lie in (-1, 1)",
                    c.autocorrelation
                )));
            }
            if !(0.0..1.0).contains(&c.cross_item) {
                return Err(invalid(format!(
                    "cross-item correlation {} must lie in [0, 1)",
                    c.cross_item
                )));
            }
        }
        Ok(())
    }

    fn multiplier(&self, period: usize) -> f64 {
        match &self.seasonality {
            Some(season) => season[period % season.len()],
            None => 1.0,
        }
    }
}

/// Generates `count` scenarios of `horizon` periods from `model`.
///
/// Identical arguments reproduce the same set bit for bit.
pub fn generate(model: &DemandModel, horizon: usize, count: usize, seed: u64) -> Result<ScenarioSet> {
    if horizon == 0 {
        return Err(invalid("horizon must be at least one period"));
    }
    if count == 0 {
        return Err(invalid("scenario count must be at least one"));
    }
    model.validate()?;

    let marginals = model
        .items
        .iter()
        .map(Marginal::prepare)
        .collect::<Result<Vec<_>>>()?;
    let sampler = ScenarioSampler {
        model,
        marginals: &marginals,
        horizon,
    };

    #[cfg(feature = "parallel")]
    let scenarios: Vec<DemandScenario> = {
        use rayon::prelude::*;
        (0..count)
            .into_par_iter()
            .map(|index| sampler.sample(index, scenario_seed(seed, index)))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let scenarios: Vec<DemandScenario> = (0..count)
        .map(|index| sampler.sample(index, scenario_seed(seed, index)))
        .collect();

    debug!(count, horizon, items = model.items.len(), seed, "generated demand scenarios");
    Ok(ScenarioSet::from_generated(
        horizon,
        model.items.len(),
        seed,
        scenarios,
    ))
}

fn invalid(msg: impl Into<String>) -> StockingError {
    StockingError::InvalidModelConfig(msg.into())
}

/// SplitMix64 finaliser over the seed and scenario index.
fn scenario_seed(seed: u64, index: usize) -> u64 {
    let mut z = seed.wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A marginal distribution with its sampling objects built once per call.
enum Marginal {
    Normal { mean: f64, std_dev: f64, dist: Normal<f64> },
    Poisson { lambda: f64, dist: Option<Poisson<f64>> },
    Bootstrap { history: Vec<f64>, sorted: Vec<f64> },
    Custom(Arc<dyn DemandSampler>),
}

impl Marginal {
    fn prepare(distribution: &DemandDistribution) -> Result<Self> {
        Ok(match distribution {
            DemandDistribution::Normal { mean, std_dev } => Marginal::Normal {
                mean: *mean,
                std_dev: *std_dev,
                dist: Normal::new(*mean, *std_dev).map_err(|e| invalid(format!("normal: {}", e)))?,
            },
            DemandDistribution::Poisson { lambda } => Marginal::Poisson {
                lambda: *lambda,
                // rand_distr rejects a zero rate; that case always yields zero
                dist: if *lambda > 0.0 {
                    Some(Poisson::new(*lambda).map_err(|e| invalid(format!("poisson: {}", e)))?)
                } else {
                    None
                },
            },
            DemandDistribution::EmpiricalBootstrap { history } => {
                let mut sorted = history.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                Marginal::Bootstrap {
                    history: history.clone(),
                    sorted,
                }
            }
            DemandDistribution::Custom { sampler } => Marginal::Custom(Arc::clone(&sampler.0)),
        })
    }

    /// Independent draw.
    fn draw(&self, period: usize, rng: &mut StdRng) -> f64 {
        match self {
            Marginal::Normal { dist, .. } => dist.sample(rng),
            Marginal::Poisson { dist, .. } => dist.as_ref().map_or(0.0, |d| d.sample(rng)),
            Marginal::Bootstrap { history, .. } => history[rng.gen_range(0..history.len())],
            Marginal::Custom(sampler) => sampler.sample(period, rng),
        }
    }

    /// Maps a standard normal latent value through the inverse CDF.
    fn from_latent(&self, z: f64) -> f64 {
        match self {
            Marginal::Normal { mean, std_dev, .. } => mean + std_dev * z,
            Marginal::Poisson { lambda, .. } => poisson_quantile(*lambda, standard_normal_cdf(z), z),
            Marginal::Bootstrap { sorted, .. } => {
                let u = standard_normal_cdf(z);
                let idx = (u * sorted.len() as f64).floor() as usize;
                sorted[idx.min(sorted.len() - 1)]
            }
            // Rejected by validation
            Marginal::Custom(_) => 0.0,
        }
    }
}

struct ScenarioSampler<'a> {
    model: &'a DemandModel,
    marginals: &'a [Marginal],
    horizon: usize,
}

impl ScenarioSampler<'_> {
    fn sample(&self, index: usize, seed: u64) -> DemandScenario {
        let items = self.marginals.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut demand = Vec::with_capacity(self.horizon * items);

        match self.model.correlation {
            None => {
                for period in 0..self.horizon {
                    for marginal in self.marginals {
                        demand.push(self.finish(period, marginal.draw(period, &mut rng)));
                    }
                }
            }
            Some(corr) => {
                let rho = corr.autocorrelation;
                let rho_tail = (1.0 - rho * rho).sqrt();
                let common = corr.cross_item.sqrt();
                let idio = (1.0 - corr.cross_item).sqrt();
                let mut latent = vec![0.0; items];

                for period in 0..self.horizon {
                    let factor: f64 = rng.sample(StandardNormal);
                    for (k, marginal) in self.marginals.iter().enumerate() {
                        let own: f64 = rng.sample(StandardNormal);
                        let shock = common * factor + idio * own;
                        // Stationary AR(1): every latent value stays N(0, 1)
                        latent[k] = if period == 0 {
                            shock
                        } else {
                            rho * latent[k] + rho_tail * shock
                        };
                        demand.push(self.finish(period, marginal.from_latent(latent[k])));
                    }
                }
            }
        }

        DemandScenario::new(index, self.horizon, items, demand)
    }

    /// Applies seasonality, clamps to the valid support and rounds if asked.
    fn finish(&self, period: usize, raw: f64) -> f64 {
        let value = (raw * self.model.multiplier(period)).max(0.0);
        let value = if value.is_finite() { value } else { 0.0 };
        if self.model.round_to_units {
            value.round()
        } else {
            value
        }
    }
}

/// Standard normal CDF via the Abramowitz and Stegun 7.1.26 erf
/// approximation (absolute error below 1.5e-7).
pub fn standard_normal_cdf(z: f64) -> f64 {
    let x = z.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-x * x).exp();
    if z >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

/// Smallest k with P(X <= k) >= u for X ~ Poisson(lambda).
fn poisson_quantile(lambda: f64, u: f64, z: f64) -> f64 {
    if lambda <= 0.0 {
        return 0.0;
    }
    if lambda > POISSON_NORMAL_APPROX_LAMBDA {
        return (lambda + lambda.sqrt() * z).round().max(0.0);
    }
    let mut k = 0.0;
    let mut pmf = (-lambda).exp();
    let mut cdf = pmf;
    // Bounded well past any reachable quantile
    let limit = lambda + 12.0 * lambda.sqrt() + 20.0;
    while cdf < u && k < limit {
        k += 1.0;
        pmf *= lambda / k;
        cdf += pmf;
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct Ramp;

    impl DemandSampler for Ramp {
        fn sample(&self, period: usize, rng: &mut dyn RngCore) -> f64 {
            period as f64 + rng.gen_range(0.0..1.0)
        }
    }

    fn normal(mean: f64, std_dev: f64) -> DemandModel {
        DemandModel::single(DemandDistribution::Normal { mean, std_dev })
    }

    #[test]
    fn same_seed_same_scenarios() {
        let model = normal(100.0, 25.0).with_seasonality(vec![1.0, 1.5]);
        let a = generate(&model, 12, 50, 42).unwrap();
        let b = generate(&model, 12, 50, 42).unwrap();
        assert_eq!(a, b);
        let c = generate(&model, 12, 50, 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn scenario_does_not_depend_on_count() {
        let model = DemandModel::single(DemandDistribution::Poisson { lambda: 9.0 });
        let small = generate(&model, 5, 3, 11).unwrap();
        let large = generate(&model, 5, 30, 11).unwrap();
        assert_eq!(small.scenarios()[2], large.scenarios()[2]);
    }

    #[test]
    fn shape_and_support() {
        let model = normal(1.0, 10.0);
        let set = generate(&model, 7, 40, 1).unwrap();
        assert_eq!(set.len(), 40);
        assert_eq!(set.horizon(), 7);
        assert_eq!(set.seed(), Some(1));
        assert!(set.iter().all(|s| s.horizon() == 7));
        assert!(set.iter().all(|s| s.item_series(0).all(|d| d >= 0.0)));
    }

    #[test]
    fn rejects_out_of_domain_parameters() {
        assert!(matches!(
            generate(&normal(10.0, -1.0), 3, 3, 0),
            Err(StockingError::InvalidModelConfig(_))
        ));
        assert!(matches!(
            generate(&normal(10.0, 1.0), 0, 3, 0),
            Err(StockingError::InvalidModelConfig(_))
        ));
        assert!(matches!(
            generate(&normal(10.0, 1.0), 3, 0, 0),
            Err(StockingError::InvalidModelConfig(_))
        ));
        let empty = DemandModel::single(DemandDistribution::EmpiricalBootstrap { history: vec![] });
        assert!(generate(&empty, 3, 3, 0).is_err());
        let bad_corr = normal(10.0, 1.0).with_correlation(Correlation {
            autocorrelation: 1.0,
            cross_item: 0.0,
        });
        assert!(generate(&bad_corr, 3, 3, 0).is_err());
    }

    #[test]
    fn bootstrap_only_returns_history_values() {
        let history = vec![3.0, 5.0, 8.0];
        let model = DemandModel::single(DemandDistribution::EmpiricalBootstrap {
            history: history.clone(),
        });
        let set = generate(&model, 10, 20, 5).unwrap();
        for s in set.iter() {
            assert!(s.item_series(0).all(|d| history.contains(&d)));
        }
        let correlated = model.with_correlation(Correlation {
            autocorrelation: 0.6,
            cross_item: 0.0,
        });
        let set = generate(&correlated, 10, 20, 5).unwrap();
        for s in set.iter() {
            assert!(s.item_series(0).all(|d| history.contains(&d)));
        }
    }

    #[test]
    fn seasonality_scales_deterministic_demand() {
        let model = normal(10.0, 0.0).with_seasonality(vec![1.0, 2.0, 0.5]);
        let set = generate(&model, 4, 2, 9).unwrap();
        let series: Vec<f64> = set.scenarios()[0].item_series(0).collect();
        assert_eq!(series, vec![10.0, 20.0, 5.0, 10.0]);
    }

    #[test]
    fn rounding_yields_whole_units() {
        let model = normal(50.0, 7.0).rounded();
        let set = generate(&model, 6, 10, 3).unwrap();
        assert!(set.iter().all(|s| s.item_series(0).all(|d| d.fract() == 0.0)));
    }

    #[test]
    fn custom_sampler_is_used() {
        let model = DemandModel::single(DemandDistribution::Custom {
            sampler: SamplerHandle::new(Ramp),
        });
        let set = generate(&model, 3, 4, 0).unwrap();
        let s = &set.scenarios()[1];
        for t in 0..3 {
            assert!(s.demand(t, 0) >= t as f64 && s.demand(t, 0) < t as f64 + 1.0);
        }
        let correlated = model.with_correlation(Correlation::default());
        assert!(generate(&correlated, 3, 4, 0).is_err());
    }

    #[test]
    fn cross_item_correlation_couples_items() {
        let item = DemandDistribution::Normal {
            mean: 100.0,
            std_dev: 10.0,
        };
        let model = DemandModel {
            items: vec![item.clone(), item],
            correlation: Some(Correlation {
                autocorrelation: 0.0,
                cross_item: 0.9,
            }),
            seasonality: None,
            round_to_units: false,
        };
        let set = generate(&model, 50, 40, 21).unwrap();
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for s in set.iter() {
            for t in 0..s.horizon() {
                let x = s.demand(t, 0) - 100.0;
                let y = s.demand(t, 1) - 100.0;
                sxy += x * y;
                sxx += x * x;
                syy += y * y;
            }
        }
        let corr = sxy / (sxx * syy).sqrt();
        assert!(corr > 0.8, "sample correlation {} too low", corr);
    }

    #[test]
    fn large_rate_correlated_poisson_keeps_its_mean() {
        // Rates past the cutoff take the normal approximation
        let model = DemandModel::single(DemandDistribution::Poisson { lambda: 1000.0 })
            .with_correlation(Correlation {
                autocorrelation: 0.3,
                cross_item: 0.0,
            });
        let set = generate(&model, 10, 200, 13).unwrap();
        let draws: Vec<f64> = set
            .iter()
            .flat_map(|s| (0..s.horizon()).map(move |t| s.demand(t, 0)))
            .collect();
        assert_eq!(draws.len(), 2000);
        assert!(draws.iter().all(|d| d.fract() == 0.0 && *d >= 0.0));

        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        assert!((mean - 1000.0).abs() < 5.0, "sample mean {}", mean);
        assert!(var.sqrt() > 25.0 && var.sqrt() < 38.0, "sample std {}", var.sqrt());
    }

    #[test]
    fn normal_cdf_matches_known_values() {
        assert_relative_eq!(standard_normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(standard_normal_cdf(1.96), 0.975, epsilon = 1e-4);
        assert_relative_eq!(standard_normal_cdf(-1.0), 0.158_655, epsilon = 1e-5);
    }

    #[test]
    fn poisson_quantile_inverts_cdf() {
        // P(X <= 0) = e^-2 ~ 0.135, P(X <= 1) ~ 0.406, P(X <= 2) ~ 0.677
        assert_eq!(poisson_quantile(2.0, 0.1, 0.0), 0.0);
        assert_eq!(poisson_quantile(2.0, 0.3, 0.0), 1.0);
        assert_eq!(poisson_quantile(2.0, 0.6, 0.0), 2.0);
        assert_eq!(poisson_quantile(0.0, 0.9, 0.0), 0.0);
    }
}
