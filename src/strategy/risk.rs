// src/strategy/risk.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, StockingError};

/// How per-scenario total costs are folded into one objective value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RiskMeasure {
    /// Sample average (the plain SAA objective).
    #[default]
    Mean,
    /// Mean plus `k` population standard deviations.
    MeanPlusKStd { k: f64 },
    /// Average of the costs beyond the `quantile` level, i.e. the worst
    /// `1 - quantile` share of scenarios (at least one scenario).
    Cvar { quantile: f64 },
    /// The single most expensive scenario.
    WorstCase,
}

impl RiskMeasure {
    pub fn validate(&self) -> Result<()> {
        match *self {
            RiskMeasure::MeanPlusKStd { k } if !k.is_finite() || k < 0.0 => Err(
                StockingError::InvalidSearchConfig(format!("std multiplier k = {} must be >= 0", k)),
            ),
            RiskMeasure::Cvar { quantile } if !(0.0..1.0).contains(&quantile) => {
                Err(StockingError::InvalidSearchConfig(format!(
                    "cvar quantile {} must lie in [0, 1)",
                    quantile
                )))
            }
            _ => Ok(()),
        }
    }

    /// Aggregates scenario totals into the objective. Empty input yields 0.
    pub fn aggregate(&self, costs: &[f64]) -> f64 {
        if costs.is_empty() {
            return 0.0;
        }
        match *self {
            RiskMeasure::Mean => mean(costs),
            RiskMeasure::MeanPlusKStd { k } => {
                let mu = mean(costs);
                let variance =
                    costs.iter().map(|c| (c - mu) * (c - mu)).sum::<f64>() / costs.len() as f64;
                mu + k * variance.sqrt()
            }
            RiskMeasure::Cvar { quantile } => {
                let mut sorted = costs.to_vec();
                sorted.sort_by(|a, b| b.total_cmp(a));
                // Guard against 0.1 * 10 landing a hair above 1
                let tail = ((1.0 - quantile) * costs.len() as f64 - 1e-9).ceil() as usize;
                let tail = tail.clamp(1, costs.len());
                mean(&sorted[..tail])
            }
            RiskMeasure::WorstCase => costs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
