// src/strategy/space.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, StockingError};
use crate::model::scenario::ScenarioSet;
use crate::simulation::config::CostParams;
use crate::strategy::implementations::{
    BaseStockPolicy, ReorderPointPolicy, StaticPlan, StockingPolicy,
};
use crate::strategy::optimization::{critical_fractile_levels, critical_fractile_plan};

/// Which family of policies the search moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// One order quantity per period and item.
    StaticPlan,
    /// One order-up-to level S per item.
    OrderUpTo,
    /// A reorder point r and order-up-to level S per item.
    ReorderPoint,
}

/// Where the search starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartPoint {
    /// Centre of the quantity bounds.
    #[default]
    Midpoint,
    /// Newsvendor quantiles of the scenario demand.
    CriticalFractile,
}

/// The feasible decision domain of the optimizer.
///
/// Every decision variable (order quantity, r or S) lies in
/// `[lower, min(upper, max_capacity)]`; reorder rules also keep r <= S.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpace {
    pub kind: PolicyKind,
    #[serde(default)]
    pub lower: f64,
    pub upper: f64,
    /// Restrict quantities to whole units.
    #[serde(default)]
    pub integer: bool,
    #[serde(default)]
    pub max_capacity: Option<f64>,
    #[serde(default)]
    pub start: StartPoint,
    /// First poll step; a quarter of the bound width when unset.
    #[serde(default)]
    pub initial_step: Option<f64>,
}

impl PolicySpace {
    pub fn new(kind: PolicyKind, lower: f64, upper: f64) -> Self {
        Self {
            kind,
            lower,
            upper,
            integer: false,
            max_capacity: None,
            start: StartPoint::Midpoint,
            initial_step: None,
        }
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn with_capacity(mut self, max_capacity: f64) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }

    pub fn starting_at(mut self, start: StartPoint) -> Self {
        self.start = start;
        self
    }

    /// Fails with `InfeasiblePolicySpace` when no candidate fits the bounds.
    pub fn validate(&self) -> Result<()> {
        let infeasible = |msg: String| Err(StockingError::InfeasiblePolicySpace(msg));
        if !self.lower.is_finite() || !self.upper.is_finite() {
            return infeasible(format!(
                "bounds [{}, {}] must be finite",
                self.lower, self.upper
            ));
        }
        if self.lower < 0.0 {
            return infeasible(format!("lower bound {} is negative", self.lower));
        }
        if let Some(cap) = self.max_capacity {
            if !cap.is_finite() || cap < 0.0 {
                return infeasible(format!("max capacity {} must be finite and >= 0", cap));
            }
        }
        let (lo, hi) = self.bounds();
        if lo > hi {
            return infeasible(format!("lower bound {} exceeds upper bound {}", lo, hi));
        }
        if let Some(step) = self.initial_step {
            if !step.is_finite() || step <= 0.0 {
                return infeasible(format!("initial step {} must be positive", step));
            }
        }
        Ok(())
    }

    /// Effective `[lower, upper]` for every decision variable, after the
    /// capacity cap and integer rounding.
    pub fn bounds(&self) -> (f64, f64) {
        let upper = match self.max_capacity {
            Some(cap) => self.upper.min(cap),
            None => self.upper,
        };
        if self.integer {
            (self.lower.ceil(), upper.floor())
        } else {
            (self.lower, upper)
        }
    }

    /// Number of decision variables for a scenario shape.
    pub fn dimension(&self, horizon: usize, items: usize) -> usize {
        match self.kind {
            PolicyKind::StaticPlan => horizon * items,
            PolicyKind::OrderUpTo => items,
            PolicyKind::ReorderPoint => 2 * items,
        }
    }

    /// Smallest poll step the search may use.
    pub fn step_floor(&self, min_step: f64) -> f64 {
        if self.integer {
            min_step.max(1.0)
        } else {
            min_step
        }
    }

    pub fn initial_step_size(&self) -> f64 {
        let (lo, hi) = self.bounds();
        let step = self.initial_step.unwrap_or((hi - lo) / 4.0);
        if self.integer {
            step.round().max(1.0)
        } else {
            step
        }
    }

    /// Moves `x` onto the feasible set: clamp, round, and r <= S.
    pub fn project(&self, x: &mut [f64], items: usize) {
        let (lo, hi) = self.bounds();
        for v in x.iter_mut() {
            let r = if self.integer { v.round() } else { *v };
            *v = r.clamp(lo, hi);
        }
        if self.kind == PolicyKind::ReorderPoint {
            let (reorder, targets) = x.split_at_mut(items);
            for (r, s) in reorder.iter_mut().zip(targets.iter()) {
                if *r > *s {
                    *r = *s;
                }
            }
        }
    }

    /// Builds the policy a decision vector stands for.
    pub fn decode(&self, x: &[f64], items: usize) -> StockingPolicy {
        match self.kind {
            PolicyKind::StaticPlan => StockingPolicy::StaticPlan(StaticPlan::from_flat(items, x.to_vec())),
            PolicyKind::OrderUpTo => StockingPolicy::OrderUpTo(BaseStockPolicy::new(x.to_vec())),
            PolicyKind::ReorderPoint => {
                let (reorder, targets) = x.split_at(items);
                StockingPolicy::ReorderPoint(ReorderPointPolicy::new(
                    reorder.to_vec(),
                    targets.to_vec(),
                ))
            }
        }
    }

    /// The first candidate of a search, already projected.
    pub fn start_vector(&self, scenarios: &ScenarioSet, costs: &CostParams) -> Vec<f64> {
        let horizon = scenarios.horizon();
        let items = scenarios.items();
        let (lo, hi) = self.bounds();

        let mut x = match self.start {
            StartPoint::Midpoint => {
                let mid = lo + (hi - lo) / 2.0;
                match self.kind {
                    PolicyKind::ReorderPoint => {
                        let mut x = vec![lo + (mid - lo) / 2.0; items];
                        x.extend(std::iter::repeat(mid).take(items));
                        x
                    }
                    _ => vec![mid; self.dimension(horizon, items)],
                }
            }
            StartPoint::CriticalFractile => {
                let ratios = costs.critical_ratios(items);
                let lead = costs.lead_time;
                match self.kind {
                    PolicyKind::StaticPlan => {
                        // An order placed in t serves demand in t + lead
                        let plan = critical_fractile_plan(scenarios, &ratios);
                        (0..horizon * items)
                            .map(|i| plan.get(i + lead * items).copied().unwrap_or(0.0))
                            .collect()
                    }
                    PolicyKind::OrderUpTo => critical_fractile_levels(scenarios, lead + 1, &ratios),
                    PolicyKind::ReorderPoint => {
                        let mut x = critical_fractile_levels(scenarios, lead, &ratios);
                        x.extend(critical_fractile_levels(scenarios, lead + 1, &ratios));
                        x
                    }
                }
            }
        };
        self.project(&mut x, items);
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bounds_are_infeasible() {
        let space = PolicySpace::new(PolicyKind::OrderUpTo, 10.0, 5.0);
        assert!(matches!(
            space.validate(),
            Err(StockingError::InfeasiblePolicySpace(_))
        ));
        // No whole unit inside [0.2, 0.8]
        let space = PolicySpace::new(PolicyKind::OrderUpTo, 0.2, 0.8).integer();
        assert!(space.validate().is_err());
        // Capacity below the lower bound
        let space = PolicySpace::new(PolicyKind::ReorderPoint, 5.0, 50.0).with_capacity(3.0);
        assert!(space.validate().is_err());
        let space = PolicySpace::new(PolicyKind::OrderUpTo, 0.0, 20.0).integer();
        assert!(space.validate().is_ok());
    }

    #[test]
    fn projection_clamps_rounds_and_orders_reorder_rule() {
        let space = PolicySpace::new(PolicyKind::ReorderPoint, 0.0, 30.0)
            .integer()
            .with_capacity(25.0);
        let mut x = vec![12.4, -3.0, 9.6, 40.0];
        space.project(&mut x, 2);
        assert_eq!(x, vec![10.0, 0.0, 10.0, 25.0]);
    }

    #[test]
    fn decode_matches_kind() {
        let space = PolicySpace::new(PolicyKind::ReorderPoint, 0.0, 30.0);
        let policy = space.decode(&[2.0, 3.0, 10.0, 12.0], 2);
        assert_eq!(
            policy,
            StockingPolicy::ReorderPoint(ReorderPointPolicy::new(vec![2.0, 3.0], vec![10.0, 12.0]))
        );
        assert_eq!(space.dimension(6, 2), 4);
        assert_eq!(
            PolicySpace::new(PolicyKind::StaticPlan, 0.0, 1.0).dimension(6, 2),
            12
        );
    }

    #[test]
    fn midpoint_start() {
        let set = ScenarioSet::from_rows(vec![vec![8.0], vec![10.0], vec![12.0]]).unwrap();
        let space = PolicySpace::new(PolicyKind::OrderUpTo, 0.0, 20.0).integer();
        assert_eq!(space.start_vector(&set, &CostParams::default()), vec![10.0]);
        assert_eq!(space.initial_step_size(), 5.0);

        let space = PolicySpace::new(PolicyKind::ReorderPoint, 0.0, 20.0);
        assert_eq!(space.start_vector(&set, &CostParams::default()), vec![5.0, 10.0]);
    }

    #[test]
    fn critical_fractile_start_hits_newsvendor_quantile() {
        let set = ScenarioSet::from_rows(vec![vec![8.0], vec![10.0], vec![12.0]]).unwrap();
        let costs = CostParams {
            holding_cost_rate: 1.0,
            shortage_cost_rate: 4.0,
            ..CostParams::default()
        };
        let space = PolicySpace::new(PolicyKind::OrderUpTo, 0.0, 20.0)
            .starting_at(StartPoint::CriticalFractile);
        assert_eq!(space.start_vector(&set, &costs), vec![12.0]);
    }

    #[test]
    fn critical_fractile_plan_shifts_by_lead_time() {
        let set = ScenarioSet::from_rows(vec![vec![1.0, 5.0, 7.0]]).unwrap();
        let costs = CostParams {
            lead_time: 1,
            ..CostParams::default()
        };
        let space = PolicySpace::new(PolicyKind::StaticPlan, 0.0, 100.0)
            .starting_at(StartPoint::CriticalFractile);
        assert_eq!(space.start_vector(&set, &costs), vec![5.0, 7.0, 0.0]);
    }
}
