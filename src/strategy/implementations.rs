// src/strategy/implementations.rs

use std::fmt;

use crate::error::{Result, StockingError};
use crate::model::scenario::ScenarioSet;
use crate::simulation::config::CostParams;
use crate::strategy::optimization::critical_fractile_levels;
use crate::strategy::traits::{OrderContext, OrderRule};

// =========================================================================
// 1. Static Plan
// =========================================================================

/// A fixed order quantity for every period and item, decided up front.
///
/// Ignores the inventory state entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPlan {
    items: usize,
    // Row-major: quantities[period * items + item]
    quantities: Vec<f64>,
}

impl StaticPlan {
    /// Builds a plan from one row of per-item quantities per period.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let items = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != items) {
            return Err(StockingError::InvalidPolicy(
                "static plan rows must all have the same item count".to_string(),
            ));
        }
        Ok(Self {
            items,
            quantities: rows.into_iter().flatten().collect(),
        })
    }

    /// Plan for a single item, one quantity per period.
    pub fn single_item(quantities: Vec<f64>) -> Self {
        Self {
            items: 1,
            quantities,
        }
    }

    pub(crate) fn from_flat(items: usize, quantities: Vec<f64>) -> Self {
        Self { items, quantities }
    }

    pub fn periods(&self) -> usize {
        if self.items == 0 {
            0
        } else {
            self.quantities.len() / self.items
        }
    }

    pub fn items(&self) -> usize {
        self.items
    }

    pub fn quantity(&self, period: usize, item: usize) -> f64 {
        self.quantities[period * self.items + item]
    }

    pub(crate) fn as_flat(&self) -> &[f64] {
        &self.quantities
    }
}

impl OrderRule for StaticPlan {
    fn order_quantity(&self, context: &OrderContext) -> f64 {
        self.quantity(context.period, context.item)
    }
}

// =========================================================================
// 2. Base Stock Policy ("Order-Up-To")
// =========================================================================

/// Orders enough to raise the inventory position back to a target level S.
///
/// Formula: Order = max(0, S - (OnHand - Backlog + Pipeline))
#[derive(Debug, Clone, PartialEq)]
pub struct BaseStockPolicy {
    targets: Vec<f64>,
}

impl BaseStockPolicy {
    /// One order-up-to level per item.
    pub fn new(targets: Vec<f64>) -> Self {
        Self { targets }
    }

    /// Creates a BaseStockPolicy whose targets sit at the critical fractile
    /// of demand over the risk horizon (Newsvendor Model).
    pub fn with_optimal_target(scenarios: &ScenarioSet, costs: &CostParams) -> Self {
        let ratios = costs.critical_ratios(scenarios.items());
        Self::new(critical_fractile_levels(scenarios, costs.lead_time + 1, &ratios))
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

impl OrderRule for BaseStockPolicy {
    fn order_quantity(&self, context: &OrderContext) -> f64 {
        let gap = self.targets[context.item] - context.inventory_position();
        // We cannot order negative amounts.
        gap.max(0.0)
    }
}

// =========================================================================
// 3. Reorder Point Policy ((r, S))
// =========================================================================

/// Waits until the inventory position drops to the reorder point r, then
/// orders up to S.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPointPolicy {
    reorder_points: Vec<f64>,
    targets: Vec<f64>,
}

impl ReorderPointPolicy {
    pub fn new(reorder_points: Vec<f64>, targets: Vec<f64>) -> Self {
        Self {
            reorder_points,
            targets,
        }
    }

    pub fn reorder_points(&self) -> &[f64] {
        &self.reorder_points
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

impl OrderRule for ReorderPointPolicy {
    fn order_quantity(&self, context: &OrderContext) -> f64 {
        let position = context.inventory_position();
        if position <= self.reorder_points[context.item] {
            (self.targets[context.item] - position).max(0.0)
        } else {
            0.0
        }
    }
}

// =========================================================================
// Stocking Policy
// =========================================================================

/// The decision handed from the optimizer to the cost evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum StockingPolicy {
    StaticPlan(StaticPlan),
    OrderUpTo(BaseStockPolicy),
    ReorderPoint(ReorderPointPolicy),
}

impl StockingPolicy {
    /// Checks the policy can drive a simulation of `horizon` periods over
    /// `items` items.
    pub fn validate(&self, horizon: usize, items: usize) -> Result<()> {
        match self {
            StockingPolicy::StaticPlan(plan) => {
                if plan.items() != items {
                    return Err(StockingError::InvalidPolicy(format!(
                        "static plan covers {} items, scenario has {}",
                        plan.items(),
                        items
                    )));
                }
                if plan.periods() < horizon {
                    return Err(StockingError::InvalidPolicy(format!(
                        "static plan covers {} periods, horizon is {}",
                        plan.periods(),
                        horizon
                    )));
                }
                check_values("order quantity", plan.as_flat())
            }
            StockingPolicy::OrderUpTo(rule) => {
                check_len("order-up-to levels", rule.targets().len(), items)?;
                check_values("order-up-to level", rule.targets())
            }
            StockingPolicy::ReorderPoint(rule) => {
                check_len("reorder points", rule.reorder_points().len(), items)?;
                check_len("order-up-to levels", rule.targets().len(), items)?;
                check_values("reorder point", rule.reorder_points())?;
                check_values("order-up-to level", rule.targets())?;
                for (k, (r, s)) in rule.reorder_points().iter().zip(rule.targets()).enumerate() {
                    if r > s {
                        return Err(StockingError::InvalidPolicy(format!(
                            "item {}: reorder point {} exceeds order-up-to level {}",
                            k, r, s
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Total stocking quantity, used to break exact objective ties in favour
    /// of less capital tied up in stock.
    pub fn total_quantity(&self) -> f64 {
        match self {
            StockingPolicy::StaticPlan(plan) => plan.as_flat().iter().sum(),
            StockingPolicy::OrderUpTo(rule) => rule.targets().iter().sum(),
            StockingPolicy::ReorderPoint(rule) => rule.targets().iter().sum(),
        }
    }
}

impl OrderRule for StockingPolicy {
    fn order_quantity(&self, context: &OrderContext) -> f64 {
        match self {
            StockingPolicy::StaticPlan(plan) => plan.order_quantity(context),
            StockingPolicy::OrderUpTo(rule) => rule.order_quantity(context),
            StockingPolicy::ReorderPoint(rule) => rule.order_quantity(context),
        }
    }
}

impl fmt::Display for StockingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockingPolicy::StaticPlan(plan) => {
                write!(f, "static-plan [")?;
                for t in 0..plan.periods() {
                    if t > 0 {
                        write!(f, ", ")?;
                    }
                    let row = &plan.as_flat()[t * plan.items()..(t + 1) * plan.items()];
                    write!(f, "{:?}", row)?;
                }
                write!(f, "]")
            }
            StockingPolicy::OrderUpTo(rule) => write!(f, "order-up-to S={:?}", rule.targets()),
            StockingPolicy::ReorderPoint(rule) => write!(
                f,
                "reorder-point r={:?} S={:?}",
                rule.reorder_points(),
                rule.targets()
            ),
        }
    }
}

fn check_len(what: &str, got: usize, items: usize) -> Result<()> {
    if got != items {
        return Err(StockingError::InvalidPolicy(format!(
            "{} given for {} items, scenario has {}",
            what, got, items
        )));
    }
    Ok(())
}

fn check_values(what: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        Some(v) => Err(StockingError::InvalidPolicy(format!(
            "{} {} must be finite and non-negative",
            what, v
        ))),
        None => Ok(()),
    }
}
