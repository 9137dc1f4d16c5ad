// src/simulation/engine.rs

//! The cost evaluator: one policy against one demand scenario.

use serde::Serialize;

use crate::error::{Result, StockingError};
use crate::model::inventory::InventoryState;
use crate::model::scenario::{DemandScenario, ScenarioSet};
use crate::simulation::config::{CostParams, ItemCosts, ShortageMode};
use crate::strategy::implementations::StockingPolicy;
use crate::strategy::traits::OrderRule;

/// Realised cost of one policy on one scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub holding: f64,
    pub shortage: f64,
    pub ordering: f64,
    /// Charged for breaching the stock buffer or the inventory value cap.
    pub penalty: f64,
    pub total: f64,
    pub units_demanded: f64,
    pub units_fulfilled: f64,
    pub units_short: f64,
    pub orders_placed: usize,
    /// Item-periods that breached the stock buffer or the value cap.
    pub constraint_breaches: usize,
}

impl CostBreakdown {
    /// Share of demand met from stock in the period it arrived.
    pub fn fill_rate(&self) -> f64 {
        if self.units_demanded == 0.0 {
            1.0
        } else {
            1.0 - self.units_short / self.units_demanded
        }
    }
}

// We make this Serialize so we can write it to CSV later
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRecord {
    pub scenario: usize,
    pub period: usize,
    pub item: usize,
    pub demand: f64,
    pub order_placed: f64,
    pub arrival: f64,
    pub shipped: f64,
    pub on_hand: f64,
    pub backlog: f64,
    pub short: f64,
    pub holding_cost: f64,
    pub shortage_cost: f64,
    pub ordering_cost: f64,
    pub penalty_cost: f64,
}

/// Simulates `policy` against `scenario` and returns its cost.
///
/// Deterministic: identical inputs always give an identical breakdown.
pub fn evaluate(
    policy: &StockingPolicy,
    scenario: &DemandScenario,
    costs: &CostParams,
) -> Result<CostBreakdown> {
    let mut sim = InventorySimulation::new(policy, scenario, costs)?;
    sim.run();
    Ok(sim.breakdown)
}

/// Like [`evaluate`], also returning one record per period and item.
pub fn evaluate_with_trace(
    policy: &StockingPolicy,
    scenario: &DemandScenario,
    costs: &CostParams,
) -> Result<(CostBreakdown, Vec<PeriodRecord>)> {
    let mut sim = InventorySimulation::new(policy, scenario, costs)?.with_history();
    sim.run();
    Ok((sim.breakdown, sim.history.unwrap_or_default()))
}

/// Evaluates `policy` on every scenario of `scenarios`, in scenario order.
///
/// Scenarios are independent and run on the rayon pool when the `parallel`
/// feature is on. The first failing scenario by index aborts the batch and
/// is reported with the policy that triggered it.
pub fn evaluate_all(
    policy: &StockingPolicy,
    scenarios: &ScenarioSet,
    costs: &CostParams,
) -> Result<Vec<CostBreakdown>> {
    #[cfg(feature = "parallel")]
    let results: Vec<Result<CostBreakdown>> = {
        use rayon::prelude::*;
        scenarios
            .scenarios()
            .par_iter()
            .map(|s| evaluate(policy, s, costs))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<CostBreakdown>> = scenarios
        .iter()
        .map(|s| evaluate(policy, s, costs))
        .collect();

    results
        .into_iter()
        .zip(scenarios.iter())
        .map(|(r, s)| r.map_err(|e| StockingError::in_evaluation(policy.to_string(), s.index(), e)))
        .collect()
}

pub struct InventorySimulation<'a> {
    policy: &'a StockingPolicy,
    scenario: &'a DemandScenario,
    costs: &'a CostParams,
    item_costs: Vec<ItemCosts>,

    state: InventoryState,
    current_period: usize,

    breakdown: CostBreakdown,
    history: Option<Vec<PeriodRecord>>,
}

impl<'a> InventorySimulation<'a> {
    pub fn new(
        policy: &'a StockingPolicy,
        scenario: &'a DemandScenario,
        costs: &'a CostParams,
    ) -> Result<Self> {
        let horizon = scenario.horizon();
        if horizon == 0 {
            return Err(StockingError::InvalidHorizon { horizon });
        }
        costs.validate()?;
        costs.check_items(scenario.items())?;
        policy.validate(horizon, scenario.items())?;

        let item_costs: Vec<ItemCosts> = (0..scenario.items()).map(|k| costs.item(k)).collect();
        let state = InventoryState::new(
            item_costs.iter().map(|c| c.initial_inventory),
            costs.lead_time,
        );

        Ok(Self {
            policy,
            scenario,
            costs,
            item_costs,
            state,
            current_period: 0,
            breakdown: CostBreakdown::default(),
            history: None,
        })
    }

    pub fn with_history(mut self) -> Self {
        let capacity = self.scenario.horizon() * self.scenario.items();
        self.history = Some(Vec::with_capacity(capacity));
        self
    }

    pub fn run(&mut self) {
        while self.current_period < self.scenario.horizon() {
            self.step();
        }
    }

    fn step(&mut self) {
        let period = self.current_period;
        let costs = self.costs;
        let scenario = self.scenario;
        let demand = scenario.period(period);

        // 1-2. Order on the current inventory position, then receive whatever
        //      has come through the pipeline
        let mut stock_value = 0.0;
        for (item, rates) in self.item_costs.iter().enumerate() {
            let ledger = self.state.item_mut(item);
            let requested = self.policy.order_quantity(&ledger.context(period, item));
            ledger.place_order(requested, rates.min_order_quantity);
            ledger.receive_shipment();
            stock_value += rates.unit_price * ledger.on_hand;
        }
        let value_excess = costs
            .max_inventory_value
            .map_or(0.0, |cap| (stock_value - cap).max(0.0));

        for (item, rates) in self.item_costs.iter().enumerate() {
            let ledger = self.state.item_mut(item);
            let available = ledger.on_hand;

            // 3. Serve demand (partially if short)
            let fulfilment = ledger.fulfil_demand(demand[item], costs.shortage_mode);

            // 4. Charge the period
            let order = ledger.last_order_placed;
            let ordering_cost = rates.ordering_cost(order);
            let holding_cost = rates.holding_cost_rate * ledger.on_hand;
            let shortage_cost = match costs.shortage_mode {
                ShortageMode::LostSale => rates.shortage_cost_rate * fulfilment.short,
                ShortageMode::Backorder => rates.shortage_cost_rate * ledger.backlog,
            };
            // Each item carries the value excess in proportion to its stock value
            let buffer_gap = (rates.min_stock - ledger.on_hand).max(0.0);
            let excess_share = if value_excess > 0.0 {
                value_excess * rates.unit_price * available / stock_value
            } else {
                0.0
            };
            let penalty_cost = costs.constraint_penalty_rate * (buffer_gap + excess_share);

            let b = &mut self.breakdown;
            b.holding += holding_cost;
            b.shortage += shortage_cost;
            b.ordering += ordering_cost;
            b.penalty += penalty_cost;
            b.total += holding_cost + shortage_cost + ordering_cost + penalty_cost;
            b.units_demanded += demand[item];
            b.units_fulfilled += fulfilment.shipped;
            b.units_short += fulfilment.short;
            if order > 0.0 {
                b.orders_placed += 1;
            }
            if buffer_gap > 0.0 || excess_share > 0.0 {
                b.constraint_breaches += 1;
            }

            if let Some(history) = self.history.as_mut() {
                history.push(PeriodRecord {
                    scenario: scenario.index(),
                    period,
                    item,
                    demand: ledger.last_demand,
                    order_placed: order,
                    arrival: ledger.last_arrival,
                    shipped: ledger.last_shipped,
                    on_hand: ledger.on_hand,
                    backlog: ledger.backlog,
                    short: ledger.last_short,
                    holding_cost,
                    shortage_cost,
                    ordering_cost,
                    penalty_cost,
                });
            }
        }

        self.current_period += 1;
    }
}
