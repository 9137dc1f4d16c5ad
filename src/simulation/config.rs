// src/simulation/config.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, StockingError};
use crate::io::demand::DemandModel;
use crate::strategy::optimization::critical_ratio;
use crate::strategy::risk::RiskMeasure;
use crate::strategy::search::StoppingCriteria;
use crate::strategy::space::PolicySpace;

/// What happens to demand that cannot be met from stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortageMode {
    /// Unmet demand is gone; each lost unit is charged once.
    LostSale,
    /// Unmet demand waits for stock; each open unit is charged every period.
    #[default]
    Backorder,
}

/// Cost model and replenishment mechanics for one evaluation.
///
/// The scalar rates apply to every item; entries in `items` override them
/// for one item each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    /// Cost per unit of ending on-hand stock per period.
    pub holding_cost_rate: f64,
    /// Cost per lost unit, or per backlogged unit per period.
    pub shortage_cost_rate: f64,
    /// Charged once for every period and item with a positive order.
    pub ordering_cost_fixed: f64,
    pub ordering_cost_per_unit: f64,
    pub shortage_mode: ShortageMode,
    /// Periods between placing an order and receiving it.
    pub lead_time: usize,
    /// Starting stock per item. Empty means none; one value applies to all items.
    pub initial_inventory: Vec<f64>,
    /// Positive orders below this are raised to it.
    pub min_order_quantity: f64,
    /// Buffer stock every item should still hold after serving demand.
    pub min_stock: f64,
    /// Purchase price of one unit, used to value stock against
    /// `max_inventory_value`.
    pub unit_price: f64,
    /// Cap on the value of stock available for sale in any period, summed
    /// over items.
    pub max_inventory_value: Option<f64>,
    /// Charged per unit below `min_stock` and per unit of value above
    /// `max_inventory_value`, every period the breach lasts.
    pub constraint_penalty_rate: f64,
    /// Per-item overrides; empty, or exactly one entry per item.
    pub items: Vec<ItemCostOverrides>,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            holding_cost_rate: 0.5,
            shortage_cost_rate: 1.0,
            ordering_cost_fixed: 0.0,
            ordering_cost_per_unit: 0.0,
            shortage_mode: ShortageMode::Backorder,
            lead_time: 0,
            initial_inventory: Vec::new(),
            min_order_quantity: 0.0,
            min_stock: 0.0,
            unit_price: 0.0,
            max_inventory_value: None,
            constraint_penalty_rate: 1000.0,
            items: Vec::new(),
        }
    }
}

/// Rates of one item that differ from the shared [`CostParams`] values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemCostOverrides {
    pub holding_cost_rate: Option<f64>,
    pub shortage_cost_rate: Option<f64>,
    pub ordering_cost_fixed: Option<f64>,
    pub ordering_cost_per_unit: Option<f64>,
    pub min_order_quantity: Option<f64>,
    pub min_stock: Option<f64>,
    pub unit_price: Option<f64>,
}

/// The effective rates of one item after applying its overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemCosts {
    pub holding_cost_rate: f64,
    pub shortage_cost_rate: f64,
    pub ordering_cost_fixed: f64,
    pub ordering_cost_per_unit: f64,
    pub min_order_quantity: f64,
    pub min_stock: f64,
    pub unit_price: f64,
    pub initial_inventory: f64,
}

impl ItemCosts {
    /// Newsvendor service level p / (p + h) of this item.
    pub fn critical_ratio(&self) -> f64 {
        critical_ratio(self.shortage_cost_rate, self.holding_cost_rate)
    }

    /// Cost of ordering `quantity` units; nothing when no order is placed.
    pub fn ordering_cost(&self, quantity: f64) -> f64 {
        if quantity > 0.0 {
            self.ordering_cost_fixed + self.ordering_cost_per_unit * quantity
        } else {
            0.0
        }
    }
}

impl CostParams {
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("holding_cost_rate", self.holding_cost_rate),
            ("shortage_cost_rate", self.shortage_cost_rate),
            ("ordering_cost_fixed", self.ordering_cost_fixed),
            ("ordering_cost_per_unit", self.ordering_cost_per_unit),
            ("min_order_quantity", self.min_order_quantity),
            ("min_stock", self.min_stock),
            ("unit_price", self.unit_price),
            ("constraint_penalty_rate", self.constraint_penalty_rate),
        ];
        for (name, value) in rates {
            check_rate(name, value)?;
        }
        if let Some(cap) = self.max_inventory_value {
            check_rate("max_inventory_value", cap)?;
        }
        for (k, item) in self.items.iter().enumerate() {
            let overrides = [
                ("holding_cost_rate", item.holding_cost_rate),
                ("shortage_cost_rate", item.shortage_cost_rate),
                ("ordering_cost_fixed", item.ordering_cost_fixed),
                ("ordering_cost_per_unit", item.ordering_cost_per_unit),
                ("min_order_quantity", item.min_order_quantity),
                ("min_stock", item.min_stock),
                ("unit_price", item.unit_price),
            ];
            for (name, value) in overrides {
                if let Some(value) = value {
                    check_rate(&format!("items[{}].{}", k, name), value)?;
                }
            }
        }
        if let Some(v) = self
            .initial_inventory
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0)
        {
            return Err(StockingError::InvalidCostParams(format!(
                "initial inventory {} must be finite and non-negative",
                v
            )));
        }
        Ok(())
    }

    /// Starting stock of `item`, broadcasting a single configured value.
    pub fn initial_inventory_for(&self, item: usize) -> f64 {
        match self.initial_inventory.as_slice() {
            [] => 0.0,
            [all] => *all,
            per_item => per_item.get(item).copied().unwrap_or(0.0),
        }
    }

    /// Effective rates of `item`.
    pub fn item(&self, item: usize) -> ItemCosts {
        let o = self.items.get(item).cloned().unwrap_or_default();
        ItemCosts {
            holding_cost_rate: o.holding_cost_rate.unwrap_or(self.holding_cost_rate),
            shortage_cost_rate: o.shortage_cost_rate.unwrap_or(self.shortage_cost_rate),
            ordering_cost_fixed: o.ordering_cost_fixed.unwrap_or(self.ordering_cost_fixed),
            ordering_cost_per_unit: o
                .ordering_cost_per_unit
                .unwrap_or(self.ordering_cost_per_unit),
            min_order_quantity: o.min_order_quantity.unwrap_or(self.min_order_quantity),
            min_stock: o.min_stock.unwrap_or(self.min_stock),
            unit_price: o.unit_price.unwrap_or(self.unit_price),
            initial_inventory: self.initial_inventory_for(item),
        }
    }

    /// Critical ratio of every item, in item order.
    pub fn critical_ratios(&self, items: usize) -> Vec<f64> {
        (0..items).map(|k| self.item(k).critical_ratio()).collect()
    }

    /// Checks the per-item lists fit a scenario with `items` items.
    pub fn check_items(&self, items: usize) -> Result<()> {
        let n = self.initial_inventory.len();
        if n > 1 && n != items {
            return Err(StockingError::InvalidCostParams(format!(
                "initial inventory given for {} items, scenario has {}",
                n, items
            )));
        }
        let n = self.items.len();
        if n > 0 && n != items {
            return Err(StockingError::InvalidCostParams(format!(
                "cost overrides given for {} items, scenario has {}",
                n, items
            )));
        }
        Ok(())
    }
}

fn check_rate(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(StockingError::InvalidCostParams(format!(
            "{} = {} must be finite and non-negative",
            name, value
        )));
    }
    Ok(())
}

/// Everything one optimization study needs, as read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Number of planning periods per scenario.
    pub horizon: usize,
    /// Number of Monte Carlo scenarios.
    pub scenarios: usize,
    #[serde(default)]
    pub seed: u64,
    pub demand: DemandModel,
    #[serde(default)]
    pub costs: CostParams,
    pub policy_space: PolicySpace,
    #[serde(default)]
    pub risk_measure: RiskMeasure,
    #[serde(default)]
    pub stopping: StoppingCriteria,
}

impl StudyConfig {
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Structural checks that do not need a generated scenario set.
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(StockingError::InvalidHorizon { horizon: 0 });
        }
        self.demand.validate()?;
        self.costs.validate()?;
        self.costs.check_items(self.demand.items.len())?;
        self.risk_measure.validate()?;
        self.stopping.validate()?;
        self.policy_space.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::demand::DemandDistribution;
    use crate::strategy::space::PolicyKind;

    const STUDY: &str = r#"
horizon = 6
scenarios = 200
seed = 7

[demand]
seasonality = [1.0, 1.2, 0.8]

[[demand.items]]
distribution = "normal"
mean = 100.0
std_dev = 20.0

[costs]
holding_cost_rate = 1.0
shortage_cost_rate = 4.0
shortage_mode = "lost-sale"
lead_time = 1

[policy_space]
kind = "order-up-to"
lower = 0.0
upper = 400.0
integer = true

[risk_measure]
kind = "cvar"
quantile = 0.9

[stopping]
max_iterations = 50
"#;

    #[test]
    fn parses_full_study() {
        let study = StudyConfig::from_toml_str(STUDY).unwrap();
        assert_eq!(study.horizon, 6);
        assert_eq!(study.seed, 7);
        assert_eq!(
            study.demand.items[0],
            DemandDistribution::Normal {
                mean: 100.0,
                std_dev: 20.0
            }
        );
        assert_eq!(study.costs.shortage_mode, ShortageMode::LostSale);
        assert_eq!(study.costs.ordering_cost_fixed, 0.0);
        assert_eq!(study.policy_space.kind, PolicyKind::OrderUpTo);
        assert_eq!(study.risk_measure, RiskMeasure::Cvar { quantile: 0.9 });
        assert_eq!(study.stopping.max_iterations, 50);
        study.validate().unwrap();
    }

    #[test]
    fn negative_cost_rate_is_rejected() {
        let costs = CostParams {
            holding_cost_rate: -1.0,
            ..CostParams::default()
        };
        assert!(matches!(
            costs.validate(),
            Err(StockingError::InvalidCostParams(_))
        ));
    }

    #[test]
    fn initial_inventory_broadcasts() {
        let costs = CostParams {
            initial_inventory: vec![5.0],
            ..CostParams::default()
        };
        assert_eq!(costs.initial_inventory_for(3), 5.0);
        assert!(costs.check_items(3).is_ok());

        let costs = CostParams {
            initial_inventory: vec![1.0, 2.0],
            ..CostParams::default()
        };
        assert_eq!(costs.initial_inventory_for(1), 2.0);
        assert!(costs.check_items(3).is_err());
    }

    #[test]
    fn item_overrides_replace_shared_rates() {
        let costs = CostParams {
            holding_cost_rate: 1.0,
            shortage_cost_rate: 4.0,
            items: vec![
                ItemCostOverrides::default(),
                ItemCostOverrides {
                    holding_cost_rate: Some(2.0),
                    min_stock: Some(5.0),
                    ..ItemCostOverrides::default()
                },
            ],
            ..CostParams::default()
        };
        assert_eq!(costs.item(0).holding_cost_rate, 1.0);
        assert_eq!(costs.item(1).holding_cost_rate, 2.0);
        assert_eq!(costs.item(1).shortage_cost_rate, 4.0);
        assert_eq!(costs.item(1).min_stock, 5.0);
        assert_eq!(costs.critical_ratios(2), vec![0.8, 4.0 / 6.0]);
        assert!(costs.check_items(2).is_ok());
        assert!(costs.check_items(3).is_err());
    }

    #[test]
    fn negative_override_is_rejected() {
        let costs = CostParams {
            items: vec![ItemCostOverrides {
                unit_price: Some(-1.0),
                ..ItemCostOverrides::default()
            }],
            ..CostParams::default()
        };
        assert!(matches!(
            costs.validate(),
            Err(StockingError::InvalidCostParams(_))
        ));
        let capped = CostParams {
            max_inventory_value: Some(f64::NAN),
            ..CostParams::default()
        };
        assert!(capped.validate().is_err());
    }

    #[test]
    fn parses_per_item_costs() {
        let text = r#"
horizon = 4
scenarios = 10

[demand]
[[demand.items]]
distribution = "poisson"
lambda = 5.0

[[demand.items]]
distribution = "poisson"
lambda = 9.0

[costs]
holding_cost_rate = 1.0
max_inventory_value = 500.0

[[costs.items]]
unit_price = 10.0

[[costs.items]]
unit_price = 25.0
shortage_cost_rate = 8.0

[policy_space]
kind = "order-up-to"
upper = 40.0
"#;
        let study = StudyConfig::from_toml_str(text).unwrap();
        assert_eq!(study.costs.max_inventory_value, Some(500.0));
        assert_eq!(study.costs.item(0).unit_price, 10.0);
        assert_eq!(study.costs.item(1).shortage_cost_rate, 8.0);
        assert_eq!(study.costs.item(1).holding_cost_rate, 1.0);
        study.validate().unwrap();
    }
}
