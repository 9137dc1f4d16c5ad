// src/strategy/optimization.rs

//! Newsvendor calculations used to seed the stocking search.
//!
//! The classical result: with per-unit holding cost h and per-unit shortage
//! cost p, the cost-minimising single-period stock is the demand quantile at
//! the critical ratio p / (p + h). Applied to the empirical distribution of
//! the scenario set this gives a strong starting candidate.

use crate::model::scenario::ScenarioSet;

/// Calculates the Critical Ratio (Target Service Level).
///
/// Formula: CR = ShortageCost / (ShortageCost + HoldingCost)
pub fn critical_ratio(shortage_cost: f64, holding_cost: f64) -> f64 {
    if shortage_cost + holding_cost == 0.0 {
        return 0.0;
    }
    shortage_cost / (shortage_cost + holding_cost)
}

/// Empirical quantile (left-continuous inverse CDF) of `values` at `p`.
///
/// Returns the smallest sample x with at least a fraction `p` of the samples
/// at or below x. Sorts `values` in place. Empty input yields 0.
pub fn empirical_quantile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let rank = (p.clamp(0.0, 1.0) * n as f64).ceil() as usize;
    values[rank.saturating_sub(1).min(n - 1)]
}

/// Per-item stock levels at the critical fractile of demand accumulated over
/// `window` consecutive periods. `ratios` holds one critical ratio per item.
///
/// Every scenario and every start period contributes one window sum. A window
/// longer than the horizon is truncated to the horizon; a zero window yields
/// zero levels.
pub fn critical_fractile_levels(scenarios: &ScenarioSet, window: usize, ratios: &[f64]) -> Vec<f64> {
    let items = scenarios.items();
    let horizon = scenarios.horizon();
    if window == 0 || horizon == 0 {
        return vec![0.0; items];
    }
    let window = window.min(horizon);
    let starts = horizon - window + 1;

    (0..items)
        .map(|item| {
            let mut sums = Vec::with_capacity(scenarios.len() * starts);
            for scenario in scenarios.iter() {
                for start in 0..starts {
                    sums.push((start..start + window).map(|t| scenario.demand(t, item)).sum());
                }
            }
            empirical_quantile(&mut sums, ratios[item])
        })
        .collect()
}

/// Per-period, per-item order quantities at the critical fractile of that
/// period's demand across scenarios. Row-major by period.
pub fn critical_fractile_plan(scenarios: &ScenarioSet, ratios: &[f64]) -> Vec<f64> {
    let items = scenarios.items();
    let mut plan = Vec::with_capacity(scenarios.horizon() * items);
    let mut column = Vec::with_capacity(scenarios.len());
    for period in 0..scenarios.horizon() {
        for item in 0..items {
            column.clear();
            column.extend(scenarios.iter().map(|s| s.demand(period, item)));
            plan.push(empirical_quantile(&mut column, ratios[item]));
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_ratio_of_newsvendor() {
        assert_eq!(critical_ratio(4.0, 1.0), 0.8);
        assert_eq!(critical_ratio(0.0, 0.0), 0.0);
    }

    #[test]
    fn quantile_picks_order_statistic() {
        let mut v = vec![12.0, 8.0, 10.0];
        assert_eq!(empirical_quantile(&mut v, 0.8), 12.0);
        assert_eq!(empirical_quantile(&mut v, 0.5), 10.0);
        assert_eq!(empirical_quantile(&mut v, 0.0), 8.0);
        assert_eq!(empirical_quantile(&mut v, 1.0), 12.0);
        assert_eq!(empirical_quantile(&mut [], 0.5), 0.0);
    }

    #[test]
    fn fractile_levels_use_window_sums() {
        let set = ScenarioSet::from_rows(vec![vec![1.0, 2.0, 3.0], vec![2.0, 2.0, 2.0]]).unwrap();
        // Window sums: 3, 5, 4, 4
        assert_eq!(critical_fractile_levels(&set, 2, &[1.0]), vec![5.0]);
        assert_eq!(critical_fractile_levels(&set, 2, &[0.0]), vec![3.0]);
        assert_eq!(critical_fractile_levels(&set, 0, &[0.5]), vec![0.0]);
        // Window longer than horizon collapses to the full sum
        assert_eq!(critical_fractile_levels(&set, 10, &[1.0]), vec![6.0]);
    }

    #[test]
    fn fractile_plan_is_per_period() {
        let set = ScenarioSet::from_rows(vec![vec![8.0, 1.0], vec![10.0, 5.0], vec![12.0, 3.0]])
            .unwrap();
        assert_eq!(critical_fractile_plan(&set, &[0.8]), vec![12.0, 5.0]);
    }
}
