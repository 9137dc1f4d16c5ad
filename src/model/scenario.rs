// src/model/scenario.rs

use crate::error::{Result, StockingError};

/// One simulated future: demand per period for every item.
///
/// Stored row-major by period, so `period(t)` is a contiguous slice holding
/// the demand of every item in period `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandScenario {
    index: usize,
    horizon: usize,
    items: usize,
    demand: Vec<f64>,
}

impl DemandScenario {
    pub(crate) fn new(index: usize, horizon: usize, items: usize, demand: Vec<f64>) -> Self {
        debug_assert_eq!(demand.len(), horizon * items);
        Self {
            index,
            horizon,
            items,
            demand,
        }
    }

    /// Builds a single-item scenario from a demand sequence.
    pub fn single_item(index: usize, demand: Vec<f64>) -> Result<Self> {
        validate_values(&demand)?;
        Ok(Self::new(index, demand.len(), 1, demand))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn items(&self) -> usize {
        self.items
    }

    /// Demand for `item` in `period`.
    #[inline]
    pub fn demand(&self, period: usize, item: usize) -> f64 {
        self.demand[period * self.items + item]
    }

    /// Demand of every item in `period`.
    #[inline]
    pub fn period(&self, period: usize) -> &[f64] {
        let start = period * self.items;
        &self.demand[start..start + self.items]
    }

    /// Demand sequence of one item over the whole horizon.
    pub fn item_series(&self, item: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.horizon).map(move |t| self.demand(t, item))
    }

    /// Total demand across all periods and items.
    pub fn total_demand(&self) -> f64 {
        self.demand.iter().sum()
    }
}

/// An ordered collection of scenarios sharing horizon and item count.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    horizon: usize,
    items: usize,
    seed: Option<u64>,
    scenarios: Vec<DemandScenario>,
}

impl ScenarioSet {
    pub(crate) fn from_generated(
        horizon: usize,
        items: usize,
        seed: u64,
        scenarios: Vec<DemandScenario>,
    ) -> Self {
        Self {
            horizon,
            items,
            seed: Some(seed),
            scenarios,
        }
    }

    /// Builds a single-item set from caller-supplied demand sequences.
    ///
    /// Every row must have the same length and hold finite, non-negative
    /// values. An empty `rows` yields an empty set, which the optimizer rejects.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let horizon = rows.first().map(Vec::len).unwrap_or(0);
        let mut scenarios = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != horizon {
                return Err(StockingError::InvalidModelConfig(format!(
                    "scenario {} has {} periods, expected {}",
                    index,
                    row.len(),
                    horizon
                )));
            }
            scenarios.push(DemandScenario::single_item(index, row)?);
        }
        Ok(Self {
            horizon,
            items: 1,
            seed: None,
            scenarios,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn items(&self) -> usize {
        self.items
    }

    /// Seed the set was generated from, if it was generated.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn scenarios(&self) -> &[DemandScenario] {
        &self.scenarios
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DemandScenario> {
        self.scenarios.iter()
    }
}

fn validate_values(demand: &[f64]) -> Result<()> {
    match demand.iter().position(|d| !d.is_finite() || *d < 0.0) {
        Some(pos) => Err(StockingError::InvalidModelConfig(format!(
            "demand at period {} is {} (must be finite and non-negative)",
            pos, demand[pos]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_builds_indexed_scenarios() {
        let set = ScenarioSet::from_rows(vec![vec![8.0, 1.0], vec![10.0, 2.0], vec![12.0, 3.0]])
            .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.horizon(), 2);
        assert_eq!(set.items(), 1);
        assert_eq!(set.seed(), None);
        assert_eq!(set.scenarios()[2].index(), 2);
        assert_eq!(set.scenarios()[1].demand(1, 0), 2.0);
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let err = ScenarioSet::from_rows(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, StockingError::InvalidModelConfig(_)));
    }

    #[test]
    fn from_rows_rejects_negative_demand() {
        let err = ScenarioSet::from_rows(vec![vec![1.0, -2.0]]).unwrap_err();
        assert!(matches!(err, StockingError::InvalidModelConfig(_)));
    }

    #[test]
    fn period_slices_are_row_major() {
        let s = DemandScenario::new(0, 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(s.period(1), &[4.0, 5.0, 6.0]);
        assert_eq!(s.item_series(2).collect::<Vec<_>>(), vec![3.0, 6.0]);
        assert_eq!(s.total_demand(), 21.0);
    }
}
