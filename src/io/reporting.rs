// src/io/reporting.rs

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::model::scenario::ScenarioSet;
use crate::simulation::engine::PeriodRecord;
use crate::strategy::search::IterationRecord;

/// One demand value in long format.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRow {
    pub scenario: usize,
    pub period: usize,
    pub item: usize,
    pub demand: f64,
}

/// Writes serde records to a CSV file with a header row.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    for record in records {
        wtr.serialize(record)?;
    }

    // Flush the buffer to ensure all data is written
    wtr.flush()?;

    info!(rows = records.len(), path = %path.display(), "exported csv");
    Ok(())
}

/// Writes a per-period simulation history.
pub fn write_simulation_log(path: &Path, history: &[PeriodRecord]) -> csv::Result<()> {
    write_records(path, history)
}

/// Writes the optimizer's per-iteration objective trace.
pub fn write_objective_trace(path: &Path, trace: &[IterationRecord]) -> csv::Result<()> {
    write_records(path, trace)
}

/// Flattens a scenario set into one row per scenario, period and item.
pub fn scenario_rows(scenarios: &ScenarioSet) -> Vec<ScenarioRow> {
    let mut rows = Vec::with_capacity(scenarios.len() * scenarios.horizon() * scenarios.items());
    for s in scenarios.iter() {
        for period in 0..s.horizon() {
            for (item, &demand) in s.period(period).iter().enumerate() {
                rows.push(ScenarioRow {
                    scenario: s.index(),
                    period,
                    item,
                    demand,
                });
            }
        }
    }
    rows
}

/// Writes a scenario set in long format.
pub fn write_scenarios(path: &Path, scenarios: &ScenarioSet) -> csv::Result<()> {
    write_records(path, &scenario_rows(scenarios))
}
