// src/strategy/search.rs

//! Derivative-free search over stocking policies.
//!
//! The objective is an aggregate over discrete scenario simulations and is
//! neither smooth nor differentiable, so the optimizer uses a compass
//! (pattern) search: poll `±step` along every coordinate, move to the best
//! improving poll point, and halve the step whenever a poll fails.
//!
//! Control flow is an explicit state machine. After each iteration
//! [`StoppingCriteria::next_state`] maps the run's progress to
//! [`SearchState::Searching`], [`SearchState::Converged`] or
//! [`SearchState::Aborted`].

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StockingError};
use crate::model::scenario::ScenarioSet;
use crate::simulation::config::CostParams;
use crate::simulation::engine::evaluate_all;
use crate::strategy::implementations::StockingPolicy;
use crate::strategy::risk::RiskMeasure;
use crate::strategy::space::PolicySpace;

/// When the search stops. Whichever limit triggers first wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingCriteria {
    /// Iterations including the evaluation of the start candidate.
    pub max_iterations: usize,
    /// Moves that improve the objective by no more than this are rejected,
    /// and a poll whose best gain is positive but within it ends the search.
    pub objective_improvement_tolerance: f64,
    /// Checked between iterations, never mid-evaluation.
    pub max_wall_time_secs: Option<f64>,
    /// The search has converged once the poll step would drop below this.
    pub min_step: f64,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            objective_improvement_tolerance: 1e-9,
            max_wall_time_secs: None,
            min_step: 1e-3,
        }
    }
}

impl StoppingCriteria {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_wall_time(mut self, limit: Duration) -> Self {
        self.max_wall_time_secs = Some(limit.as_secs_f64());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(StockingError::InvalidSearchConfig(msg));
        if self.max_iterations == 0 {
            return bad("max_iterations must be at least 1".to_string());
        }
        if !self.objective_improvement_tolerance.is_finite()
            || self.objective_improvement_tolerance < 0.0
        {
            return bad(format!(
                "objective_improvement_tolerance {} must be finite and >= 0",
                self.objective_improvement_tolerance
            ));
        }
        if let Some(secs) = self.max_wall_time_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return bad(format!(
                    "max_wall_time_secs {} must be a non-negative, representable duration",
                    secs
                ));
            }
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return bad(format!("min_step {} must be positive", self.min_step));
        }
        Ok(())
    }

    /// Unset, or not representable as a [`Duration`], means no limit;
    /// `validate` rejects the latter.
    pub fn wall_time_limit(&self) -> Option<Duration> {
        self.max_wall_time_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Transition after a completed iteration.
    ///
    /// `improvement` is how far the best poll point undercut the incumbent
    /// (`None` when nothing was polled). The search has converged when the
    /// mesh is exhausted or when that gain is positive but no larger than
    /// `objective_improvement_tolerance`. Convergence outranks the limits
    /// when both happen on the same iteration.
    pub fn next_state(
        &self,
        iterations_done: usize,
        elapsed: Duration,
        improvement: Option<f64>,
        mesh_exhausted: bool,
    ) -> SearchState {
        let stalled = improvement
            .is_some_and(|gain| gain > 0.0 && gain <= self.objective_improvement_tolerance);
        if mesh_exhausted || stalled {
            SearchState::Converged
        } else if iterations_done >= self.max_iterations {
            SearchState::Aborted(AbortReason::IterationLimit)
        } else if self.wall_time_limit().is_some_and(|limit| elapsed >= limit) {
            SearchState::Aborted(AbortReason::WallTime)
        } else {
            SearchState::Searching
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    IterationLimit,
    WallTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchState {
    Searching,
    Converged,
    Aborted(AbortReason),
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Searching => write!(f, "searching"),
            SearchState::Converged => write!(f, "converged"),
            SearchState::Aborted(AbortReason::IterationLimit) => {
                write!(f, "stopped at iteration limit")
            }
            SearchState::Aborted(AbortReason::WallTime) => write!(f, "stopped at wall-time limit"),
        }
    }
}

/// One row of the objective trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Incumbent objective after this iteration.
    pub best_objective: f64,
    /// Best objective among this iteration's candidates.
    pub iteration_objective: f64,
    pub step: f64,
    pub candidates: usize,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub iterations: usize,
    pub trace: Vec<IterationRecord>,
    /// Cost evaluator invocations (candidates x scenarios).
    pub total_evaluations: usize,
    pub termination: SearchState,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub best_policy: StockingPolicy,
    pub best_objective: f64,
    pub diagnostics: Diagnostics,
}

/// Finds the policy in `space` minimising `risk` over `scenarios`.
///
/// Always returns the best policy observed, including on early
/// termination. Evaluator failures abort the run with the candidate and
/// scenario that caused them.
pub fn optimize(
    scenarios: &ScenarioSet,
    costs: &CostParams,
    space: &PolicySpace,
    risk: RiskMeasure,
    stopping: &StoppingCriteria,
) -> Result<OptimizationOutcome> {
    if scenarios.is_empty() {
        return Err(StockingError::EmptyScenarioSet);
    }
    space.validate()?;
    risk.validate()?;
    stopping.validate()?;
    costs.validate()?;

    PatternSearch {
        scenarios,
        costs,
        space,
        risk,
        stopping,
    }
    .run()
}

/// A decision vector with its evaluated objective.
#[derive(Debug, Clone)]
struct Candidate {
    x: Vec<f64>,
    policy: StockingPolicy,
    objective: f64,
    total_quantity: f64,
}

impl Candidate {
    /// Strictly lower objective beyond `tolerance`, or an exact tie with less
    /// stock.
    fn improves_on(&self, other: &Candidate, tolerance: f64) -> bool {
        self.objective < other.objective - tolerance
            || (self.objective == other.objective && self.total_quantity < other.total_quantity)
    }
}

struct PatternSearch<'a> {
    scenarios: &'a ScenarioSet,
    costs: &'a CostParams,
    space: &'a PolicySpace,
    risk: RiskMeasure,
    stopping: &'a StoppingCriteria,
}

impl PatternSearch<'_> {
    fn run(&self) -> Result<OptimizationOutcome> {
        let started = Instant::now();
        let items = self.scenarios.items();
        let n = self.scenarios.len();
        let tolerance = self.stopping.objective_improvement_tolerance;
        let step_floor = self.space.step_floor(self.stopping.min_step);

        info!(
            scenarios = n,
            horizon = self.scenarios.horizon(),
            items,
            dimension = self.space.dimension(self.scenarios.horizon(), items),
            risk = ?self.risk,
            "starting stocking search"
        );

        // Iteration 1: the start candidate
        let start = self.space.start_vector(self.scenarios, self.costs);
        let mut incumbent = self.evaluate_candidate(start)?;
        let mut step = self.space.initial_step_size();
        let mut iterations = 1;
        let mut total_evaluations = n;
        let mut trace = vec![IterationRecord {
            iteration: 1,
            best_objective: incumbent.objective,
            iteration_objective: incumbent.objective,
            step,
            candidates: 1,
            accepted: true,
        }];
        let mut state = self
            .stopping
            .next_state(iterations, started.elapsed(), None, false);

        while state == SearchState::Searching {
            let poll = self.poll_points(&incumbent.x, step, items);
            let evaluated = self.evaluate_generation(poll)?;
            let candidates = evaluated.len();
            iterations += 1;
            total_evaluations += candidates * n;

            let best_poll = evaluated.into_iter().reduce(|best, c| {
                if c.improves_on(&best, 0.0) {
                    c
                } else {
                    best
                }
            });
            let iteration_objective = best_poll.as_ref().map_or(f64::NAN, |c| c.objective);
            let improvement = best_poll
                .as_ref()
                .map(|c| incumbent.objective - c.objective);

            let accepted = match best_poll {
                Some(c) if c.improves_on(&incumbent, tolerance) => {
                    incumbent = c;
                    true
                }
                _ => false,
            };
            let mut mesh_exhausted = false;
            if !accepted {
                step = if self.space.integer {
                    (step / 2.0).floor()
                } else {
                    step / 2.0
                };
                mesh_exhausted = step < step_floor;
            }

            debug!(
                iteration = iterations,
                objective = incumbent.objective,
                step,
                accepted,
                "search iteration"
            );
            trace.push(IterationRecord {
                iteration: iterations,
                best_objective: incumbent.objective,
                iteration_objective,
                step,
                candidates,
                accepted,
            });

            state = self
                .stopping
                .next_state(iterations, started.elapsed(), improvement, mesh_exhausted);
        }

        let elapsed = started.elapsed();
        match state {
            SearchState::Aborted(reason) => warn!(
                ?reason,
                iterations,
                objective = incumbent.objective,
                "search stopped before convergence"
            ),
            _ => info!(
                iterations,
                objective = incumbent.objective,
                evaluations = total_evaluations,
                "search converged"
            ),
        }

        Ok(OptimizationOutcome {
            best_policy: incumbent.policy,
            best_objective: incumbent.objective,
            diagnostics: Diagnostics {
                iterations,
                trace,
                total_evaluations,
                termination: state,
                elapsed,
            },
        })
    }

    /// Distinct feasible points `±step` away from `x` along each coordinate.
    fn poll_points(&self, x: &[f64], step: f64, items: usize) -> Vec<Vec<f64>> {
        let mut points: Vec<Vec<f64>> = Vec::with_capacity(2 * x.len());
        for i in 0..x.len() {
            for direction in [1.0, -1.0] {
                let mut point = x.to_vec();
                point[i] += direction * step;
                self.space.project(&mut point, items);
                if point.as_slice() != x && !points.contains(&point) {
                    points.push(point);
                }
            }
        }
        points
    }

    /// Evaluates one generation of candidates against every scenario.
    ///
    /// Candidates are independent and evaluated concurrently; the first
    /// failure in candidate order is returned.
    fn evaluate_generation(&self, points: Vec<Vec<f64>>) -> Result<Vec<Candidate>> {
        #[cfg(feature = "parallel")]
        let results: Vec<Result<Candidate>> = {
            use rayon::prelude::*;
            points
                .into_par_iter()
                .map(|x| self.evaluate_candidate(x))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<Candidate>> = points
            .into_iter()
            .map(|x| self.evaluate_candidate(x))
            .collect();

        results.into_iter().collect()
    }

    fn evaluate_candidate(&self, x: Vec<f64>) -> Result<Candidate> {
        let policy = self.space.decode(&x, self.scenarios.items());
        let totals: Vec<f64> = evaluate_all(&policy, self.scenarios, self.costs)?
            .iter()
            .map(|b| b.total)
            .collect();
        let objective = self.risk.aggregate(&totals);
        Ok(Candidate {
            total_quantity: policy.total_quantity(),
            x,
            policy,
            objective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convergence_outranks_limits() {
        let stopping = StoppingCriteria::default()
            .with_max_iterations(3)
            .with_wall_time(Duration::from_secs(1));
        assert_eq!(
            stopping.next_state(3, Duration::from_secs(5), None, true),
            SearchState::Converged
        );
        assert_eq!(
            stopping.next_state(3, Duration::from_secs(5), None, false),
            SearchState::Aborted(AbortReason::IterationLimit)
        );
        assert_eq!(
            stopping.next_state(2, Duration::from_secs(1), None, false),
            SearchState::Aborted(AbortReason::WallTime)
        );
        assert_eq!(
            stopping.next_state(2, Duration::from_millis(10), None, false),
            SearchState::Searching
        );
    }

    #[test]
    fn gain_within_tolerance_converges() {
        let stopping = StoppingCriteria {
            objective_improvement_tolerance: 0.5,
            ..StoppingCriteria::default()
        };
        let now = Duration::ZERO;
        assert_eq!(stopping.next_state(4, now, Some(0.25), false), SearchState::Converged);
        assert_eq!(stopping.next_state(4, now, Some(0.5), false), SearchState::Converged);
        // Larger gains were accepted; a worse poll only refines the mesh
        assert_eq!(stopping.next_state(4, now, Some(0.75), false), SearchState::Searching);
        assert_eq!(stopping.next_state(4, now, Some(-1.0), false), SearchState::Searching);
        assert_eq!(stopping.next_state(4, now, Some(0.0), false), SearchState::Searching);
        assert_eq!(stopping.next_state(4, now, None, false), SearchState::Searching);
    }

    #[test]
    fn huge_tolerance_stops_after_first_poll() {
        let set = ScenarioSet::from_rows(vec![vec![8.0], vec![10.0], vec![12.0]]).unwrap();
        let costs = CostParams {
            holding_cost_rate: 1.0,
            shortage_cost_rate: 4.0,
            ..CostParams::default()
        };
        let space = PolicySpace::new(crate::strategy::space::PolicyKind::OrderUpTo, 0.0, 20.0);
        let stopping = StoppingCriteria {
            objective_improvement_tolerance: 1e9,
            min_step: 1e-9,
            ..StoppingCriteria::default()
        };
        let outcome = optimize(&set, &costs, &space, RiskMeasure::Mean, &stopping).unwrap();
        // The poll from 10 at step 5 finds nothing better, so the step halves;
        // from step 2.5 the point 12.5 undercuts 10 by a positive gain
        assert_eq!(outcome.diagnostics.termination, SearchState::Converged);
        assert_eq!(outcome.diagnostics.iterations, 3);
        assert_eq!(
            outcome.best_policy,
            StockingPolicy::OrderUpTo(crate::strategy::implementations::BaseStockPolicy::new(
                vec![10.0]
            ))
        );
    }

    #[test]
    fn unrepresentable_wall_time_is_rejected() {
        let stopping = StoppingCriteria {
            max_wall_time_secs: Some(1e20),
            ..StoppingCriteria::default()
        };
        assert!(matches!(
            stopping.validate(),
            Err(StockingError::InvalidSearchConfig(_))
        ));
        assert_eq!(stopping.wall_time_limit(), None);

        let set = ScenarioSet::from_rows(vec![vec![1.0]]).unwrap();
        let space = PolicySpace::new(crate::strategy::space::PolicyKind::OrderUpTo, 0.0, 4.0);
        let err = optimize(&set, &CostParams::default(), &space, RiskMeasure::Mean, &stopping)
            .unwrap_err();
        assert!(matches!(err, StockingError::InvalidSearchConfig(_)));

        let negative = StoppingCriteria {
            max_wall_time_secs: Some(-1.0),
            ..StoppingCriteria::default()
        };
        assert!(negative.validate().is_err());
        let fine = StoppingCriteria::default().with_wall_time(Duration::from_secs(30));
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn rejects_bad_stopping_criteria() {
        assert!(StoppingCriteria::default().validate().is_ok());
        let zero = StoppingCriteria::default().with_max_iterations(0);
        assert!(matches!(
            zero.validate(),
            Err(StockingError::InvalidSearchConfig(_))
        ));
        let negative = StoppingCriteria {
            min_step: -1.0,
            ..StoppingCriteria::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn tie_break_prefers_less_stock() {
        let candidate = |objective: f64, s: f64| Candidate {
            x: vec![s],
            policy: StockingPolicy::OrderUpTo(
                crate::strategy::implementations::BaseStockPolicy::new(vec![s]),
            ),
            objective,
            total_quantity: s,
        };
        let incumbent = candidate(5.0, 10.0);
        assert!(candidate(5.0, 8.0).improves_on(&incumbent, 1e-6));
        assert!(!candidate(5.0, 12.0).improves_on(&incumbent, 1e-6));
        // Within tolerance is not an improvement
        assert!(!candidate(5.0 - 1e-7, 12.0).improves_on(&incumbent, 1e-6));
        assert!(candidate(4.0, 12.0).improves_on(&incumbent, 1e-6));
    }

    #[test]
    fn poll_skips_infeasible_duplicates() {
        let set = ScenarioSet::from_rows(vec![vec![1.0]]).unwrap();
        let costs = CostParams::default();
        let space = PolicySpace::new(crate::strategy::space::PolicyKind::OrderUpTo, 0.0, 10.0);
        let stopping = StoppingCriteria::default();
        let search = PatternSearch {
            scenarios: &set,
            costs: &costs,
            space: &space,
            risk: RiskMeasure::Mean,
            stopping: &stopping,
        };
        assert_eq!(search.poll_points(&[10.0], 2.0, 1), vec![vec![8.0]]);
        assert_eq!(search.poll_points(&[5.0], 2.0, 1), vec![vec![7.0], vec![3.0]]);
    }
}
