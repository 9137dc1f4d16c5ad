//! Monte Carlo inventory stocking optimization.
//!
//! The pipeline has three stages:
//!
//! 1. [`generate`] draws a [`ScenarioSet`] of demand trajectories from a
//!    seeded [`DemandModel`].
//! 2. [`evaluate`] simulates one [`StockingPolicy`] against one scenario and
//!    returns its [`CostBreakdown`].
//! 3. [`optimize`] searches a [`PolicySpace`] for the policy with the lowest
//!    [`RiskMeasure`] of cost across all scenarios.

pub mod error;
pub mod io;
pub mod model;
pub mod simulation;
pub mod strategy;

pub use error::{Result, StockingError};
pub use io::demand::{generate, Correlation, DemandDistribution, DemandModel, DemandSampler};
pub use model::scenario::{DemandScenario, ScenarioSet};
pub use simulation::config::{CostParams, ShortageMode, StudyConfig};
pub use simulation::engine::{evaluate, evaluate_all, evaluate_with_trace, CostBreakdown};
pub use strategy::implementations::StockingPolicy;
pub use strategy::risk::RiskMeasure;
pub use strategy::search::{optimize, OptimizationOutcome, SearchState, StoppingCriteria};
pub use strategy::space::{PolicyKind, PolicySpace, StartPoint};
