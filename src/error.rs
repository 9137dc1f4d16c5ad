// src/error.rs

//! Error types shared by the generator, the evaluator and the optimizer.

use thiserror::Error;

/// Errors raised by the stocking pipeline.
///
/// Every error is raised at the call that detects it. Nothing is retried and
/// nothing is skipped: a bad scenario would bias the sample average.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StockingError {
    /// The demand model parameters are out of domain.
    #[error("Invalid demand model: {0}")]
    InvalidModelConfig(String),

    /// A simulation was requested over zero periods.
    #[error("Invalid horizon: {horizon} (must be > 0)")]
    InvalidHorizon { horizon: usize },

    /// The policy cannot be applied to the scenario it was paired with.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Cost rates must be finite and non-negative.
    #[error("Invalid cost parameters: {0}")]
    InvalidCostParams(String),

    /// Risk measure or stopping criteria are out of range.
    #[error("Invalid search configuration: {0}")]
    InvalidSearchConfig(String),

    /// The optimizer was handed a scenario set with no members.
    #[error("Scenario set is empty")]
    EmptyScenarioSet,

    /// The configured bounds admit no candidate policy.
    #[error("Infeasible policy space: {0}")]
    InfeasiblePolicySpace(String),

    /// An evaluator failure inside an optimization run.
    #[error("Evaluation of {candidate} failed on scenario {scenario}: {source}")]
    Evaluation {
        candidate: String,
        scenario: usize,
        #[source]
        source: Box<StockingError>,
    },
}

impl StockingError {
    /// Wraps an evaluator error with the candidate and scenario that caused it.
    pub fn in_evaluation(candidate: impl Into<String>, scenario: usize, source: StockingError) -> Self {
        Self::Evaluation {
            candidate: candidate.into(),
            scenario,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, StockingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_names_candidate_and_scenario() {
        let err = StockingError::in_evaluation(
            "order-up-to [12]",
            3,
            StockingError::InvalidHorizon { horizon: 0 },
        );
        let msg = err.to_string();
        assert!(msg.contains("order-up-to [12]"));
        assert!(msg.contains("scenario 3"));
        assert!(msg.contains("horizon"));
    }
}
