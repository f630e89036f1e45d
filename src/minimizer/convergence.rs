//! Termination states of a minimization.

use serde::{Deserialize, Serialize};

/// Why a minimization stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// No minimization has been run yet.
    NotRun,

    /// The relative parameter change fell below `xtol`.
    ParameterConvergence,

    /// The relative cost change fell below `ftol`.
    FunctionValueConvergence,

    /// The gradient norm fell below `gtol`.
    GradientConvergence,

    /// The evaluation budget was exhausted.
    CallLimitReached,

    /// The damping parameter hit its ceiling without improving the cost.
    DampingLimitReached,

    /// The cost became NaN or infinite.
    NumericalError,
}

impl ConvergenceStatus {
    /// Returns true if the minimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::NotRun => "No minimization has been run",
            ConvergenceStatus::ParameterConvergence => "Converged: small parameter change",
            ConvergenceStatus::FunctionValueConvergence => "Converged: small cost change",
            ConvergenceStatus::GradientConvergence => "Converged: small gradient",
            ConvergenceStatus::CallLimitReached => "Terminated: evaluation budget exhausted",
            ConvergenceStatus::DampingLimitReached => {
                "Terminated: damping reached its maximum without decreasing the cost"
            }
            ConvergenceStatus::NumericalError => "Terminated: non-finite cost",
        }
    }
}
