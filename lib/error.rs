//! Errors produced while assembling, solving, or propagating a many-body
//! system.

use ndarray as nd;
use ndarray_linalg::error::LinalgError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManyBodyError {
    /// Returned when a [`System`][crate::system::System] is constructed from
    /// inconsistent inputs.
    #[error("error in system creation: {0}")]
    InvalidSystem(String),

    /// Returned when a spin string contains something other than `u` or `d`.
    #[error("error in system creation: invalid spin label '{0}'; expected 'u' or 'd'")]
    InvalidSpin(char),

    /// Returned when `grid_size^count` does not fit in the address space.
    #[error("error in system creation: state space of {grid}^{count} is too large")]
    StateSpaceTooLarge { grid: usize, count: usize },

    /// Returned when two arrays that should agree in shape do not.
    #[error("error in array handling: {0}")]
    ShapeMismatch(String),

    /// Returned when a time grid is too short, non-monotonic, or non-uniform.
    #[error("error in propagation: invalid time grid: {0}")]
    InvalidTimeGrid(String),

    /// Returned when the number of requested eigenpairs is zero or exceeds the
    /// dimension of the operator.
    #[error("error in eigen-solve: cannot compute {level} eigenpairs of a {dim}-dimensional operator")]
    InvalidLevel { level: usize, dim: usize },

    /// Returned when the iterative eigensolver runs out of restarts.
    #[error("error in eigen-solve: {converged} of {requested} eigenpairs converged after {restarts} restarts")]
    EigenNonConvergence { requested: usize, converged: usize, restarts: usize },

    /// Returned when `H - σI` has a zero pivot in shift-invert mode.
    #[error("error in eigen-solve: shifted operator is singular at pivot {pivot} (shift {shift})")]
    SingularShift { pivot: usize, shift: f64 },

    /// Returned when `H - σI` admits no sparse Cholesky factorization and is
    /// too wide for the banded LU fallback.
    #[error("error in eigen-solve: cannot factor shifted operator (shift {shift}): {detail}")]
    ShiftFactorization { shift: f64, detail: String },

    /// Returned when the log-domain interaction contraction leaves the range
    /// of finite, positive floats.
    #[error("error in interaction assembly: log-domain contraction overflowed at flat index {index} (value {value:e})")]
    InteractionOverflow { index: usize, value: f64 },

    /// Returned when fewer antisymmetrized states survive than are needed to
    /// reach the requested energy level.
    ///
    /// This is the only recoverable error: retry with a larger `level`.
    #[error("error in antisymmetrization: requested state {requested} but only {found} survived from {level} raw eigenpairs; retry with a larger level")]
    ExcitationShortfall { requested: usize, level: usize, found: usize },

    /// Returned when the Krylov matrix-exponential action cannot reach its
    /// tolerance within the allowed number of sub-step halvings.
    #[error("error in matrix exponential: no convergence for dt = {dt:e} (error estimate {error:e})")]
    ExpmNonConvergence { dt: f64, error: f64 },

    /// Returned when the wavefunction norm drifts away from 1 during
    /// propagation.
    #[error("error in propagation: norm drifted to {norm} at step {step} (tolerance {tol:e})")]
    PropagationInstability { step: usize, norm: f64, tol: f64 },

    /// Returned when the initial wavefunction handed to the propagator is not
    /// normalized with respect to the grid volume element.
    #[error("error in propagation: initial state has norm {norm} (tolerance {tol:e})")]
    UnnormalizedState { norm: f64, tol: f64 },

    /// Returned when a configuration value is missing, mistyped, or unknown.
    #[error("error in configuration: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    #[error("array shape error: {0}")]
    Shape(#[from] nd::ShapeError),
}
pub type ManyBodyResult<T> = Result<T, ManyBodyError>;

impl ManyBodyError {
    /// Return `true` if the failed call can be retried with different
    /// arguments, i.e. a larger excitation budget.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ExcitationShortfall { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_shortfall_is_recoverable() {
        let shortfall = ManyBodyError::ExcitationShortfall {
            requested: 3, level: 8, found: 2 };
        assert!(shortfall.is_recoverable());
        assert!(shortfall.to_string().contains("retry with a larger level"));
        let fatal = ManyBodyError::EigenNonConvergence {
            requested: 4, converged: 1, restarts: 64 };
        assert!(!fatal.is_recoverable());
        assert!(!ManyBodyError::InvalidSpin('x').is_recoverable());
    }
}
