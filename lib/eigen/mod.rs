//! Lowest eigenpairs of large sparse symmetric Hamiltonians.
//!
//! Two interchangeable backends implement [`EigenBackend`]:
//! - [`SparseLanczos`]: restarted Lanczos directly on `H`
//! - [`ShiftInvert`]: Lanczos on `(H - σI)^-1` via a banded LU factorization
//!
//! Both return eigenvalues in ascending order with eigenvectors as the
//! matching columns of [`Spectrum::states`].

use ndarray as nd;
use crate::{
    config::{ Backend, SolverConfig },
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
};

pub mod lanczos;
pub mod shift_invert;

pub use lanczos::SparseLanczos;
pub use shift_invert::ShiftInvert;

/// Eigenvalues in ascending order with their eigenvectors as columns.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub energies: nd::Array1<f64>,
    pub states: nd::Array2<f64>,
}

impl Spectrum {
    /// Number of eigenpairs.
    pub fn len(&self) -> usize { self.energies.len() }

    pub fn is_empty(&self) -> bool { self.energies.is_empty() }
}

/// A method of computing the `level` smallest-algebraic eigenpairs of a real
/// symmetric sparse matrix.
pub trait EigenBackend {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Compute the `level` lowest eigenpairs of `h`, ascending.
    fn lowest(&self, h: &CsrMatrix, level: usize) -> ManyBodyResult<Spectrum>;
}

impl Backend {
    /// Construct the backend named by `self` from solver parameters.
    pub fn solver(self, config: &SolverConfig) -> Box<dyn EigenBackend> {
        match self {
            Self::Cpu => Box::new(SparseLanczos::new(config.lanczos)),
            Self::Gpu => Box::new(ShiftInvert::new(config.shift, config.lanczos)),
        }
    }
}

/// Check that `level` eigenpairs can be computed for `h`.
pub(crate) fn check_request(h: &CsrMatrix, level: usize) -> ManyBodyResult<()> {
    if !h.is_square() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "eigen-solve requires a square matrix, got {:?}", h.shape())));
    }
    if level == 0 || level > h.nrows() {
        return Err(ManyBodyError::InvalidLevel { level, dim: h.nrows() });
    }
    Ok(())
}
