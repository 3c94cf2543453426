//! Diagonal pairwise-interaction operator on the many-body product space.

use itertools::Itertools;
use ndarray as nd;
use crate::{
    config::InteractionScheme,
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
};

/// View a `g x g` kernel as an `n`-axis array that is singleton everywhere
/// except on axes `i` and `j`. The kernel must be in standard layout.
fn pair_view(kernel: &nd::Array2<f64>, i: usize, j: usize, n: usize)
    -> ManyBodyResult<nd::ArrayViewD<'_, f64>>
{
    let g = kernel.nrows();
    let mut shape = vec![1; n];
    shape[i] = g;
    shape[j] = g;
    Ok(kernel.view().into_shape(nd::IxDyn(&shape))?)
}

/// Diagonal of the interaction operator for `n` particles, in flat
/// (most-significant-first) order: entry `(x_1, ..., x_n)` holds
/// `Σ_{i<j} v_int[x_i, x_j]`.
///
/// With [`InteractionScheme::LogDomain`], the pair factors `exp(v_int)` are
/// multiplied together by broadcasting over all `C(n, 2)` axis pairs, and a
/// single logarithm recovers the sum; this fails with
/// [`ManyBodyError::InteractionOverflow`] if any product leaves the range of
/// positive finite floats. [`InteractionScheme::PairSum`] adds the kernel
/// directly. Both give all zeros for `n < 2`.
pub fn interaction_diagonal(
    v_int: &nd::Array2<f64>,
    n: usize,
    scheme: InteractionScheme,
) -> ManyBodyResult<nd::Array1<f64>>
{
    let (g, g2) = v_int.dim();
    if g != g2 {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "interaction kernel must be square, got {:?}", v_int.dim())));
    }
    let dim = g.checked_pow(n as u32)
        .ok_or(ManyBodyError::StateSpaceTooLarge { grid: g, count: n })?;
    if n < 2 {
        return Ok(nd::Array1::zeros(dim));
    }
    let v_int = v_int.as_standard_layout().into_owned();
    let shape = nd::IxDyn(&vec![g; n]);
    let diag: nd::ArrayD<f64> = match scheme {
        InteractionScheme::LogDomain => {
            let expv = v_int.mapv(f64::exp);
            let mut prod: nd::ArrayD<f64> = nd::ArrayD::ones(shape);
            for (i, j) in (0..n).tuple_combinations() {
                prod *= &pair_view(&expv, i, j, n)?;
            }
            if let Some((index, &value))
                = prod.iter().enumerate()
                .find(|(_, p)| !(p.is_finite() && **p > 0.0))
            {
                return Err(ManyBodyError::InteractionOverflow { index, value });
            }
            prod.mapv_into(f64::ln)
        },
        InteractionScheme::PairSum => {
            let mut sum: nd::ArrayD<f64> = nd::ArrayD::zeros(shape);
            for (i, j) in (0..n).tuple_combinations() {
                sum += &pair_view(&v_int, i, j, n)?;
            }
            sum
        },
    };
    Ok(nd::Array1::from_vec(diag.into_raw_vec()))
}

/// Interaction operator as a sparse diagonal matrix.
pub fn interaction_operator(
    v_int: &nd::Array2<f64>,
    n: usize,
    scheme: InteractionScheme,
) -> ManyBodyResult<CsrMatrix>
{
    interaction_diagonal(v_int, n, scheme)
        .map(|diag| CsrMatrix::from_diag(&diag))
}
