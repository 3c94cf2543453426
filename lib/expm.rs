//! Action of `exp(-i τ H)` on a complex vector for real symmetric sparse `H`.
//!
//! The vector is projected onto an `m`-dimensional Krylov subspace with the
//! Lanczos process, the exponential of the small tridiagonal projection `T` is
//! formed from its eigendecomposition, and the result is mapped back:
//! ```text
//! exp(-iτH) v ≈ β₀ V exp(-iτT) e₁
//! ```
//! The step is accepted when the estimate `β₀ β_m |[exp(-iτT) e₁]_m|` is within
//! tolerance; otherwise `τ` is halved and the interval covered in sub-steps.

use ndarray as nd;
use ndarray_linalg::{ self as la, Eigh };
use num_complex::Complex64 as C64;
use crate::{
    config::ExpmParams,
    eigen::lanczos::tridiagonal,
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
};

const BREAKDOWN: f64 = 1e-13;

fn cnorm(v: &nd::Array1<C64>) -> f64 {
    v.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt()
}

fn cdot(u: &nd::Array1<C64>, v: &nd::Array1<C64>) -> C64 {
    u.iter().zip(v.iter()).map(|(a, b)| a.conj() * b).sum()
}

/// One Krylov step; returns the propagated vector and its error estimate.
fn krylov_step(h: &CsrMatrix, v: &nd::Array1<C64>, tau: f64, m: usize)
    -> ManyBodyResult<(nd::Array1<C64>, f64)>
{
    let beta0 = cnorm(v);
    if beta0 == 0.0 {
        return Ok((v.clone(), 0.0));
    }
    let mut basis: Vec<nd::Array1<C64>> = Vec::with_capacity(m);
    let mut alpha: Vec<f64> = Vec::with_capacity(m);
    let mut beta: Vec<f64> = Vec::with_capacity(m);
    let mut beta_last: f64 = 0.0;
    let mut anorm: f64 = 0.0;
    basis.push(v.mapv(|a| a / beta0));
    for j in 0..m {
        let mut w: nd::Array1<C64> = h.dot(&basis[j]);
        let a = cdot(&basis[j], &w).re;
        alpha.push(a);
        w.scaled_add(C64::from(-a), &basis[j]);
        if j > 0 {
            w.scaled_add(C64::from(-beta[j - 1]), &basis[j - 1]);
        }
        for q in basis.iter() {
            let c = cdot(q, &w);
            w.scaled_add(-c, q);
        }
        let b = cnorm(&w);
        anorm = anorm.max(a.abs() + b);
        if b <= BREAKDOWN * anorm.max(f64::MIN_POSITIVE) {
            // invariant subspace: the projection is exact
            beta_last = 0.0;
            break;
        }
        beta_last = b;
        if j + 1 == m {
            break;
        }
        beta.push(b);
        basis.push(w.mapv(|x| x / b));
    }
    let T = tridiagonal(&alpha, &beta);
    let (theta, S) = T.eigh(la::UPLO::Lower)?;
    let k = alpha.len();
    // coefficients of exp(-iτT) e₁ in the Krylov basis
    let phases: Vec<C64> = (0..k)
        .map(|l| (C64::i() * (-tau * theta[l])).exp() * S[[0, l]])
        .collect();
    let coeffs: Vec<C64> = (0..k)
        .map(|r| (0..k).map(|l| phases[l] * S[[r, l]]).sum())
        .collect();
    let mut out: nd::Array1<C64> = nd::Array1::zeros(v.len());
    for (q, c) in basis.iter().zip(coeffs.iter()) {
        out.scaled_add(*c * beta0, q);
    }
    let err = beta0 * beta_last * coeffs[k - 1].norm();
    Ok((out, err))
}

/// Compute `exp(-i dt H) psi`.
///
/// Fails with [`ManyBodyError::ExpmNonConvergence`] if a sub-step would have
/// to be halved more than `params.max_halvings` times.
pub fn expm_multiply(
    h: &CsrMatrix,
    psi: &nd::Array1<C64>,
    dt: f64,
    params: &ExpmParams,
) -> ManyBodyResult<nd::Array1<C64>>
{
    if psi.len() != h.ncols() || !h.is_square() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "cannot apply a {:?} operator to a vector of length {}",
            h.shape(), psi.len(),
        )));
    }
    if !dt.is_finite() {
        return Err(ManyBodyError::ExpmNonConvergence { dt, error: f64::NAN });
    }
    let m = params.krylov_dim.clamp(1, psi.len().max(1));
    let mut v = psi.clone();
    let mut remaining = dt;
    let mut tau = dt;
    let mut halvings: usize = 0;
    let mut substeps: usize = 0;
    while remaining.abs() > 1e-14 * dt.abs() {
        let step = if tau.abs() < remaining.abs() { tau } else { remaining };
        let (w, err) = krylov_step(h, &v, step, m)?;
        if err <= params.tol * cnorm(&v).max(f64::MIN_POSITIVE) {
            v = w;
            remaining -= step;
            substeps += 1;
        } else {
            halvings += 1;
            if halvings > params.max_halvings {
                return Err(ManyBodyError::ExpmNonConvergence { dt: step, error: err });
            }
            tau = step / 2.0;
        }
    }
    tracing::trace!(substeps, halvings, "expm_multiply");
    Ok(v)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eigen::lanczos::test::degenerate_hamiltonian;

    fn dense_expm_action(h: &CsrMatrix, psi: &nd::Array1<C64>, dt: f64)
        -> nd::Array1<C64>
    {
        let (e, V) = h.to_dense().eigh(la::UPLO::Lower).unwrap();
        let Vc = V.mapv(C64::from);
        let coeffs = Vc.t().dot(psi);
        let phased: nd::Array1<C64> = coeffs.iter().zip(e.iter())
            .map(|(c, l)| c * (C64::i() * (-dt * l)).exp())
            .collect();
        Vc.dot(&phased)
    }

    fn start_vector(n: usize) -> nd::Array1<C64> {
        let v: nd::Array1<C64> = (0..n)
            .map(|k| C64::new((k as f64 * 0.37).sin(), (k as f64 * 0.11).cos()))
            .collect();
        let n = cnorm(&v);
        v.mapv(|a| a / n)
    }

    #[test]
    fn matches_dense_exponential() {
        let h = degenerate_hamiltonian(6);
        let psi = start_vector(36);
        let params = ExpmParams { krylov_dim: 8, ..ExpmParams::default() };
        let dt = 2.5;
        let approx = expm_multiply(&h, &psi, dt, &params).unwrap();
        let exact = dense_expm_action(&h, &psi, dt);
        let diff: f64 = approx.iter().zip(exact.iter())
            .map(|(a, b)| (a - b).norm_sqr()).sum::<f64>().sqrt();
        assert!(diff < 1e-8);
        assert!((cnorm(&approx) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn zero_time_is_identity() {
        let h = degenerate_hamiltonian(4);
        let psi = start_vector(16);
        let out = expm_multiply(&h, &psi, 0.0, &ExpmParams::default()).unwrap();
        assert_eq!(out, psi);
    }

    #[test]
    fn eigenvector_picks_up_phase() {
        let h = CsrMatrix::from_diag(&nd::array![0.5, 1.5, 2.5]);
        let psi = nd::array![C64::new(0.0, 0.0), C64::new(1.0, 0.0), C64::new(0.0, 0.0)];
        let out = expm_multiply(&h, &psi, 0.3, &ExpmParams::default()).unwrap();
        let expected = (C64::i() * (-0.3 * 1.5)).exp();
        assert!((out[1] - expected).norm() < 1e-14);
        assert!(out[0].norm() < 1e-14 && out[2].norm() < 1e-14);
    }

    #[test]
    fn exhausted_halvings_are_fatal() {
        let h = degenerate_hamiltonian(4);
        let psi = start_vector(16);
        let params = ExpmParams { krylov_dim: 1, max_halvings: 0, ..ExpmParams::default() };
        assert!(matches!(
            expm_multiply(&h, &psi, 50.0, &params),
            Err(ManyBodyError::ExpmNonConvergence { .. }),
        ));
    }
}
