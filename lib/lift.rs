//! Embedding of single-particle operators into the many-body product space.
//!
//! Axis ordering throughout the crate is most-significant-first: the flat
//! index of the multi-index `(x_1, ..., x_n)` is `x_1 g^(n-1) + ... + x_n`,
//! which is also the row-major layout of an `n`-axis `ndarray`.

use crate::sparse::CsrMatrix;

/// Ordered Kronecker factors for the term in which `op` acts on slot `k`,
/// counting slots from the last particle, and `eye` acts on all others.
///
/// Factor `i` is `op` if `i + k == n - 1`.
pub fn partial_operators<'a>(
    op: &'a CsrMatrix,
    eye: &'a CsrMatrix,
    k: usize,
    n: usize,
) -> Vec<&'a CsrMatrix>
{
    (0..n).map(|i| if i + k + 1 == n { op } else { eye }).collect()
}

/// Left-to-right Kronecker product of a sequence of factors:
/// `((F_0 ⊗ F_1) ⊗ F_2) ⊗ ...`.
///
/// An empty sequence gives the `1 x 1` identity.
pub fn kron_fold<'a, I>(factors: I) -> CsrMatrix
where I: IntoIterator<Item = &'a CsrMatrix>
{
    let mut factors = factors.into_iter();
    match factors.next() {
        Some(first) => factors.fold(first.clone(), |acc, f| acc.kron(f)),
        None => CsrMatrix::eye(1),
    }
}

/// `op` acting on particle `axis` of `n` (most significant first), identity
/// elsewhere.
///
/// *Panics* if `op` is not square or `axis >= n`.
pub fn lift_at(op: &CsrMatrix, axis: usize, n: usize) -> CsrMatrix {
    assert!(op.is_square(), "lift_at: operator is not square");
    assert!(axis < n, "lift_at: axis {} out of range for {} particles", axis, n);
    let eye = CsrMatrix::eye(op.nrows());
    kron_fold(partial_operators(op, &eye, n - 1 - axis, n))
}

/// Lift a single-particle operator to `n` particles:
/// `Σ_k I ⊗ ... ⊗ op ⊗ ... ⊗ I`, with `op` in each slot once.
///
/// Returns `op` itself for `n == 1` and the `1 x 1` zero matrix for `n == 0`.
///
/// *Panics* if `op` is not square.
pub fn lift(op: &CsrMatrix, n: usize) -> CsrMatrix {
    assert!(op.is_square(), "lift: operator is not square");
    match n {
        0 => CsrMatrix::zeros(1, 1),
        1 => op.clone(),
        _ => {
            let eye = CsrMatrix::eye(op.nrows());
            (0..n)
                .map(|k| kron_fold(partial_operators(op, &eye, k, n)))
                .reduce(|acc, term| &acc + &term)
                .unwrap_or_else(|| CsrMatrix::zeros(1, 1))
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{ self as nd, array };

    fn tridiag() -> CsrMatrix {
        CsrMatrix::from_dense(&array![
            [1.0, 0.5, 0.0],
            [0.5, 2.0, 0.5],
            [0.0, 0.5, 3.0],
        ])
    }

    #[test]
    fn single_particle_is_identity_map() {
        let op = tridiag();
        assert_eq!(lift(&op, 1), op);
    }

    #[test]
    fn factor_placement() {
        let op = tridiag();
        let eye = CsrMatrix::eye(3);
        let factors = partial_operators(&op, &eye, 0, 3);
        assert!(std::ptr::eq(factors[2], &op));
        assert!(std::ptr::eq(factors[0], &eye));
        let factors = partial_operators(&op, &eye, 2, 3);
        assert!(std::ptr::eq(factors[0], &op));
    }

    #[test]
    fn lifted_matches_dense_kron_sum() {
        let op = tridiag();
        let d = op.to_dense();
        let e: nd::Array2<f64> = nd::Array2::eye(3);
        let kron = nd::linalg::kron;
        let expected
            = kron(&kron(&d, &e), &e)
            + kron(&kron(&e, &d), &e)
            + kron(&kron(&e, &e), &d);
        let lifted = lift(&op, 3);
        assert_eq!(lifted.shape(), (27, 27));
        let diff = lifted.to_dense() - &expected;
        assert!(diff.iter().all(|a| a.abs() < 1e-14));
        assert!(lifted.is_symmetric(1e-14));
    }

    #[test]
    fn diagonal_lift_orders_axes() {
        // diag(x) lifted to two particles has diagonal x_i + x_j at flat
        // index i * g + j
        let xs = array![0.0, 1.0, 10.0];
        let lifted = lift(&CsrMatrix::from_diag(&xs), 2);
        let diag = lifted.diag();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(diag[i * 3 + j], xs[i] + xs[j]);
            }
        }
        let first = lift_at(&CsrMatrix::from_diag(&xs), 0, 2).diag();
        assert_eq!(first[2 * 3 + 1], 10.0);
        assert_eq!(first[1 * 3 + 2], 1.0);
    }
}
