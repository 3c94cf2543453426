//! Shift-invert eigen-solver.
//!
//! `H - σI` is factored once and Lanczos runs on `-(H - σI)^-1`, whose lowest
//! eigenvalues `ν` correspond to the eigenvalues `λ = σ - 1/ν` of `H` closest
//! to `σ` from above. Placing `σ` below the spectrum makes those the lowest
//! eigenvalues of `H`, and makes `H - σI` positive definite, so the
//! factorization is a sparse Cholesky with a fill-reducing ordering. A shift
//! inside the spectrum leaves `H - σI` indefinite; that case falls back to a
//! banded LU with partial pivoting (Kronecker-lifted finite-difference
//! operators are banded with bandwidth `grid_size^(count-1)` times the stencil
//! half-width), which is only attempted while the band fits in
//! [`BAND_LU_MAX_ENTRIES`].

use faer::{
    Mat,
    Side,
    linalg::solvers::Solve,
    sparse::{ SparseColMat, Triplet, linalg::solvers::Llt },
};
use ndarray as nd;
use crate::{
    config::LanczosParams,
    eigen::{ EigenBackend, Spectrum, check_request, lanczos::lowest_eigenpairs },
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
};

/// A row of a banded matrix, stored densely from column `start`.
#[derive(Clone, Debug)]
struct BandRow {
    start: usize,
    vals: Vec<f64>,
}

impl BandRow {
    fn end(&self) -> usize { self.start + self.vals.len() }

    fn get(&self, col: usize) -> f64 {
        if col < self.start || col >= self.end() {
            0.0
        } else {
            self.vals[col - self.start]
        }
    }

    fn set(&mut self, col: usize, val: f64) {
        if col >= self.start && col < self.end() {
            self.vals[col - self.start] = val;
        }
    }

    /// `self -= m * other` over the columns `from..other.end()`.
    fn sub_scaled(&mut self, m: f64, other: &BandRow, from: usize) {
        if other.end() > self.end() {
            let new_len = other.end() - self.start;
            self.vals.resize(new_len, 0.0);
        }
        for col in from.max(other.start)..other.end() {
            self.vals[col - self.start] -= m * other.vals[col - other.start];
        }
    }
}

/// LU factorization of a banded matrix with partial pivoting.
///
/// Row interchanges are confined to within the lower bandwidth, so `U` has
/// upper bandwidth at most `kl + ku` and `L` is kept as per-column
/// elimination multipliers.
#[derive(Clone, Debug)]
pub(crate) struct BandLu {
    dim: usize,
    upper: Vec<BandRow>,
    pivots: Vec<usize>,
    lower: Vec<Vec<(usize, f64)>>,
}

impl BandLu {
    /// Factor a square sparse matrix. Fails if a pivot column is entirely
    /// zero.
    pub(crate) fn factor(a: &CsrMatrix, shift: f64) -> ManyBodyResult<Self> {
        let n = a.nrows();
        let (kl, _) = a.bandwidth();
        let mut rows: Vec<BandRow> = (0..n)
            .map(|i| {
                let (lo, hi) = a.row(i)
                    .fold((i, i), |(lo, hi), (j, _)| (lo.min(j), hi.max(j)));
                let mut row = BandRow { start: lo, vals: vec![0.0; hi - lo + 1] };
                a.row(i).for_each(|(j, v)| row.set(j, v));
                row
            })
            .collect();
        let scale = rows.iter()
            .flat_map(|r| r.vals.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let tiny = f64::EPSILON * scale.max(f64::MIN_POSITIVE);
        let mut pivots: Vec<usize> = Vec::with_capacity(n);
        let mut lower: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);

        for c in 0..n {
            let last = (c + kl).min(n - 1);
            let (p, pval) = (c..=last)
                .map(|r| (r, rows[r].get(c)))
                .fold((c, 0.0_f64), |best, (r, v)| {
                    if v.abs() > best.1.abs() { (r, v) } else { best }
                });
            if pval.abs() <= tiny {
                return Err(ManyBodyError::SingularShift { pivot: c, shift });
            }
            rows.swap(c, p);
            pivots.push(p);
            let mut multipliers: Vec<(usize, f64)> = Vec::new();
            let (head, tail) = rows.split_at_mut(c + 1);
            let pivot_row = &head[c];
            for (offs, row) in tail.iter_mut().take(last - c).enumerate() {
                let v = row.get(c);
                if v == 0.0 { continue; }
                let m = v / pval;
                row.sub_scaled(m, pivot_row, c + 1);
                row.set(c, 0.0);
                multipliers.push((c + 1 + offs, m));
            }
            lower.push(multipliers);
        }
        Ok(Self { dim: n, upper: rows, pivots, lower })
    }

    /// Solve `A x = b`.
    pub(crate) fn solve(&self, b: &nd::Array1<f64>) -> nd::Array1<f64> {
        let mut x = b.to_owned();
        for c in 0..self.dim {
            x.swap(c, self.pivots[c]);
            let xc = x[c];
            for &(r, m) in self.lower[c].iter() {
                x[r] -= m * xc;
            }
        }
        for i in (0..self.dim).rev() {
            let row = &self.upper[i];
            let mut acc = x[i];
            for col in (i + 1)..row.end() {
                acc -= row.get(col) * x[col];
            }
            x[i] = acc / row.get(i);
        }
        x
    }
}

/// Largest band storage, in entries, for which the LU fallback is attempted.
pub const BAND_LU_MAX_ENTRIES: usize = 1 << 24;

/// `H - σI` in factored form, applied as its inverse.
pub(crate) enum ShiftedInverse {
    Cholesky(Llt<usize, f64>),
    Band(BandLu),
}

impl ShiftedInverse {
    /// Factor `h - shift * I`.
    pub(crate) fn factor(h: &CsrMatrix, shift: f64) -> ManyBodyResult<Self> {
        Self::factor_with_limit(h, shift, BAND_LU_MAX_ENTRIES)
    }

    fn factor_with_limit(h: &CsrMatrix, shift: f64, max_band_entries: usize)
        -> ManyBodyResult<Self>
    {
        let a = h.shifted(shift);
        let n = a.nrows();
        let triplets: Vec<Triplet<usize, usize, f64>>
            = a.iter().map(|(i, j, v)| Triplet::new(i, j, v)).collect();
        let sparse = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| ManyBodyError::ShiftFactorization {
                shift,
                detail: format!("{:?}", e),
            })?;
        let cholesky_err = match sparse.as_ref().sp_cholesky(Side::Lower) {
            Ok(llt) => return Ok(Self::Cholesky(llt)),
            Err(e) => format!("{:?}", e),
        };
        tracing::debug!(
            error = %cholesky_err, "shifted operator is not positive definite");
        let (kl, ku) = a.bandwidth();
        let band_entries = n.saturating_mul(2 * kl + ku + 1);
        if band_entries > max_band_entries {
            return Err(ManyBodyError::ShiftFactorization {
                shift,
                detail: format!(
                    "sparse Cholesky failed ({}) and banded LU would need {} entries (limit {})",
                    cholesky_err, band_entries, max_band_entries,
                ),
            });
        }
        BandLu::factor(&a, shift).map(Self::Band)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Cholesky(_) => "sparse-cholesky",
            Self::Band(_) => "band-lu",
        }
    }

    /// Solve `(H - σI) x = b`.
    pub(crate) fn solve(&self, b: &nd::Array1<f64>) -> nd::Array1<f64> {
        match self {
            Self::Cholesky(llt) => {
                let mut x = Mat::from_fn(b.len(), 1, |i, _| b[i]);
                llt.solve_in_place(x.as_mut());
                nd::Array1::from_shape_fn(b.len(), |i| x[(i, 0)])
            },
            Self::Band(lu) => lu.solve(b),
        }
    }
}

/// Interval `(lo, hi)` containing the spectrum of a symmetric matrix, from
/// Gershgorin discs.
pub fn gershgorin_bounds(h: &CsrMatrix) -> (f64, f64) {
    (0..h.nrows())
        .map(|i| {
            let (d, off) = h.row(i)
                .fold((0.0, 0.0), |(d, off), (j, a)| {
                    if j == i { (a, off) } else { (d, off + a.abs()) }
                });
            (d - off, d + off)
        })
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (l, u)| {
            (lo.min(l), hi.max(u))
        })
}

/// Shift-invert backend.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShiftInvert {
    shift: Option<f64>,
    lanczos: LanczosParams,
}

impl ShiftInvert {
    /// With `shift == None`, σ is placed strictly below the Gershgorin lower
    /// bound of each matrix solved.
    pub fn new(shift: Option<f64>, lanczos: LanczosParams) -> Self {
        Self { shift, lanczos }
    }

    /// Shift to be used for `h`.
    pub fn shift_for(&self, h: &CsrMatrix) -> f64 {
        self.shift.unwrap_or_else(|| {
            let (lo, hi) = gershgorin_bounds(h);
            lo - (0.01 * (hi - lo)).max(1e-3)
        })
    }
}

impl EigenBackend for ShiftInvert {
    fn name(&self) -> &'static str { "shift-invert" }

    fn lowest(&self, h: &CsrMatrix, level: usize) -> ManyBodyResult<Spectrum> {
        check_request(h, level)?;
        let sigma = self.shift_for(h);
        let _span = tracing::debug_span!(
            "eigen-solve", backend = self.name(), dim = h.nrows(), level, sigma,
        ).entered();
        let factored = ShiftedInverse::factor(h, sigma)?;
        tracing::debug!(kind = factored.kind(), "factored shifted operator");
        let inv = lowest_eigenpairs(
            |v| -factored.solve(v), h.nrows(), level, &self.lanczos)?;
        let energies: Vec<f64>
            = inv.energies.iter().map(|nu| sigma - 1.0 / nu).collect();
        let mut order: Vec<usize> = (0..energies.len()).collect();
        order.sort_by(|&a, &b| energies[a].total_cmp(&energies[b]));
        let mut states: nd::Array2<f64> = nd::Array2::zeros(inv.states.raw_dim());
        for (col, &i) in order.iter().enumerate() {
            states.column_mut(col).assign(&inv.states.column(i));
        }
        let energies: nd::Array1<f64> = order.iter().map(|&i| energies[i]).collect();
        Ok(Spectrum { energies, states })
    }
}
