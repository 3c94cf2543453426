//! Real-valued sparse matrices in compressed sparse row format.
//!
//! Column indices within each row are kept sorted and explicit zeros are never
//! stored, so Kronecker products, sums, and element lookups can all work row
//! by row with merges and binary searches.

use std::ops::{ Add, Mul };
use ndarray as nd;
use num_traits::Zero;
use crate::error::{ ManyBodyError, ManyBodyResult };

/// Sparse `nrows x ncols` matrix in CSR format.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create an all-zero matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            row_ptr: vec![0; nrows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create the `n x n` identity.
    pub fn eye(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            row_ptr: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Create a square diagonal matrix.
    pub fn from_diag<S>(diag: &nd::ArrayBase<S, nd::Ix1>) -> Self
    where S: nd::Data<Elem = f64>
    {
        let n = diag.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_indices = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        row_ptr.push(0);
        for (k, &d) in diag.iter().enumerate() {
            if d != 0.0 {
                col_indices.push(k);
                values.push(d);
            }
            row_ptr.push(col_indices.len());
        }
        Self { nrows: n, ncols: n, row_ptr, col_indices, values }
    }

    /// Compress a dense matrix, dropping exact zeros.
    pub fn from_dense<S>(dense: &nd::ArrayBase<S, nd::Ix2>) -> Self
    where S: nd::Data<Elem = f64>
    {
        let (nrows, ncols) = dense.dim();
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in dense.outer_iter() {
            for (j, &a) in row.iter().enumerate() {
                if a != 0.0 {
                    col_indices.push(j);
                    values.push(a);
                }
            }
            row_ptr.push(col_indices.len());
        }
        Self { nrows, ncols, row_ptr, col_indices, values }
    }

    /// Assemble from `(row, col, value)` triplets in any order. Duplicate
    /// positions are summed and entries that sum to zero are dropped.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I)
        -> ManyBodyResult<Self>
    where I: IntoIterator<Item = (usize, usize, f64)>
    {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nrows];
        for (i, j, a) in triplets.into_iter() {
            if i >= nrows || j >= ncols {
                return Err(ManyBodyError::ShapeMismatch(format!(
                    "triplet ({}, {}) out of bounds for a {}x{} matrix",
                    i, j, nrows, ncols,
                )));
            }
            rows[i].push((j, a));
        }
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in rows.iter_mut() {
            row.sort_by_key(|&(j, _)| j);
            let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
            for &(j, a) in row.iter() {
                match merged.last_mut() {
                    Some(last) if last.0 == j => { last.1 += a; },
                    _ => { merged.push((j, a)); },
                }
            }
            for (j, a) in merged.into_iter().filter(|(_, a)| *a != 0.0) {
                col_indices.push(j);
                values.push(a);
            }
            row_ptr.push(col_indices.len());
        }
        Ok(Self { nrows, ncols, row_ptr, col_indices, values })
    }

    pub fn nrows(&self) -> usize { self.nrows }

    pub fn ncols(&self) -> usize { self.ncols }

    pub fn shape(&self) -> (usize, usize) { (self.nrows, self.ncols) }

    pub fn is_square(&self) -> bool { self.nrows == self.ncols }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize { self.values.len() }

    /// Iterate over the stored `(col, value)` pairs of row `i`.
    ///
    /// *Panics* if `i` is out of bounds.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        self.col_indices[start..end].iter().copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Iterate over all stored `(row, col, value)` triplets in row-major
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows)
            .flat_map(move |i| self.row(i).map(move |(j, a)| (i, j, a)))
    }

    /// Look up a single element; unstored positions are zero.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i >= self.nrows || j >= self.ncols { return 0.0; }
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        match self.col_indices[start..end].binary_search(&j) {
            Ok(k) => self.values[start + k],
            Err(_) => 0.0,
        }
    }

    /// Main diagonal.
    pub fn diag(&self) -> nd::Array1<f64> {
        (0..self.nrows.min(self.ncols)).map(|k| self.get(k, k)).collect()
    }

    pub fn to_dense(&self) -> nd::Array2<f64> {
        let mut dense: nd::Array2<f64> = nd::Array2::zeros((self.nrows, self.ncols));
        self.iter().for_each(|(i, j, a)| { dense[[i, j]] = a; });
        dense
    }

    /// Number of sub- and super-diagonals holding stored entries.
    pub fn bandwidth(&self) -> (usize, usize) {
        self.iter()
            .fold((0, 0), |(lower, upper), (i, j, _)| {
                if i > j {
                    (lower.max(i - j), upper)
                } else {
                    (lower, upper.max(j - i))
                }
            })
    }

    /// Return `true` if the matrix is square and `|A[i, j] - A[j, i]| <= tol`
    /// everywhere.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.is_square()
            && self.iter().all(|(i, j, a)| (a - self.get(j, i)).abs() <= tol)
    }

    /// Multiply every entry by `scale`.
    pub fn scaled(&self, scale: f64) -> Self {
        if scale == 0.0 { return Self::zeros(self.nrows, self.ncols); }
        Self { values: self.values.iter().map(|a| scale * a).collect(), ..self.clone() }
    }

    /// `A - σI`.
    ///
    /// *Panics* if the matrix is not square.
    pub fn shifted(&self, sigma: f64) -> Self {
        assert!(self.is_square(), "CsrMatrix::shifted: matrix is not square");
        self + &Self::eye(self.nrows).scaled(-sigma)
    }

    /// Kronecker product `self ⊗ other`.
    ///
    /// Row `i * other.nrows + k` of the result holds the products of row `i`
    /// of `self` with row `k` of `other`; since both factors have sorted rows,
    /// so does the result.
    pub fn kron(&self, other: &Self) -> Self {
        let nrows = self.nrows * other.nrows;
        let ncols = self.ncols * other.ncols;
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz() * other.nnz());
        let mut values = Vec::with_capacity(self.nnz() * other.nnz());
        row_ptr.push(0);
        for i in 0..self.nrows {
            for k in 0..other.nrows {
                for (j, a) in self.row(i) {
                    for (l, b) in other.row(k) {
                        let ab = a * b;
                        if ab != 0.0 {
                            col_indices.push(j * other.ncols + l);
                            values.push(ab);
                        }
                    }
                }
                row_ptr.push(col_indices.len());
            }
        }
        Self { nrows, ncols, row_ptr, col_indices, values }
    }

    /// Sparse matrix-vector product, for real or complex vectors.
    ///
    /// *Panics* if `x.len() != self.ncols()`.
    pub fn dot<A, S>(&self, x: &nd::ArrayBase<S, nd::Ix1>) -> nd::Array1<A>
    where
        A: Copy + Zero + Mul<f64, Output = A>,
        S: nd::Data<Elem = A>,
    {
        assert_eq!(x.len(), self.ncols, "CsrMatrix::dot: incompatible vector length");
        (0..self.nrows)
            .map(|i| {
                self.row(i).fold(A::zero(), |acc, (j, a)| acc + x[j] * a)
            })
            .collect()
    }
}

/// Element-wise sum.
///
/// *Panics* if the shapes differ.
impl Add<&CsrMatrix> for &CsrMatrix {
    type Output = CsrMatrix;

    fn add(self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.shape(), other.shape(), "CsrMatrix::add: shape mismatch");
        let mut row_ptr = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz() + other.nnz());
        let mut values = Vec::with_capacity(self.nnz() + other.nnz());
        fn push(cols: &mut Vec<usize>, vals: &mut Vec<f64>, j: usize, a: f64) {
            if a != 0.0 {
                cols.push(j);
                vals.push(a);
            }
        }
        row_ptr.push(0);
        for i in 0..self.nrows {
            let mut lhs = self.row(i).peekable();
            let mut rhs = other.row(i).peekable();
            loop {
                match (lhs.peek().copied(), rhs.peek().copied()) {
                    (Some((j, a)), Some((l, b))) => {
                        if j < l {
                            push(&mut col_indices, &mut values, j, a);
                            lhs.next();
                        } else if l < j {
                            push(&mut col_indices, &mut values, l, b);
                            rhs.next();
                        } else {
                            push(&mut col_indices, &mut values, j, a + b);
                            lhs.next();
                            rhs.next();
                        }
                    },
                    (Some((j, a)), None) => {
                        push(&mut col_indices, &mut values, j, a);
                        lhs.next();
                    },
                    (None, Some((l, b))) => {
                        push(&mut col_indices, &mut values, l, b);
                        rhs.next();
                    },
                    (None, None) => { break; },
                }
            }
            row_ptr.push(col_indices.len());
        }
        CsrMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            row_ptr,
            col_indices,
            values,
        }
    }
}
