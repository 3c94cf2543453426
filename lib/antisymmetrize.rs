//! Projection of product-space eigenvectors onto the antisymmetric subspace.
//!
//! A full wavefunction has rank `2 * count` with axes ordered
//! `(x_1, s_1, x_2, s_2, ..., x_n, s_n)`: each particle's grid axis is
//! immediately followed by its two-element spin axis.

use itertools::Itertools;
use ndarray as nd;
use crate::{
    config::AntisymParams,
    error::{ ManyBodyError, ManyBodyResult },
    system::SpinLabel,
};

/// Sign of a permutation of `0..p.len()`, counting the transpositions made by
/// a selection sort.
///
/// *Panics* if `p` is not a permutation of `0..p.len()`.
pub fn permutation_parity(p: &[usize]) -> f64 {
    let mut p = p.to_vec();
    let mut parity = 1.0;
    for i in 0..p.len().saturating_sub(1) {
        if p[i] != i {
            parity = -parity;
            let mn = (i..p.len()).min_by_key(|&k| p[k]).unwrap_or(i);
            p.swap(i, mn);
        }
    }
    parity
}

/// Axis permutation (in [`nd::ArrayBase::permuted_axes`] convention) that
/// moves particle `a`'s (space, spin) axis pair to slot `p[a]`.
pub fn exchange_axes(p: &[usize]) -> Vec<usize> {
    let mut axes = vec![0; 2 * p.len()];
    for (a, &pa) in p.iter().enumerate() {
        axes[2 * pa] = 2 * a;
        axes[2 * pa + 1] = 2 * a + 1;
    }
    axes
}

/// Swap particles `i` and `j` of a full wavefunction.
pub fn exchange<S>(full: &nd::ArrayBase<S, nd::IxDyn>, i: usize, j: usize)
    -> nd::ArrayD<f64>
where S: nd::Data<Elem = f64>
{
    let mut view = full.view();
    view.swap_axes(2 * i, 2 * j);
    view.swap_axes(2 * i + 1, 2 * j + 1);
    view.as_standard_layout().into_owned()
}

/// Spin tensor of rank `electrons.len()` with a single unit entry at the
/// multi-index of the given spin assignment.
pub fn spin_tensor(electrons: &[SpinLabel]) -> nd::ArrayD<f64> {
    let mut spin: nd::ArrayD<f64>
        = nd::ArrayD::zeros(nd::IxDyn(&vec![2; electrons.len()]));
    let index: Vec<usize> = electrons.iter().map(SpinLabel::index).collect();
    spin[nd::IxDyn(&index)] = 1.0;
    spin
}

/// Interleave a rank-`n` spatial tensor and a rank-`n` spin tensor into a
/// rank-`2n` full wavefunction.
pub fn combine<S1, S2>(
    space: &nd::ArrayBase<S1, nd::IxDyn>,
    spin: &nd::ArrayBase<S2, nd::IxDyn>,
) -> ManyBodyResult<nd::ArrayD<f64>>
where
    S1: nd::Data<Elem = f64>,
    S2: nd::Data<Elem = f64>,
{
    let n = space.ndim();
    if spin.ndim() != n {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "space has rank {} but spin has rank {}", n, spin.ndim())));
    }
    let s = space.iter().copied().collect::<nd::Array1<f64>>()
        .insert_axis(nd::Axis(1));
    let t = spin.iter().copied().collect::<nd::Array1<f64>>()
        .insert_axis(nd::Axis(0));
    let outer = &s * &t;
    let shape: Vec<usize>
        = space.shape().iter().chain(spin.shape().iter()).copied().collect();
    let outer = outer.into_shape(nd::IxDyn(&shape))?;
    let interleave: Vec<usize> = (0..n).flat_map(|i| [i, n + i]).collect();
    Ok(outer.permuted_axes(interleave).as_standard_layout().into_owned())
}

/// Apply the antisymmetrizer `Σ_p sgn(p) P` to a full wavefunction.
pub fn antisymmetrize_full<S>(full: &nd::ArrayBase<S, nd::IxDyn>)
    -> nd::ArrayD<f64>
where S: nd::Data<Elem = f64>
{
    let n = full.ndim() / 2;
    let mut acc: nd::ArrayD<f64> = nd::ArrayD::zeros(full.raw_dim());
    for p in (0..n).permutations(n) {
        let moved = full.view().permuted_axes(exchange_axes(&p));
        acc.scaled_add(permutation_parity(&p), &moved);
    }
    acc
}

fn max_abs<'a, I>(vals: I) -> f64
where I: IntoIterator<Item = &'a f64>
{
    vals.into_iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

fn magnitudes_close(
    a: &nd::ArrayD<f64>,
    b: &nd::ArrayD<f64>,
    params: &AntisymParams,
) -> bool
{
    a.iter().zip(b.iter())
        .all(|(x, y)| {
            (x.abs() - y.abs()).abs() <= params.dup_atol + params.dup_rtol * y.abs()
        })
}

/// Surviving antisymmetrized candidates with their co-indexed spatial and
/// spin parts and energies, in ascending energy order.
#[derive(Clone, Debug, Default)]
pub struct Antisymmetrized {
    pub fulls: Vec<nd::ArrayD<f64>>,
    pub spaces: Vec<nd::ArrayD<f64>>,
    pub spins: Vec<nd::ArrayD<f64>>,
    pub energies: Vec<f64>,
}

impl Antisymmetrized {
    pub fn len(&self) -> usize { self.energies.len() }

    pub fn is_empty(&self) -> bool { self.energies.is_empty() }
}

/// Antisymmetrize raw product-space eigenvectors.
///
/// `spaces` and `energies` are co-indexed and sorted by ascending energy; the
/// same `spin` tensor is paired with every candidate. Candidates annihilated
/// by antisymmetrization are dropped, survivors are normalized to
/// `Σ|ψ|² dx^count = 1`, and a survivor whose magnitude pattern matches that
/// of the previous survivor is dropped as a repeat of the same physical state.
pub fn antisymmetrize(
    spaces: &[nd::ArrayD<f64>],
    spin: &nd::ArrayD<f64>,
    energies: &[f64],
    dx: f64,
    params: &AntisymParams,
) -> ManyBodyResult<Antisymmetrized>
{
    if spaces.len() != energies.len() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "{} spatial candidates but {} energies",
            spaces.len(), energies.len(),
        )));
    }
    let _span = tracing::info_span!(
        "antisymmetrize", candidates = spaces.len()).entered();
    let mut out = Antisymmetrized::default();
    let mut null: usize = 0;
    let mut repeated: usize = 0;
    for (space, &energy) in spaces.iter().zip(energies) {
        let n = space.ndim();
        let full = combine(space, spin)?;
        let mut anti = antisymmetrize_full(&full);
        if max_abs(anti.iter()) <= params.zero_tol * max_abs(full.iter()) {
            null += 1;
            continue;
        }
        let norm = (anti.iter().map(|a| a * a).sum::<f64>() * dx.powi(n as i32)).sqrt();
        anti /= norm;
        if out.fulls.last().is_some_and(|prev| magnitudes_close(&anti, prev, params)) {
            repeated += 1;
            continue;
        }
        out.fulls.push(anti);
        out.spaces.push(space.clone());
        out.spins.push(spin.clone());
        out.energies.push(energy);
    }
    tracing::debug!(survivors = out.len(), null, repeated, "antisymmetrized");
    Ok(out)
}
