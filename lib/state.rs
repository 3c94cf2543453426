//! Stationary and time-dependent many-body states.

use ndarray as nd;
use num_complex::Complex64 as C64;

/// An antisymmetrized many-body eigenstate.
///
/// `space` has one grid axis per particle, `spin` one two-element axis per
/// particle, and `full` interleaves them as `(x_1, s_1, ..., x_n, s_n)`.
/// `full` is normalized so that `Σ|ψ|² dx^count = 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ManyBodyState {
    pub space: nd::ArrayD<f64>,
    pub spin: nd::ArrayD<f64>,
    pub full: nd::ArrayD<f64>,
    pub energy: f64,
}

impl ManyBodyState {
    /// Number of particles.
    pub fn count(&self) -> usize { self.space.ndim() }

    /// Number of grid points per particle.
    pub fn grid_size(&self) -> usize { self.space.shape().first().copied().unwrap_or(0) }
}

/// Time evolution of a [`ManyBodyState`] under a local perturbation.
///
/// Snapshot `j` is the spatial wavefunction at `t[j]`; snapshot 0 is the
/// initial state's spatial part.
#[derive(Clone, Debug)]
pub struct ManyBodyEvolution {
    initial_state: ManyBodyState,
    t: nd::Array1<f64>,
    v_ptrb: nd::Array2<f64>,
    td_space: Vec<nd::ArrayD<C64>>,
}

impl ManyBodyEvolution {
    pub(crate) fn new(
        initial_state: ManyBodyState,
        t: nd::Array1<f64>,
        v_ptrb: nd::Array2<f64>,
    ) -> Self
    {
        let mut td_space = Vec::with_capacity(t.len());
        td_space.push(initial_state.space.mapv(C64::from));
        Self { initial_state, t, v_ptrb, td_space }
    }

    pub(crate) fn push(&mut self, space: nd::ArrayD<C64>) {
        self.td_space.push(space);
    }

    pub fn initial_state(&self) -> &ManyBodyState { &self.initial_state }

    /// Time grid.
    pub fn t(&self) -> &nd::Array1<f64> { &self.t }

    /// Perturbing potential, indexed as `v_ptrb[[time, grid]]`.
    pub fn v_ptrb(&self) -> &nd::Array2<f64> { &self.v_ptrb }

    /// All spatial snapshots computed so far.
    pub fn td_space(&self) -> &[nd::ArrayD<C64>] { &self.td_space }

    /// Spatial wavefunction at time index `j`, if it has been computed.
    pub fn snapshot(&self, j: usize) -> Option<&nd::ArrayD<C64>> {
        self.td_space.get(j)
    }

    /// Most recent snapshot.
    pub fn last(&self) -> &nd::ArrayD<C64> {
        // never empty: holds at least the initial state
        &self.td_space[self.td_space.len() - 1]
    }

    /// Number of computed snapshots.
    pub fn len(&self) -> usize { self.td_space.len() }

    pub fn is_empty(&self) -> bool { self.td_space.is_empty() }

    /// Return `true` once every time step has a snapshot.
    pub fn is_complete(&self) -> bool { self.td_space.len() == self.t.len() }
}
