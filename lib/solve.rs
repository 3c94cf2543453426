//! Stationary many-body states by exact diagonalization.

use ndarray as nd;
use crate::{
    antisymmetrize::{ antisymmetrize, spin_tensor },
    config::{ Backend, SolverConfig },
    eigen::EigenBackend,
    error::{ ManyBodyError, ManyBodyResult },
    hamiltonian::hamiltonian,
    sparse::CsrMatrix,
    state::{ ManyBodyEvolution, ManyBodyState },
    system::System,
};

/// Number of raw eigenpairs expected to contain antisymmetrized level `k`:
/// `(|up - down| + 1)² * count * (k + 1)`.
///
/// This is an empirical over-estimate; a shortfall is reported as
/// [`ManyBodyError::ExcitationShortfall`] and can be retried with a larger
/// budget.
pub fn estimate_level(system: &System, k: usize) -> usize {
    let imbalance = system.up_count().abs_diff(system.down_count());
    (imbalance + 1).pow(2) * system.count() * (k + 1)
}

/// Owns the solver configuration and the eigen-solver backend.
pub struct Solver {
    config: SolverConfig,
    backend: Box<dyn EigenBackend>,
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Default for Solver {
    fn default() -> Self { Self::new(SolverConfig::default()) }
}

impl Solver {
    /// Create a new solver using the backend named in `config`.
    pub fn new(config: SolverConfig) -> Self {
        let backend = config.backend.solver(&config);
        Self { config, backend }
    }

    /// Create a new solver with an explicitly provided eigen-solver backend.
    pub fn with_backend(config: SolverConfig, backend: Box<dyn EigenBackend>) -> Self {
        Self { config, backend }
    }

    /// Create a new solver with default parameters and the process-wide
    /// backend selected by the environment.
    pub fn from_env() -> Self {
        let config = SolverConfig {
            backend: Backend::process_default(),
            ..SolverConfig::default()
        };
        Self::new(config)
    }

    pub fn config(&self) -> &SolverConfig { &self.config }

    pub fn backend(&self) -> &dyn EigenBackend { self.backend.as_ref() }

    /// Static many-body Hamiltonian of `system`.
    pub fn hamiltonian(&self, system: &System) -> ManyBodyResult<CsrMatrix> {
        hamiltonian(system, self.config.interaction)
    }

    /// Solve for the `k`-th antisymmetrized eigenstate (0 is the ground
    /// state).
    ///
    /// `hamiltonian` may supply a prebuilt static Hamiltonian; `level` is the
    /// number of raw eigenpairs to compute and defaults to
    /// [`estimate_level`]. Fails with the recoverable
    /// [`ManyBodyError::ExcitationShortfall`] if fewer than `k + 1` states
    /// survive antisymmetrization.
    pub fn solve(
        &self,
        system: &System,
        hamiltonian: Option<&CsrMatrix>,
        k: usize,
        level: Option<usize>,
    ) -> ManyBodyResult<ManyBodyState>
    {
        let _span = tracing::info_span!(
            "solve",
            k,
            count = system.count(),
            grid = system.grid_size(),
            backend = self.backend.name(),
        ).entered();
        let built;
        let H = match hamiltonian {
            Some(H) => {
                check_hamiltonian(system, H)?;
                H
            },
            None => {
                built = self.hamiltonian(system)?;
                &built
            },
        };
        let dim = system.state_dim();
        let requested = level.unwrap_or_else(|| estimate_level(system, k));
        let level = requested.min(dim);
        if level < requested {
            tracing::debug!(requested, dim, "clamped excitation budget to state dimension");
        }
        tracing::debug!(level, "solving eigenproblem");
        let spectrum = self.backend.lowest(H, level)?;

        let shape = system.space_shape();
        let volume = system.volume_element();
        let spaces: Vec<nd::ArrayD<f64>> = spectrum.states.columns().into_iter()
            .map(|col| {
                let norm = (col.dot(&col) * volume).sqrt();
                col.mapv(|a| a / norm).into_shape(nd::IxDyn(&shape))
            })
            .collect::<Result<_, _>>()?;
        let spin = spin_tensor(system.electrons());
        let energies = spectrum.energies.to_vec();
        let anti = antisymmetrize(
            &spaces, &spin, &energies, system.dx(), &self.config.antisym)?;
        if anti.len() <= k {
            return Err(ManyBodyError::ExcitationShortfall {
                requested: k,
                level,
                found: anti.len(),
            });
        }
        let mut fulls = anti.fulls;
        let mut spaces = anti.spaces;
        let mut spins = anti.spins;
        let state = ManyBodyState {
            space: spaces.swap_remove(k),
            spin: spins.swap_remove(k),
            full: fulls.swap_remove(k),
            energy: anti.energies[k],
        };
        tracing::info!(energy = state.energy, "solved");
        Ok(state)
    }

    /// Like [`Self::solve`], but on a shortfall retries with a doubled
    /// excitation budget up to `max_level_retries` times.
    pub fn solve_adaptive(
        &self,
        system: &System,
        hamiltonian: Option<&CsrMatrix>,
        k: usize,
    ) -> ManyBodyResult<ManyBodyState>
    {
        let built;
        let H = match hamiltonian {
            Some(H) => H,
            None => {
                built = self.hamiltonian(system)?;
                &built
            },
        };
        let dim = system.state_dim();
        let mut level = estimate_level(system, k).min(dim);
        let mut retries: usize = 0;
        loop {
            match self.solve(system, Some(H), k, Some(level)) {
                Err(err) if err.is_recoverable()
                    && retries < self.config.max_level_retries
                    && level < dim
                => {
                    let next = (2 * level).min(dim);
                    tracing::warn!(level, next, "excitation shortfall; retrying");
                    level = next;
                    retries += 1;
                },
                result => { return result; },
            }
        }
    }
}

pub(crate) fn check_hamiltonian(system: &System, H: &CsrMatrix) -> ManyBodyResult<()> {
    let dim = system.state_dim();
    if H.shape() != (dim, dim) {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "Hamiltonian has shape {:?}, expected {:?}", H.shape(), (dim, dim))));
    }
    Ok(())
}

/// Solve for the `k`-th antisymmetrized eigenstate with default parameters and
/// the environment-selected backend.
///
/// See [`Solver::solve`].
pub fn solve(
    system: &System,
    hamiltonian: Option<&CsrMatrix>,
    k: usize,
    level: Option<usize>,
) -> ManyBodyResult<ManyBodyState>
{
    Solver::from_env().solve(system, hamiltonian, k, level)
}

/// Propagate `state` under the perturbation `v_ptrb[[time, grid]]` on time
/// grid `t` with default parameters.
///
/// See [`Solver::propagate`].
pub fn propagate(
    system: &System,
    state: &ManyBodyState,
    v_ptrb: &nd::Array2<f64>,
    t: &nd::Array1<f64>,
    hamiltonian: Option<&CsrMatrix>,
) -> ManyBodyResult<ManyBodyEvolution>
{
    Solver::from_env().propagate(system, state, v_ptrb, t, hamiltonian)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::test::harmonic;

    #[test]
    fn level_estimate() {
        assert_eq!(estimate_level(&harmonic(4, 1.0, 1.0, "uu"), 0), 18);
        assert_eq!(estimate_level(&harmonic(4, 1.0, 1.0, "ud"), 2), 6);
        assert_eq!(estimate_level(&harmonic(4, 1.0, 1.0, "uud"), 1), 24);
    }

    #[test]
    fn prebuilt_hamiltonian_shape_checked() {
        let sys = harmonic(4, 1.0, 1.0, "ud");
        let wrong = CsrMatrix::eye(4);
        assert!(matches!(
            Solver::default().solve(&sys, Some(&wrong), 0, None),
            Err(ManyBodyError::ShapeMismatch(_)),
        ));
    }
}
