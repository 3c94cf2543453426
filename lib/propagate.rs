//! Real-time propagation of a many-body state under a local perturbation.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ ManyBodyError, ManyBodyResult },
    expm::expm_multiply,
    hamiltonian::perturbation_operator,
    observables::StateNorm,
    solve::{ Solver, check_hamiltonian },
    sparse::CsrMatrix,
    state::{ ManyBodyEvolution, ManyBodyState },
    system::System,
};

/// Relative tolerance on time-grid uniformity.
const TIME_RTOL: f64 = 1e-8;

/// Check that `t` has at least two strictly increasing, uniformly spaced
/// points and return the spacing.
pub fn time_step(t: &nd::Array1<f64>) -> ManyBodyResult<f64> {
    if t.len() < 2 {
        return Err(ManyBodyError::InvalidTimeGrid(
            format!("need at least 2 points, got {}", t.len())));
    }
    let dt = t[1] - t[0];
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(ManyBodyError::InvalidTimeGrid(
            "times must be strictly increasing".into()));
    }
    let uniform = t.iter().zip(t.iter().skip(1))
        .all(|(tk, tkp1)| ((tkp1 - tk) - dt).abs() <= TIME_RTOL * dt);
    if !uniform {
        return Err(ManyBodyError::InvalidTimeGrid("spacing must be uniform".into()));
    }
    Ok(dt)
}

impl Solver {
    /// Advance `evolution` by one step, from snapshot `j - 1` to snapshot
    /// `j`, under `H + Lift(diag(v_ptrb[j, :]))`.
    ///
    /// Steps must be taken in order: `j` must equal the current number of
    /// snapshots.
    pub fn propagate_step(
        &self,
        system: &System,
        evolution: &mut ManyBodyEvolution,
        H: &CsrMatrix,
        j: usize,
        dt: f64,
    ) -> ManyBodyResult<()>
    {
        if j == 0 || j != evolution.len() || j >= evolution.t().len() {
            return Err(ManyBodyError::InvalidTimeGrid(format!(
                "cannot compute step {} after {} of {} snapshots",
                j, evolution.len(), evolution.t().len(),
            )));
        }
        let Vptrb = perturbation_operator(system, &evolution.v_ptrb().row(j))?;
        let Hp = H + &Vptrb;
        let psi: nd::Array1<C64> = evolution.last().iter().copied().collect();
        let psi = expm_multiply(&Hp, &psi, dt, &self.config().expm)?;
        let space = psi.into_shape(nd::IxDyn(&system.space_shape()))?;
        let norm = space.norm_on(system.volume_element());
        tracing::trace!(step = j, norm, "propagated");
        if (norm - 1.0).abs() > self.config().norm_tol {
            return Err(ManyBodyError::PropagationInstability {
                step: j,
                norm,
                tol: self.config().norm_tol,
            });
        }
        evolution.push(space);
        Ok(())
    }

    /// Propagate `state` through every point of the time grid `t` under the
    /// static Hamiltonian plus the local perturbation `v_ptrb[[time, grid]]`.
    ///
    /// `hamiltonian` may supply a prebuilt static Hamiltonian. Snapshot 0 is
    /// the initial spatial wavefunction; snapshot `j` is
    /// `exp(-i dt (H + Lift(diag(v_ptrb[j, :])))) ψ_{j-1}`.
    ///
    /// The spatial part of `state` must be normalized, `Σ|ψ|² dx^count = 1`,
    /// to within `norm_tol`.
    pub fn propagate(
        &self,
        system: &System,
        state: &ManyBodyState,
        v_ptrb: &nd::Array2<f64>,
        t: &nd::Array1<f64>,
        hamiltonian: Option<&CsrMatrix>,
    ) -> ManyBodyResult<ManyBodyEvolution>
    {
        let dt = time_step(t)?;
        if v_ptrb.dim() != (t.len(), system.grid_size()) {
            return Err(ManyBodyError::ShapeMismatch(format!(
                "v_ptrb has shape {:?}, expected {:?}",
                v_ptrb.dim(), (t.len(), system.grid_size()),
            )));
        }
        if state.space.shape() != system.space_shape().as_slice() {
            return Err(ManyBodyError::ShapeMismatch(format!(
                "state has shape {:?}, expected {:?}",
                state.space.shape(), system.space_shape(),
            )));
        }
        let norm = state.space.norm_on(system.volume_element());
        if (norm - 1.0).abs() > self.config().norm_tol {
            return Err(ManyBodyError::UnnormalizedState {
                norm,
                tol: self.config().norm_tol,
            });
        }
        let _span = tracing::info_span!(
            "propagate", steps = t.len() - 1, dt, count = system.count(),
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
        let mut evolution
            = ManyBodyEvolution::new(state.clone(), t.clone(), v_ptrb.clone());
        for j in 1..t.len() {
            self.propagate_step(system, &mut evolution, H, j, dt)?;
        }
        tracing::info!(snapshots = evolution.len(), "propagation complete");
        Ok(evolution)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::test::harmonic;

    fn ground_state(system: &System) -> ManyBodyState {
        Solver::default().solve(system, None, 0, None).unwrap()
    }

    #[test]
    fn time_grid_validation() {
        assert!(time_step(&nd::array![0.0]).is_err());
        assert!(time_step(&nd::array![0.0, 0.0, 1.0]).is_err());
        assert!(time_step(&nd::array![0.0, 0.1, 0.3]).is_err());
        assert!(time_step(&nd::array![1.0, 0.5]).is_err());
        let dt = time_step(&nd::Array1::linspace(0.0, 1.0, 11)).unwrap();
        assert!((dt - 0.1).abs() < 1e-15);
    }

    #[test]
    fn norm_drift_is_fatal() {
        let sys = harmonic(6, 2.0, 1.0, "ud");
        let mut state = ground_state(&sys);
        state.space.mapv_inplace(|a| 2.0 * a);
        let t = nd::Array1::linspace(0.0, 0.2, 3);
        let v_ptrb = nd::Array2::zeros((3, 6));
        let solver = Solver::default();
        let H = solver.hamiltonian(&sys).unwrap();
        let mut evolution = ManyBodyEvolution::new(state, t, v_ptrb);
        assert!(matches!(
            solver.propagate_step(&sys, &mut evolution, &H, 1, 0.1),
            Err(ManyBodyError::PropagationInstability { step: 1, .. }),
        ));
        assert_eq!(evolution.len(), 1);
    }

    #[test]
    fn steps_must_be_taken_in_order() {
        let sys = harmonic(6, 2.0, 1.0, "ud");
        let state = ground_state(&sys);
        let t = nd::Array1::linspace(0.0, 0.3, 4);
        let v_ptrb = nd::Array2::zeros((4, 6));
        let solver = Solver::default();
        let H = solver.hamiltonian(&sys).unwrap();
        let mut evolution = ManyBodyEvolution::new(state, t, v_ptrb);
        for j in [0, 2, 4] {
            assert!(matches!(
                solver.propagate_step(&sys, &mut evolution, &H, j, 0.1),
                Err(ManyBodyError::InvalidTimeGrid(_)),
            ));
        }
        solver.propagate_step(&sys, &mut evolution, &H, 1, 0.1).unwrap();
        assert!(matches!(
            solver.propagate_step(&sys, &mut evolution, &H, 1, 0.1),
            Err(ManyBodyError::InvalidTimeGrid(_)),
        ));
        assert_eq!(evolution.len(), 2);
    }

    #[test]
    fn unnormalized_initial_state_is_rejected() {
        let sys = harmonic(6, 2.0, 1.0, "ud");
        let mut state = ground_state(&sys);
        state.space.mapv_inplace(|a| 1.01 * a);
        let t = nd::Array1::linspace(0.0, 0.2, 3);
        let v_ptrb = nd::Array2::zeros((3, 6));
        let solver = Solver::default();
        assert!(matches!(
            solver.propagate(&sys, &state, &v_ptrb, &t, None),
            Err(ManyBodyError::UnnormalizedState { .. }),
        ));
        state.space.mapv_inplace(|a| a / 1.01);
        let evolution = solver.propagate(&sys, &state, &v_ptrb, &t, None).unwrap();
        assert_eq!(evolution.len(), 3);
    }
}
