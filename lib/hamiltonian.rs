//! Many-body operators assembled from a [`System`].

use ndarray as nd;
use crate::{
    config::InteractionScheme,
    error::{ ManyBodyError, ManyBodyResult },
    interaction::interaction_operator,
    lift::lift,
    sparse::CsrMatrix,
    system::System,
};

/// Lifted kinetic energy operator.
pub fn kinetic_energy_operator(system: &System) -> CsrMatrix {
    lift(system.kinetic_op(), system.count())
}

/// Lifted external potential operator.
pub fn external_potential_operator(system: &System) -> CsrMatrix {
    lift(system.v_ext_op(), system.count())
}

/// Lifted local potential `diag(v)`, e.g. one time slice of a perturbation.
pub fn perturbation_operator<S>(system: &System, v: &nd::ArrayBase<S, nd::Ix1>)
    -> ManyBodyResult<CsrMatrix>
where S: nd::Data<Elem = f64>
{
    if v.len() != system.grid_size() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "perturbation has length {}, expected {}",
            v.len(), system.grid_size(),
        )));
    }
    Ok(lift(&CsrMatrix::from_diag(v), system.count()))
}

/// Static many-body Hamiltonian `Lift(K) + Lift(V_ext) + U`.
#[tracing::instrument(
    name = "hamiltonian",
    level = "info",
    skip_all,
    fields(grid = system.grid_size(), count = system.count()),
)]
pub fn hamiltonian(system: &System, scheme: InteractionScheme)
    -> ManyBodyResult<CsrMatrix>
{
    tracing::trace!("lifting kinetic operator");
    let K = kinetic_energy_operator(system);
    tracing::trace!("lifting external potential");
    let Vext = external_potential_operator(system);
    tracing::trace!(?scheme, "assembling interaction diagonal");
    let U = interaction_operator(system.v_int(), system.count(), scheme)?;
    let H = &(&K + &Vext) + &U;
    tracing::debug!(dim = H.nrows(), nnz = H.nnz(), "assembled Hamiltonian");
    Ok(H)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::test::{ harmonic, three_point_kinetic };

    #[test]
    fn single_particle_hamiltonian_is_unchanged() {
        let sys = harmonic(12, 3.0, 1.0, "d");
        let H = hamiltonian(&sys, InteractionScheme::LogDomain).unwrap();
        assert_eq!(H, sys.single_particle_hamiltonian());
    }

    #[test]
    fn interaction_lands_on_diagonal() {
        let g = 5;
        let x = nd::Array1::linspace(-1.0, 1.0, g);
        let dx = x[1] - x[0];
        let v_int = nd::Array2::from_shape_fn((g, g), |(a, b)| (a + 2 * b) as f64);
        let sys = System::new(
            x, three_point_kinetic(g, dx), &nd::Array1::zeros(g), v_int.clone(), "uu",
        ).unwrap();
        let H = hamiltonian(&sys, InteractionScheme::PairSum).unwrap();
        let K = kinetic_energy_operator(&sys);
        assert!(H.is_symmetric(1e-12));
        for a in 0..g {
            for b in 0..g {
                let k = a * g + b;
                assert!((H.get(k, k) - K.get(k, k) - v_int[[a, b]]).abs() < 1e-12);
            }
        }
        assert_eq!(H.get(0, 1), K.get(0, 1));
    }

    #[test]
    fn perturbation_shape_checked() {
        let sys = harmonic(6, 1.0, 1.0, "ud");
        assert!(perturbation_operator(&sys, &nd::Array1::zeros(5)).is_err());
        let P = perturbation_operator(&sys, &nd::Array1::from_elem(6, 0.5)).unwrap();
        assert_eq!(P.shape(), (36, 36));
        assert!(P.diag().iter().all(|p| (*p - 1.0).abs() < 1e-15));
    }
}
