//! Norms, densities, and energies of many-body wavefunctions.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
    state::ManyBodyState,
    system::System,
};

/// Grid norm of an object representing a quantum state.
pub trait StateNorm {
    /// `sqrt(Σ|ψ|² dV)` for volume element `volume`.
    fn norm_on(&self, volume: f64) -> f64;
}

impl StateNorm for nd::ArrayD<f64> {
    fn norm_on(&self, volume: f64) -> f64 {
        (self.iter().map(|a| a * a).sum::<f64>() * volume).sqrt()
    }
}

impl StateNorm for nd::ArrayD<C64> {
    fn norm_on(&self, volume: f64) -> f64 {
        (self.iter().map(|a| a.norm_sqr()).sum::<f64>() * volume).sqrt()
    }
}

impl StateNorm for nd::Array1<f64> {
    fn norm_on(&self, volume: f64) -> f64 {
        (self.iter().map(|a| a * a).sum::<f64>() * volume).sqrt()
    }
}

impl StateNorm for nd::Array1<C64> {
    fn norm_on(&self, volume: f64) -> f64 {
        (self.iter().map(|a| a.norm_sqr()).sum::<f64>() * volume).sqrt()
    }
}

/// Total energy of an eigenstate.
pub fn total_energy(state: &ManyBodyState) -> f64 { state.energy }

/// Sum of the single-particle marginals of `|ψ|²`, where particle `a` lives
/// on axis `a * stride`.
fn marginal_sum<I>(
    probs: I,
    shape: &[usize],
    stride: usize,
    grid_size: usize,
) -> nd::Array1<f64>
where I: Iterator<Item = f64>
{
    let count = shape.len() / stride;
    let mut rho: nd::Array1<f64> = nd::Array1::zeros(grid_size);
    let mut index = vec![0_usize; shape.len()];
    for p in probs {
        for a in 0..count {
            rho[index[a * stride]] += p;
        }
        // advance the row-major multi-index
        for ax in (0..shape.len()).rev() {
            index[ax] += 1;
            if index[ax] < shape[ax] { break; }
            index[ax] = 0;
        }
    }
    rho
}

/// One-particle charge density `ρ(x)` of an eigenstate, summed over spin;
/// integrates to the particle count.
pub fn density(system: &System, state: &ManyBodyState) -> ManyBodyResult<nd::Array1<f64>> {
    let expected: Vec<usize> = (0..system.count())
        .flat_map(|_| [system.grid_size(), 2])
        .collect();
    if state.full.shape() != expected.as_slice() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "state has shape {:?}, expected {:?}", state.full.shape(), expected)));
    }
    let rho = marginal_sum(
        state.full.iter().map(|a| a * a),
        state.full.shape(),
        2,
        system.grid_size(),
    );
    Ok(rho * system.dx().powi(system.count() as i32 - 1))
}

/// One-particle density of a (possibly unsymmetrized) spatial snapshot.
pub fn snapshot_density(system: &System, space: &nd::ArrayD<C64>)
    -> ManyBodyResult<nd::Array1<f64>>
{
    if space.shape() != system.space_shape().as_slice() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "snapshot has shape {:?}, expected {:?}",
            space.shape(), system.space_shape(),
        )));
    }
    let rho = marginal_sum(
        space.iter().map(|a| a.norm_sqr()),
        space.shape(),
        1,
        system.grid_size(),
    );
    Ok(rho * system.dx().powi(system.count() as i32 - 1))
}

/// `⟨ψ|H|ψ⟩` for a spatial wavefunction normalized with volume element
/// `volume`.
pub fn energy_expectation(h: &CsrMatrix, psi: &nd::ArrayD<C64>, volume: f64)
    -> ManyBodyResult<f64>
{
    if psi.len() != h.ncols() {
        return Err(ManyBodyError::ShapeMismatch(format!(
            "wavefunction has {} entries, Hamiltonian has dimension {}",
            psi.len(), h.ncols(),
        )));
    }
    let flat: nd::Array1<C64> = psi.iter().copied().collect();
    let hpsi = h.dot(&flat);
    let e: C64 = flat.iter().zip(hpsi.iter()).map(|(a, b)| a.conj() * b).sum();
    Ok(e.re * volume)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        antisymmetrize::{ antisymmetrize, spin_tensor },
        config::AntisymParams,
        system::{ parse_electrons, test::harmonic },
    };

    #[test]
    fn density_integrates_to_count() {
        let sys = harmonic(4, 1.0, 1.0, "ud");
        let dx = sys.dx();
        let orb0 = nd::array![0.5, 0.5, 0.5, 0.5];
        let orb1 = nd::array![0.5, -0.5, 0.5, -0.5];
        let space = nd::ArrayD::from_shape_fn(nd::IxDyn(&[4, 4]), |ix| {
            orb0[ix[0]] * orb1[ix[1]]
        });
        let spin = spin_tensor(&parse_electrons("ud").unwrap());
        let anti = antisymmetrize(
            &[space.clone()], &spin, &[1.0], dx, &AntisymParams::default(),
        ).unwrap();
        let state = ManyBodyState {
            space,
            spin,
            full: anti.fulls[0].clone(),
            energy: 1.0,
        };
        let rho = density(&sys, &state).unwrap();
        assert!((rho.sum() * dx - 2.0).abs() < 1e-12);
        assert_eq!(total_energy(&state), 1.0);
        assert!((state.full.norm_on(dx * dx) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn expectation_of_eigenvector() {
        let h = CsrMatrix::from_diag(&nd::array![1.0, 2.0, 3.0, 4.0]);
        let psi = nd::ArrayD::from_shape_vec(
            nd::IxDyn(&[2, 2]),
            vec![C64::new(0.0, 0.0), C64::new(0.0, 1.0), C64::new(0.0, 0.0), C64::new(0.0, 0.0)],
        ).unwrap();
        let e = energy_expectation(&h, &psi, 1.0).unwrap();
        assert!((e - 2.0).abs() < 1e-15);
        assert!(energy_expectation(&h, &nd::ArrayD::zeros(nd::IxDyn(&[3])), 1.0).is_err());
    }
}
