#![allow(dead_code, non_snake_case)]

use ndarray as nd;
use ndarray_linalg::{ self as la, Eigh };
use manybody_sim::{
    config::{ LanczosParams, SolverConfig },
    CsrMatrix,
    System,
};

/// Three-point `-½ ∂²` with hard walls at the grid ends.
pub fn three_point_kinetic(grid_size: usize, dx: f64) -> CsrMatrix {
    let c = -0.5 / (dx * dx);
    let triplets = (0..grid_size)
        .flat_map(|i| {
            let lower = (i > 0).then(|| (i, i - 1, c));
            let upper = (i + 1 < grid_size).then(|| (i, i + 1, c));
            [lower, Some((i, i, -2.0 * c)), upper]
        })
        .flatten();
    CsrMatrix::from_triplets(grid_size, grid_size, triplets).unwrap()
}

pub fn grid(grid_size: usize, L: f64) -> nd::Array1<f64> {
    nd::Array1::linspace(-L, L, grid_size)
}

/// Harmonic well `½ω²x²` with interaction kernel `v_int`.
pub fn harmonic_with(grid_size: usize, L: f64, omega: f64, v_int: nd::Array2<f64>, electrons: &str)
    -> System
{
    let x = grid(grid_size, L);
    let dx = x[1] - x[0];
    let v_ext = x.mapv(|xk| 0.5 * omega.powi(2) * xk.powi(2));
    System::new(x, three_point_kinetic(grid_size, dx), &v_ext, v_int, electrons).unwrap()
}

/// Non-interacting harmonic well.
pub fn harmonic(grid_size: usize, L: f64, omega: f64, electrons: &str) -> System {
    harmonic_with(grid_size, L, omega, nd::Array2::zeros((grid_size, grid_size)), electrons)
}

/// Softened Coulomb kernel `1 / (|x - x'| + 1)`.
pub fn softened(x: &nd::Array1<f64>) -> nd::Array2<f64> {
    let g = x.len();
    nd::Array2::from_shape_fn((g, g), |(i, j)| 1.0 / ((x[i] - x[j]).abs() + 1.0))
}

/// Single-particle eigenvalues from a dense diagonalization.
pub fn single_particle_levels(system: &System) -> nd::Array1<f64> {
    let (e, _) = system.single_particle_hamiltonian().to_dense()
        .eigh(la::UPLO::Lower)
        .unwrap();
    e
}

/// Configuration whose Krylov space can cover a whole 400-dimensional
/// problem in one run.
pub fn exact_config() -> SolverConfig {
    SolverConfig {
        lanczos: LanczosParams { max_krylov: 400, ..LanczosParams::default() },
        ..SolverConfig::default()
    }
}
