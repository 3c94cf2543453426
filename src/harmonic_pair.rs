#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Ground state of two opposite-spin electrons in a harmonic well with a
//! softened Coulomb repulsion, followed by a short kick-and-evolve run.
//!
//! An optional first argument names a TOML file of solver parameters.
//! Logging is controlled by `RUST_LOG`.

use std::path::PathBuf;
use anyhow::Context;
use ndarray as nd;
use tracing_subscriber::{ EnvFilter, layer::SubscriberExt, util::SubscriberInitExt };
use manybody_sim::{
    observables::{ density, energy_expectation, snapshot_density },
    CsrMatrix,
    Solver,
    SolverConfig,
    System,
};

const G: usize = 30; // grid points
const L: f64 = 6.0; // half-width of the box
const omega: f64 = 1.0;
const kick: f64 = 0.05; // linear field strength
const T: f64 = 2.0;
const steps: usize = 40;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn kinetic(grid_size: usize, dx: f64) -> anyhow::Result<CsrMatrix> {
    let c = -0.5 / (dx * dx);
    let triplets = (0..grid_size)
        .flat_map(|i| {
            let lower = (i > 0).then(|| (i, i - 1, c));
            let upper = (i + 1 < grid_size).then(|| (i, i + 1, c));
            [lower, Some((i, i, -2.0 * c)), upper]
        })
        .flatten();
    Ok(CsrMatrix::from_triplets(grid_size, grid_size, triplets)?)
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let src = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            SolverConfig::from_toml_str(&src)?
        },
        None => SolverConfig::default(),
    };
    let solver = Solver::new(config);

    let x: nd::Array1<f64> = nd::Array1::linspace(-L, L, G);
    let dx = x[1] - x[0];
    let v_ext = x.mapv(|xk| 0.5 * omega.powi(2) * xk.powi(2));
    let v_int = nd::Array2::from_shape_fn((G, G), |(i, j)| {
        1.0 / ((x[i] - x[j]).abs() + 1.0)
    });
    let system = System::new(x.clone(), kinetic(G, dx)?, &v_ext, v_int, "ud")?;
    println!("{}", system);

    let H = solver.hamiltonian(&system)?;
    let ground = solver.solve_adaptive(&system, Some(&H), 0)?;
    let rho = density(&system, &ground)?;
    println!("ground-state energy: {:.8}", ground.energy);
    println!("density integral:    {:.8}", rho.sum() * dx);

    let t: nd::Array1<f64> = nd::Array1::linspace(0.0, T, steps + 1);
    let v_ptrb = nd::Array2::from_shape_fn((t.len(), G), |(_, i)| kick * x[i]);
    let evolution = solver.propagate(&system, &ground, &v_ptrb, &t, Some(&H))?;
    let volume = system.volume_element();
    for (j, snapshot) in evolution.td_space().iter().enumerate().step_by(steps / 4) {
        let rho_t = snapshot_density(&system, snapshot)?;
        let dipole: f64 = rho_t.iter().zip(x.iter()).map(|(r, xk)| r * xk).sum::<f64>() * dx;
        let energy = energy_expectation(&H, snapshot, volume)?;
        println!("t = {:.3}: <x> = {:+.6e}, <H0> = {:.8}", t[j], dipole, energy);
    }
    Ok(())
}
