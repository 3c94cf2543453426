#![allow(dead_code, non_snake_case)]

//! Exact diagonalization and real-time propagation of a few interacting
//! fermions on a one-dimensional grid.
//!
//! Single-particle operators are lifted into the `grid_size^count` product
//! space via Kronecker products, a diagonal pairwise interaction is added, the
//! lowest eigenpairs of the resulting sparse Hamiltonian are found, and raw
//! product-space eigenvectors are antisymmetrized into Pauli-allowed states.
//! Those states can then be propagated under a time-dependent local potential.

pub mod error;
pub mod config;
pub mod sparse;
pub mod system;
pub mod lift;
pub mod interaction;
pub mod hamiltonian;
pub mod eigen;
pub mod antisymmetrize;
pub mod state;
pub mod observables;
pub mod solve;
pub mod expm;
pub mod propagate;

pub use crate::{
    config::{ Backend, InteractionScheme, SolverConfig },
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
    system::{ SpinLabel, System },
    state::{ ManyBodyEvolution, ManyBodyState },
    solve::{ Solver, solve, propagate },
};
