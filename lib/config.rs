//! Tunable parameters for the eigen-solver, antisymmetrizer, and propagator.
//!
//! Everything has a default; a TOML document may override any subset:
//! ```toml
//! backend = "gpu"
//! interaction = "pair-sum"
//! shift = -1.0
//! max_level_retries = 6
//! norm_tol = 1e-6
//!
//! [lanczos]
//! tol = 1e-10
//! max_krylov = 120
//! max_restarts = 64
//! seed = 10546
//!
//! [antisymmetrize]
//! zero_tol = 1e-6
//! dup_rtol = 1e-5
//! dup_atol = 1e-8
//!
//! [propagate]
//! krylov_dim = 30
//! tol = 1e-10
//! max_halvings = 24
//! ```

use std::sync::OnceLock;
use serde::Deserialize;
use crate::error::{ ManyBodyError, ManyBodyResult };

/// Name of the environment variable selecting the shift-invert backend.
pub const GPU_ENV_VAR: &str = "MANYBODY_GPU";

/// Eigen-solver backend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Lanczos on `H` for its smallest-algebraic eigenvalues.
    #[default]
    Cpu,
    /// Shift-invert around [`SolverConfig::shift`] with an LU factorization as
    /// the inverse operator.
    #[serde(alias = "shift-invert")]
    Gpu,
}

impl Backend {
    /// Interpret the value of the backend toggle; anything but `True`, `true`,
    /// or `1` (including absence) selects the CPU.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("True") | Some("true") | Some("1") => Self::Gpu,
            _ => Self::Cpu,
        }
    }

    /// Read the toggle from [`GPU_ENV_VAR`].
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(GPU_ENV_VAR).ok().as_deref())
    }

    /// The backend for this process, resolved from the environment on first
    /// call and fixed afterward.
    pub fn process_default() -> Self {
        static BACKEND: OnceLock<Backend> = OnceLock::new();
        *BACKEND.get_or_init(|| {
            let backend = Self::from_env();
            tracing::debug!(?backend, "resolved eigen-solver backend");
            backend
        })
    }
}

/// How the diagonal pairwise interaction is evaluated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionScheme {
    /// Product of `exp(v_int)` over all pairs followed by a single logarithm.
    /// Each kernel value must satisfy `v < ~709` so that `exp(v)` is finite.
    #[default]
    #[serde(alias = "log", alias = "log_domain")]
    LogDomain,
    /// Direct sum of kernel values over all pairs; no range restriction.
    #[serde(alias = "direct", alias = "pair_sum")]
    PairSum,
}

/// Parameters for the restarted Lanczos iteration.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanczosParams {
    /// Convergence threshold on Ritz residuals, relative to the largest Ritz
    /// value in magnitude.
    pub tol: f64,
    /// Maximum Krylov subspace size per restart.
    pub max_krylov: usize,
    /// Maximum number of restarts.
    pub max_restarts: usize,
    /// Seed for the random starting vectors.
    pub seed: u64,
}

impl Default for LanczosParams {
    fn default() -> Self {
        Self { tol: 1e-10, max_krylov: 120, max_restarts: 64, seed: 10546 }
    }
}

/// Tolerances for the antisymmetrizer.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AntisymParams {
    /// A candidate is discarded as null if its largest antisymmetrized
    /// magnitude falls below this fraction of the candidate's own.
    pub zero_tol: f64,
    /// Relative tolerance for calling two magnitude patterns equal.
    pub dup_rtol: f64,
    /// Absolute tolerance for calling two magnitude patterns equal.
    pub dup_atol: f64,
}

impl Default for AntisymParams {
    fn default() -> Self {
        Self { zero_tol: 1e-6, dup_rtol: 1e-5, dup_atol: 1e-8 }
    }
}

/// Parameters for the Krylov matrix-exponential action.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpmParams {
    /// Krylov subspace size per sub-step.
    pub krylov_dim: usize,
    /// Error tolerance per sub-step, relative to the vector norm.
    pub tol: f64,
    /// Maximum number of times a sub-step may be halved.
    pub max_halvings: usize,
}

impl Default for ExpmParams {
    fn default() -> Self {
        Self { krylov_dim: 30, tol: 1e-10, max_halvings: 24 }
    }
}

/// All tunables for [`Solver`][crate::solve::Solver].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub backend: Backend,
    pub interaction: InteractionScheme,
    pub lanczos: LanczosParams,
    /// Shift σ used by the shift-invert backend; `None` places it just below
    /// the Gershgorin lower bound of the Hamiltonian's spectrum.
    pub shift: Option<f64>,
    #[serde(rename = "antisymmetrize")]
    pub antisym: AntisymParams,
    /// Number of times [`Solver::solve_adaptive`][crate::solve::Solver::solve_adaptive]
    /// may double the excitation budget.
    pub max_level_retries: usize,
    #[serde(rename = "propagate")]
    pub expm: ExpmParams,
    /// Maximum allowed deviation of the wavefunction norm from 1 during
    /// propagation.
    pub norm_tol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cpu,
            interaction: InteractionScheme::LogDomain,
            lanczos: LanczosParams::default(),
            shift: None,
            antisym: AntisymParams::default(),
            max_level_retries: 4,
            expm: ExpmParams::default(),
            norm_tol: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Parse a configuration from a TOML document, falling back to defaults
    /// for anything not present. Unknown keys and tables are rejected.
    pub fn from_toml_str(src: &str) -> ManyBodyResult<Self> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> ManyBodyResult<()> {
        if self.lanczos.max_krylov < 2 {
            return Err(ManyBodyError::Config(
                "lanczos.max_krylov must be at least 2".into()));
        }
        if self.expm.krylov_dim < 1 {
            return Err(ManyBodyError::Config(
                "propagate.krylov_dim must be at least 1".into()));
        }
        let positive = [
            ("lanczos.tol", self.lanczos.tol),
            ("antisymmetrize.zero_tol", self.antisym.zero_tol),
            ("propagate.tol", self.expm.tol),
            ("norm_tol", self.norm_tol),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ManyBodyError::Config(
                    format!("{} must be positive and finite", name)));
            }
        }
        if self.shift.is_some_and(|s| !s.is_finite()) {
            return Err(ManyBodyError::Config("shift must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_toggle() {
        assert_eq!(Backend::from_env_value(None), Backend::Cpu);
        assert_eq!(Backend::from_env_value(Some("True")), Backend::Gpu);
        assert_eq!(Backend::from_env_value(Some("1")), Backend::Gpu);
        assert_eq!(Backend::from_env_value(Some("false")), Backend::Cpu);
        assert_eq!(Backend::from_env_value(Some("yes")), Backend::Cpu);
    }

    #[test]
    fn toml_overrides_defaults() {
        let src = r#"
            backend = "gpu"
            interaction = "pair-sum"
            shift = -2
            norm_tol = 1e-8

            [lanczos]
            max_krylov = 80
            seed = 7

            [propagate]
            max_halvings = 3
        "#;
        let config = SolverConfig::from_toml_str(src).unwrap();
        assert_eq!(config.backend, Backend::Gpu);
        assert_eq!(config.interaction, InteractionScheme::PairSum);
        assert_eq!(config.shift, Some(-2.0));
        assert_eq!(config.lanczos.max_krylov, 80);
        assert_eq!(config.lanczos.seed, 7);
        assert_eq!(config.lanczos.tol, LanczosParams::default().tol);
        assert_eq!(config.norm_tol, 1e-8);
        assert_eq!(config.expm.max_halvings, 3);
        assert_eq!(config.expm.krylov_dim, ExpmParams::default().krylov_dim);
        assert_eq!(config.antisym, AntisymParams::default());
    }

    #[test]
    fn toml_aliases() {
        let config = SolverConfig::from_toml_str(
            "backend = \"shift-invert\"\ninteraction = \"direct\"").unwrap();
        assert_eq!(config.backend, Backend::Gpu);
        assert_eq!(config.interaction, InteractionScheme::PairSum);
        let config = SolverConfig::from_toml_str("interaction = \"log\"").unwrap();
        assert_eq!(config.interaction, InteractionScheme::LogDomain);
    }

    #[test]
    fn toml_rejects_misspelled_keys() {
        let misspelled = [
            "bakend = \"gpu\"",
            "[lanczos]\nmax_krylv = 5",
            "[propagat]\nkrylov_dim = 10",
            "[antisymmetrise]\nzero_tol = 1e-3",
            "[propagate]\nnorm_tol = 1e-8",
        ];
        for src in misspelled {
            assert!(
                matches!(SolverConfig::from_toml_str(src), Err(ManyBodyError::Toml(_))),
                "accepted {:?}", src,
            );
        }
    }

    #[test]
    fn toml_rejects_bad_values() {
        assert!(SolverConfig::from_toml_str("backend = \"tpu\"").is_err());
        assert!(SolverConfig::from_toml_str("[lanczos]\ntol = \"small\"").is_err());
        assert!(SolverConfig::from_toml_str("[lanczos]\nmax_krylov = 1").is_err());
        assert!(SolverConfig::from_toml_str("shift = ").is_err());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SolverConfig::from_toml_str("").unwrap(), SolverConfig::default());
    }
}
