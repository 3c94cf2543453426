//! Description of a model system: a uniform 1D grid, single-particle
//! operators on it, a pairwise interaction kernel, and a set of spin-labeled
//! electrons.

use std::fmt;
use ndarray as nd;
use crate::{
    error::{ ManyBodyError, ManyBodyResult },
    sparse::CsrMatrix,
};

/// Relative tolerance on grid-spacing uniformity.
const GRID_RTOL: f64 = 1e-8;

/// Spin projection of a single electron.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpinLabel {
    Up,
    Down,
}

impl SpinLabel {
    /// Index of this label in the two-element spin basis `{up, down}`.
    pub fn index(&self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
        }
    }

    pub fn to_char(&self) -> char {
        match self {
            Self::Up => 'u',
            Self::Down => 'd',
        }
    }
}

impl TryFrom<char> for SpinLabel {
    type Error = ManyBodyError;

    fn try_from(c: char) -> ManyBodyResult<Self> {
        match c {
            'u' => Ok(Self::Up),
            'd' => Ok(Self::Down),
            other => Err(ManyBodyError::InvalidSpin(other)),
        }
    }
}

/// Parse a string like `"uud"` into spin labels.
pub fn parse_electrons(electrons: &str) -> ManyBodyResult<Vec<SpinLabel>> {
    electrons.chars().map(SpinLabel::try_from).collect()
}

/// A validated model system.
///
/// The kinetic operator is supplied already discretized (e.g. a finite
/// difference `-½ ∂²` on the grid); the external potential is stored as a
/// sparse operator so that non-local potentials are also representable.
#[derive(Clone, Debug)]
pub struct System {
    x: nd::Array1<f64>,
    dx: f64,
    kinetic_op: CsrMatrix,
    v_ext_op: CsrMatrix,
    v_int: nd::Array2<f64>,
    electrons: Vec<SpinLabel>,
    up_count: usize,
    down_count: usize,
}

impl System {
    /// Create a new system with a local external potential `v_ext` sampled on
    /// the grid.
    pub fn new(
        x: nd::Array1<f64>,
        kinetic_op: CsrMatrix,
        v_ext: &nd::Array1<f64>,
        v_int: nd::Array2<f64>,
        electrons: &str,
    ) -> ManyBodyResult<Self>
    {
        if v_ext.len() != x.len() {
            return Err(ManyBodyError::InvalidSystem(format!(
                "v_ext has length {} but the grid has {} points",
                v_ext.len(), x.len(),
            )));
        }
        Self::with_operators(x, kinetic_op, CsrMatrix::from_diag(v_ext), v_int, electrons)
    }

    /// Create a new system from a prebuilt external-potential operator.
    pub fn with_operators(
        x: nd::Array1<f64>,
        kinetic_op: CsrMatrix,
        v_ext_op: CsrMatrix,
        v_int: nd::Array2<f64>,
        electrons: &str,
    ) -> ManyBodyResult<Self>
    {
        let g = x.len();
        if g < 2 {
            return Err(ManyBodyError::InvalidSystem(
                "grid must have at least two points".into()));
        }
        let dx = x[1] - x[0];
        if !(dx > 0.0 && dx.is_finite()) {
            return Err(ManyBodyError::InvalidSystem(
                "grid must be strictly increasing".into()));
        }
        let uniform = x.iter().zip(x.iter().skip(1))
            .all(|(xk, xkp1)| ((xkp1 - xk) - dx).abs() <= GRID_RTOL * dx);
        if !uniform {
            return Err(ManyBodyError::InvalidSystem(
                "grid spacing must be uniform".into()));
        }
        if kinetic_op.shape() != (g, g) {
            return Err(ManyBodyError::InvalidSystem(format!(
                "kinetic operator has shape {:?}, expected {:?}",
                kinetic_op.shape(), (g, g),
            )));
        }
        if v_ext_op.shape() != (g, g) {
            return Err(ManyBodyError::InvalidSystem(format!(
                "external potential operator has shape {:?}, expected {:?}",
                v_ext_op.shape(), (g, g),
            )));
        }
        if v_int.dim() != (g, g) {
            return Err(ManyBodyError::InvalidSystem(format!(
                "v_int has shape {:?}, expected {:?}", v_int.dim(), (g, g),
            )));
        }
        if v_int.iter().any(|v| !v.is_finite()) {
            return Err(ManyBodyError::InvalidSystem(
                "v_int must be finite everywhere".into()));
        }
        let electrons = parse_electrons(electrons)?;
        if electrons.is_empty() {
            return Err(ManyBodyError::InvalidSystem(
                "system must contain at least one electron".into()));
        }
        let count = electrons.len();
        if g.checked_pow(count as u32).is_none() {
            return Err(ManyBodyError::StateSpaceTooLarge { grid: g, count });
        }
        let up_count
            = electrons.iter().filter(|s| **s == SpinLabel::Up).count();
        let down_count = count - up_count;
        Ok(Self {
            x, dx, kinetic_op, v_ext_op, v_int, electrons, up_count, down_count,
        })
    }

    /// Grid coordinates.
    pub fn x(&self) -> &nd::Array1<f64> { &self.x }

    /// Grid spacing.
    pub fn dx(&self) -> f64 { self.dx }

    /// Number of grid points.
    pub fn grid_size(&self) -> usize { self.x.len() }

    pub fn kinetic_op(&self) -> &CsrMatrix { &self.kinetic_op }

    pub fn v_ext_op(&self) -> &CsrMatrix { &self.v_ext_op }

    /// Diagonal of the external potential operator.
    pub fn v_ext(&self) -> nd::Array1<f64> { self.v_ext_op.diag() }

    /// Pairwise interaction kernel `v_int[x, x']`.
    pub fn v_int(&self) -> &nd::Array2<f64> { &self.v_int }

    pub fn electrons(&self) -> &[SpinLabel] { &self.electrons }

    /// Number of electrons.
    pub fn count(&self) -> usize { self.electrons.len() }

    pub fn up_count(&self) -> usize { self.up_count }

    pub fn down_count(&self) -> usize { self.down_count }

    /// Dimension `grid_size^count` of the many-body product space.
    pub fn state_dim(&self) -> usize {
        // checked at construction
        self.grid_size().pow(self.count() as u32)
    }

    /// Shape `(grid_size,) * count` of a spatial wavefunction tensor.
    pub fn space_shape(&self) -> Vec<usize> { vec![self.grid_size(); self.count()] }

    /// Integration volume element `dx^count`.
    pub fn volume_element(&self) -> f64 { self.dx.powi(self.count() as i32) }

    /// Single-particle Hamiltonian `K + V_ext`.
    pub fn single_particle_hamiltonian(&self) -> CsrMatrix {
        &self.kinetic_op + &self.v_ext_op
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let electrons: String
            = self.electrons.iter().map(SpinLabel::to_char).collect();
        write!(f,
            "System {{ x: [{:.3}, ..., {:.3}] ({} points), dx: {:.4}, \
            electrons: {} }}",
            self.x[0], self.x[self.x.len() - 1], self.x.len(), self.dx,
            electrons,
        )
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Three-point `-½ ∂²` with hard walls at the grid ends.
    pub(crate) fn three_point_kinetic(grid_size: usize, dx: f64) -> CsrMatrix {
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

    /// Harmonic well `½ω²x²` on `grid_size` points over `[-L, L]`.
    pub(crate) fn harmonic(grid_size: usize, L: f64, omega: f64, electrons: &str)
        -> System
    {
        let x = nd::Array1::linspace(-L, L, grid_size);
        let dx = x[1] - x[0];
        let v_ext = x.mapv(|xk| 0.5 * omega.powi(2) * xk.powi(2));
        let v_int = nd::Array2::zeros((grid_size, grid_size));
        System::new(x, three_point_kinetic(grid_size, dx), &v_ext, v_int, electrons)
            .unwrap()
    }

    #[test]
    fn derived_counts() {
        let sys = harmonic(8, 2.0, 1.0, "uud");
        assert_eq!(sys.count(), 3);
        assert_eq!(sys.up_count(), 2);
        assert_eq!(sys.down_count(), 1);
        assert_eq!(sys.state_dim(), 512);
        assert_eq!(sys.space_shape(), vec![8, 8, 8]);
        assert!((sys.volume_element() - sys.dx().powi(3)).abs() < 1e-15);
        assert!(sys.to_string().contains("electrons: uud"));
    }

    #[test]
    fn rejects_malformed_input() {
        let x = nd::Array1::linspace(-1.0, 1.0, 5);
        let dx = x[1] - x[0];
        let k = three_point_kinetic(5, dx);
        let v = nd::Array1::zeros(5);
        let w = nd::Array2::zeros((5, 5));
        assert!(matches!(
            System::new(x.clone(), k.clone(), &v, w.clone(), "ux"),
            Err(ManyBodyError::InvalidSpin('x')),
        ));
        assert!(System::new(x.clone(), k.clone(), &v, w.clone(), "").is_err());
        assert!(System::new(x.clone(), k.clone(), &v, nd::Array2::zeros((4, 5)), "u").is_err());
        assert!(System::new(x.clone(), three_point_kinetic(4, dx), &v, w.clone(), "u").is_err());
        let bent = nd::array![0.0, 0.1, 0.2, 0.35, 0.4];
        assert!(System::new(bent, k.clone(), &v, w.clone(), "u").is_err());
        assert!(matches!(
            System::new(x, k, &v, w, &"u".repeat(40)),
            Err(ManyBodyError::StateSpaceTooLarge { .. }),
        ));
    }

    #[test]
    fn kinetic_stencil() {
        let k = three_point_kinetic(4, 0.5);
        assert_eq!(k.nnz(), 10);
        assert_eq!(k.get(1, 1), 4.0);
        assert_eq!(k.get(1, 0), -2.0);
        assert_eq!(k.get(0, 3), 0.0);
        assert!(k.is_symmetric(0.0));
    }
}
