//! Multi-stage optimal-control QP description.
//!
//! Stage `i` of a horizon with `N` transitions has state `x_i` (`nx[i]`),
//! control `u_i` (`nu[i]`, `nu[N] = 0`), and
//!
//! - dynamics `x_{i+1} = A_i x_i + B_i u_i + b_i` for `i < N`,
//! - cost `½ xᵀQx + uᵀSx + ½ uᵀRu + qᵀx + rᵀu` with `S` of shape `nu x nx`,
//! - simple bounds `lb <= [x_i; u_i][idxb] <= ub`,
//! - general constraints `lc <= Cx x_i + Cu u_i <= uc`.
//!
//! `Q` and `R` are assumed symmetric.

use nalgebra::{DMatrix, DVector};

use crate::error::DimensionError;

/// Per-stage dimensions. Every vector has `N + 1` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcpQpDims {
    pub nx: Vec<usize>,
    pub nu: Vec<usize>,
    pub nb: Vec<usize>,
    pub nc: Vec<usize>,
}

impl OcpQpDims {
    pub fn new(
        nx: Vec<usize>,
        nu: Vec<usize>,
        nb: Vec<usize>,
        nc: Vec<usize>,
    ) -> Result<Self, DimensionError> {
        let dims = Self { nx, nu, nb, nc };
        dims.validate()?;
        Ok(dims)
    }

    /// Same dimensions on every stage, no controls on the terminal stage.
    pub fn uniform(horizon: usize, nx: usize, nu: usize, nb: usize, nc: usize) -> Self {
        let mut dims = Self {
            nx: vec![nx; horizon + 1],
            nu: vec![nu; horizon + 1],
            nb: vec![nb; horizon + 1],
            nc: vec![nc; horizon + 1],
        };
        dims.nu[horizon] = 0;
        dims
    }

    /// Number of transitions `N`.
    pub fn horizon(&self) -> usize {
        self.nx.len().saturating_sub(1)
    }

    /// `Σ nu[i]` for `i < N`. The states, `x_0` included, are eliminated.
    pub fn num_condensed_vars(&self) -> usize {
        self.nu[..self.horizon()].iter().sum()
    }

    /// `Σ (nc[i] + nx[i])` over all stages: every stage contributes its general
    /// constraints plus one row per state component.
    pub fn num_dense_constraints(&self) -> usize {
        self.nc.iter().zip(&self.nx).map(|(nc, nx)| nc + nx).sum()
    }

    /// Offset of `u_i` in the condensed variable vector.
    pub fn control_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.nu.len());
        let mut acc = 0;
        for nu in &self.nu {
            offsets.push(acc);
            acc += nu;
        }
        offsets
    }

    /// First dense constraint row of stage `i`.
    pub fn row_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.nx.len());
        let mut acc = 0;
        for (nc, nx) in self.nc.iter().zip(&self.nx) {
            offsets.push(acc);
            acc += nc + nx;
        }
        offsets
    }

    pub fn validate(&self) -> Result<(), DimensionError> {
        if self.nx.len() < 2 {
            return Err(DimensionError::EmptyHorizon);
        }
        let stages = self.nx.len();
        for (what, len) in [("nu", self.nu.len()), ("nb", self.nb.len()), ("nc", self.nc.len())] {
            if len != stages {
                return Err(DimensionError::StageCount { what, expected: stages, got: len });
            }
        }
        let terminal = self.nu[stages - 1];
        if terminal != 0 {
            return Err(DimensionError::TerminalControls { nu: terminal });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dynamics {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub offset: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageCost {
    pub q: DMatrix<f64>,
    pub s: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub q_vec: DVector<f64>,
    pub r_vec: DVector<f64>,
}

/// Simple bounds on the stacked stage vector `[x_i; u_i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageBounds {
    pub idxb: Vec<usize>,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralConstraints {
    pub cx: DMatrix<f64>,
    pub cu: DMatrix<f64>,
    pub lc: DVector<f64>,
    pub uc: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcpQp {
    pub dims: OcpQpDims,
    /// `N` transitions.
    pub dynamics: Vec<Dynamics>,
    /// `N + 1` stages, the remaining fields too.
    pub cost: Vec<StageCost>,
    pub bounds: Vec<StageBounds>,
    pub constraints: Vec<GeneralConstraints>,
}

impl OcpQp {
    /// Zero-initialized problem of the given shape. Bounds default to
    /// `idxb = 0..nb[i]` with infinite limits.
    pub fn zeros(dims: OcpQpDims) -> Self {
        let n = dims.horizon();
        let dynamics = (0..n)
            .map(|i| Dynamics {
                a: DMatrix::zeros(dims.nx[i + 1], dims.nx[i]),
                b: DMatrix::zeros(dims.nx[i + 1], dims.nu[i]),
                offset: DVector::zeros(dims.nx[i + 1]),
            })
            .collect();
        let cost = (0..=n)
            .map(|i| StageCost {
                q: DMatrix::zeros(dims.nx[i], dims.nx[i]),
                s: DMatrix::zeros(dims.nu[i], dims.nx[i]),
                r: DMatrix::zeros(dims.nu[i], dims.nu[i]),
                q_vec: DVector::zeros(dims.nx[i]),
                r_vec: DVector::zeros(dims.nu[i]),
            })
            .collect();
        let bounds = (0..=n)
            .map(|i| StageBounds {
                idxb: (0..dims.nb[i]).collect(),
                lb: DVector::from_element(dims.nb[i], f64::NEG_INFINITY),
                ub: DVector::from_element(dims.nb[i], f64::INFINITY),
            })
            .collect();
        let constraints = (0..=n)
            .map(|i| GeneralConstraints {
                cx: DMatrix::zeros(dims.nc[i], dims.nx[i]),
                cu: DMatrix::zeros(dims.nc[i], dims.nu[i]),
                lc: DVector::from_element(dims.nc[i], f64::NEG_INFINITY),
                uc: DVector::from_element(dims.nc[i], f64::INFINITY),
            })
            .collect();

        Self { dims, dynamics, cost, bounds, constraints }
    }

    pub fn horizon(&self) -> usize {
        self.dims.horizon()
    }

    /// Dense rows some stage constraint lands on: every general row plus one
    /// per state bound past stage 0. The dense QP still reserves `nx[i]` rows per
    /// stage; this is the count a packed layout would need.
    pub fn bounded_row_count(&self) -> usize {
        let general: usize = self.dims.nc.iter().sum();
        let state = self
            .bounds
            .iter()
            .zip(&self.dims.nx)
            .skip(1)
            .map(|(b, &nx)| b.idxb.iter().filter(|&&k| k < nx).count())
            .sum::<usize>();
        general + state
    }

    /// Checks every block against `dims`.
    pub fn validate(&self) -> Result<(), DimensionError> {
        self.dims.validate()?;
        let n = self.horizon();
        let (nx, nu) = (&self.dims.nx, &self.dims.nu);

        for (what, expected, got) in [
            ("dynamics", n, self.dynamics.len()),
            ("cost", n + 1, self.cost.len()),
            ("bounds", n + 1, self.bounds.len()),
            ("constraints", n + 1, self.constraints.len()),
        ] {
            if expected != got {
                return Err(DimensionError::StageCount { what, expected, got });
            }
        }

        for (i, d) in self.dynamics.iter().enumerate() {
            check_shape(i, "A", &d.a, nx[i + 1], nx[i])?;
            check_shape(i, "B", &d.b, nx[i + 1], nu[i])?;
            check_len(i, "b", &d.offset, nx[i + 1])?;
        }

        for i in 0..=n {
            let c = &self.cost[i];
            check_shape(i, "Q", &c.q, nx[i], nx[i])?;
            check_shape(i, "S", &c.s, nu[i], nx[i])?;
            check_shape(i, "R", &c.r, nu[i], nu[i])?;
            check_len(i, "q", &c.q_vec, nx[i])?;
            check_len(i, "r", &c.r_vec, nu[i])?;

            let b = &self.bounds[i];
            let nb = self.dims.nb[i];
            if b.idxb.len() != nb {
                return Err(DimensionError::StageCount {
                    what: "idxb",
                    expected: nb,
                    got: b.idxb.len(),
                });
            }
            check_len(i, "lb", &b.lb, nb)?;
            check_len(i, "ub", &b.ub, nb)?;
            let limit = nx[i] + nu[i];
            if let Some(&index) = b.idxb.iter().find(|&&index| index >= limit) {
                return Err(DimensionError::BoundIndex { stage: i, index, limit });
            }

            let g = &self.constraints[i];
            let nc = self.dims.nc[i];
            check_shape(i, "Cx", &g.cx, nc, nx[i])?;
            check_shape(i, "Cu", &g.cu, nc, nu[i])?;
            check_len(i, "lc", &g.lc, nc)?;
            check_len(i, "uc", &g.uc, nc)?;
        }

        Ok(())
    }

    /// Cost of a stage-wise trajectory, constant terms excluded.
    pub fn objective(&self, x: &[DVector<f64>], u: &[DVector<f64>]) -> f64 {
        let mut total = 0.0;
        for (i, c) in self.cost.iter().enumerate() {
            let xi = &x[i];
            total += 0.5 * xi.dot(&(&c.q * xi)) + c.q_vec.dot(xi);
            if let Some(ui) = u.get(i) {
                total += ui.dot(&(&c.s * xi)) + 0.5 * ui.dot(&(&c.r * ui)) + c.r_vec.dot(ui);
            }
        }
        total
    }
}

fn check_shape(
    stage: usize,
    block: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), DimensionError> {
    let (got_rows, got_cols) = m.shape();
    if (got_rows, got_cols) != (rows, cols) {
        return Err(DimensionError::Shape { stage, block, rows, cols, got_rows, got_cols });
    }
    Ok(())
}

fn check_len(
    stage: usize,
    block: &'static str,
    v: &DVector<f64>,
    len: usize,
) -> Result<(), DimensionError> {
    if v.len() != len {
        return Err(DimensionError::Shape {
            stage,
            block,
            rows: len,
            cols: 1,
            got_rows: v.len(),
            got_cols: 1,
        });
    }
    Ok(())
}
