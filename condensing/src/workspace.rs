//! Sensitivity workspace of one condensing call.
//!
//! Blocks indexed by `(stage, earlier stage)` are stored in a single
//! contiguous arena. Slot `(i, j)` with `j <= i` lives at position
//! `i (i + 1) / 2 + j`, so the blocks of later stages always follow the
//! blocks they are computed from.

use dense_linalg::kernels::{gemm, gemv, mat_copy, MatMut, MatRef};
use nalgebra::DVector;

use crate::error::{CondensingError, DimensionError};
use crate::ocp_qp::{OcpQp, OcpQpDims};

#[derive(Debug, Clone)]
pub(crate) struct TriangularArena {
    data: Vec<f64>,
    offsets: Vec<usize>,
    shapes: Vec<(usize, usize)>,
}

impl TriangularArena {
    /// Zeroed blocks for `0 <= j <= i < stages`, block `(i, j)` of `shape(i, j)`.
    pub(crate) fn new(stages: usize, shape: impl Fn(usize, usize) -> (usize, usize)) -> Self {
        let slots = stages * (stages + 1) / 2;
        let mut offsets = Vec::with_capacity(slots);
        let mut shapes = Vec::with_capacity(slots);
        let mut total = 0;
        for i in 0..stages {
            for j in 0..=i {
                let (rows, cols) = shape(i, j);
                offsets.push(total);
                shapes.push((rows, cols));
                total += rows * cols;
            }
        }
        Self { data: vec![0.0; total], offsets, shapes }
    }

    #[inline]
    fn slot(i: usize, j: usize) -> usize {
        debug_assert!(j <= i);
        i * (i + 1) / 2 + j
    }

    pub(crate) fn block(&self, i: usize, j: usize) -> MatRef<'_> {
        let slot = Self::slot(i, j);
        let (rows, cols) = self.shapes[slot];
        MatRef::col_major(&self.data[self.offsets[slot]..], rows, cols, rows)
    }

    pub(crate) fn block_mut(&mut self, i: usize, j: usize) -> MatMut<'_> {
        let slot = Self::slot(i, j);
        let (rows, cols) = self.shapes[slot];
        MatMut::col_major(&mut self.data[self.offsets[slot]..], rows, cols, rows)
    }

    /// Reads block `src` while writing block `dst`; `src` must come first.
    pub(crate) fn chained_mut(
        &mut self,
        src: (usize, usize),
        dst: (usize, usize),
    ) -> (MatRef<'_>, MatMut<'_>) {
        let src_slot = Self::slot(src.0, src.1);
        let dst_slot = Self::slot(dst.0, dst.1);
        assert!(src_slot < dst_slot, "source block must precede destination block");

        let (head, tail) = self.data.split_at_mut(self.offsets[dst_slot]);
        let (src_rows, src_cols) = self.shapes[src_slot];
        let (dst_rows, dst_cols) = self.shapes[dst_slot];
        (
            MatRef::col_major(&head[self.offsets[src_slot]..], src_rows, src_cols, src_rows),
            MatMut::col_major(tail, dst_rows, dst_cols, dst_rows),
        )
    }
}

/// State and control sequences of the stage-wise problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// `x_0 .. x_N`
    pub x: Vec<DVector<f64>>,
    /// `u_0 .. u_{N-1}`
    pub u: Vec<DVector<f64>>,
}

/// Affine maps from the condensed controls to every state:
/// `x_{i+1} = g[i] + Σ_{j<=i} G[i][j] u_j`, plus the matching constraint
/// sensitivities `D[i][j]`.
#[derive(Debug, Clone)]
pub struct SensitivityWorkspace {
    dims: OcpQpDims,
    control_offsets: Vec<usize>,
    g: TriangularArena,
    free: Vec<DVector<f64>>,
    d: TriangularArena,
}

impl SensitivityWorkspace {
    /// Allocates every block; shapes are fixed by `dims` before any numeric work.
    pub(crate) fn new(dims: &OcpQpDims) -> Self {
        let n = dims.horizon();
        let g = TriangularArena::new(n, |i, j| (dims.nx[i + 1], dims.nu[j]));
        let d = TriangularArena::new(n + 1, |i, j| (dims.nc[i], dims.nu[j]));
        Self {
            dims: dims.clone(),
            control_offsets: dims.control_offsets(),
            g,
            free: Vec::with_capacity(n),
            d,
        }
    }

    pub fn horizon(&self) -> usize {
        self.dims.horizon()
    }

    pub fn dims(&self) -> &OcpQpDims {
        &self.dims
    }

    pub fn control_offset(&self, stage: usize) -> usize {
        self.control_offsets[stage]
    }

    /// `G[i][j]`: sensitivity of `x_{i+1}` to `u_j`, `j <= i`.
    pub fn sensitivity(&self, i: usize, j: usize) -> MatRef<'_> {
        self.g.block(i, j)
    }

    /// `g[i]`: value of `x_{i+1}` with all controls at zero.
    pub fn free_response(&self, i: usize) -> &DVector<f64> {
        &self.free[i]
    }

    /// `D[i][j]`: sensitivity of the general constraints of stage `i` to `u_j`.
    pub fn constraint_sensitivity(&self, i: usize, j: usize) -> MatRef<'_> {
        self.d.block(i, j)
    }

    /// Single forward sweep over the dynamics, seeded by `x0`.
    pub(crate) fn propagate(&mut self, qp: &OcpQp, x0: &DVector<f64>) {
        self.free.clear();
        for (i, dynamics) in qp.dynamics.iter().enumerate() {
            let a = MatRef::from_dmatrix(&dynamics.a);

            let mut gi = dynamics.offset.clone();
            let prev = if i == 0 { x0 } else { &self.free[i - 1] };
            gemv(1.0, a, prev.as_slice(), gi.as_mut_slice());
            self.free.push(gi);

            for j in 0..i {
                let (src, mut dst) = self.g.chained_mut((i - 1, j), (i, j));
                gemm(1.0, a, src, 0.0, &mut dst);
            }
            mat_copy(MatRef::from_dmatrix(&dynamics.b), &mut self.g.block_mut(i, i));
        }
    }

    /// Fills `D[i][j] = Cx_i G[i-1][j]` for `j < i` and `D[i][i] = Cu_i`.
    pub(crate) fn map_constraints(&mut self, qp: &OcpQp) {
        for (i, c) in qp.constraints.iter().enumerate() {
            let cx = MatRef::from_dmatrix(&c.cx);
            for j in 0..i {
                gemm(1.0, cx, self.g.block(i - 1, j), 0.0, &mut self.d.block_mut(i, j));
            }
            mat_copy(MatRef::from_dmatrix(&c.cu), &mut self.d.block_mut(i, i));
        }
    }

    /// Value of `x_i` with all controls at zero (`x0` for the first stage).
    pub(crate) fn stage_constant<'a>(
        &'a self,
        x0: &'a DVector<f64>,
        stage: usize,
    ) -> &'a DVector<f64> {
        if stage == 0 { x0 } else { &self.free[stage - 1] }
    }

    /// Rebuilds the stage-wise trajectory from a condensed primal solution.
    pub fn recover(
        &self,
        x0: &DVector<f64>,
        primal: &[f64],
    ) -> Result<Trajectory, CondensingError> {
        let n = self.horizon();
        if self.free.len() != n {
            return Err(DimensionError::Length {
                what: "propagated stages",
                expected: n,
                got: self.free.len(),
            }
            .into());
        }
        let nvar = self.dims.num_condensed_vars();
        if primal.len() != nvar {
            return Err(DimensionError::Length {
                what: "primal solution",
                expected: nvar,
                got: primal.len(),
            }
            .into());
        }
        if x0.len() != self.dims.nx[0] {
            return Err(DimensionError::Length {
                what: "x0",
                expected: self.dims.nx[0],
                got: x0.len(),
            }
            .into());
        }

        let u: Vec<DVector<f64>> = (0..n)
            .map(|i| {
                let off = self.control_offsets[i];
                DVector::from_column_slice(&primal[off..off + self.dims.nu[i]])
            })
            .collect();

        let mut x = Vec::with_capacity(n + 1);
        x.push(x0.clone());
        for i in 0..n {
            let mut next = self.free[i].clone();
            for (k, uk) in u.iter().enumerate().take(i + 1) {
                gemv(1.0, self.g.block(i, k), uk.as_slice(), next.as_mut_slice());
            }
            x.push(next);
        }

        Ok(Trajectory { x, u })
    }
}
