//! Boundary to the external dense QP solver.
//!
//! The condensing engine accumulates `H` and `A` column-major; solvers in
//! this family expect row-major buffers. [`RowMajorQp`] is the one place
//! the layout changes.

use dense_linalg::kernels::{mat_copy, MatMut, MatRef};

use crate::dense_qp::DenseQp;

/// Status reported by a dense QP solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Optimal,
    /// Working-set recalculation or CPU-time budget exhausted.
    MaxIterations,
    Infeasible,
    Unbounded,
    NumericalFailure,
    /// Solver-specific code with no mapping above.
    Other(i32),
}

impl SolverStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolverStatus::Optimal)
    }
}

/// Iteration and time limits handed to the solver on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBudget {
    pub max_working_set_recalculations: usize,
    /// Seconds.
    pub max_cpu_time: f64,
}

impl Default for SolverBudget {
    fn default() -> Self {
        Self { max_working_set_recalculations: 1000, max_cpu_time: 100.0 }
    }
}

/// Dense QP in the row-major layout of the solver boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMajorQp {
    pub n_var: usize,
    pub n_con: usize,
    /// `n_var × n_var`, row-major.
    pub hessian: Vec<f64>,
    pub gradient: Vec<f64>,
    /// `n_con × n_var`, row-major.
    pub constraints: Vec<f64>,
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
    pub lb_a: Vec<f64>,
    pub ub_a: Vec<f64>,
}

impl RowMajorQp {
    pub fn from_dense(qp: &DenseQp) -> Self {
        let n_var = qp.num_vars();
        let n_con = qp.num_constraints();

        let mut hessian = vec![0.0; n_var * n_var];
        mat_copy(
            MatRef::from_dmatrix(&qp.hessian),
            &mut MatMut::row_major(&mut hessian, n_var, n_var, n_var),
        );

        let mut constraints = vec![0.0; n_con * n_var];
        mat_copy(
            MatRef::from_dmatrix(&qp.constraints),
            &mut MatMut::row_major(&mut constraints, n_con, n_var, n_var),
        );

        Self {
            n_var,
            n_con,
            hessian,
            gradient: qp.gradient.as_slice().to_vec(),
            constraints,
            lb: qp.lb.as_slice().to_vec(),
            ub: qp.ub.as_slice().to_vec(),
            lb_a: qp.lb_a.as_slice().to_vec(),
            ub_a: qp.ub_a.as_slice().to_vec(),
        }
    }

    /// One multiplier per bound plus one per constraint row.
    pub fn dual_len(&self) -> usize {
        self.n_var + self.n_con
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub status: SolverStatus,
    /// One entry per condensed control.
    pub primal: Vec<f64>,
    /// Bound multipliers followed by constraint-row multipliers.
    pub dual: Vec<f64>,
    pub iterations: usize,
}

/// An engine that solves `min ½ uᵀHu + hᵀu  s.t.  lb <= u <= ub, lbA <= Au <= ubA`.
pub trait DenseQpSolver {
    fn solve(
        &mut self,
        qp: &RowMajorQp,
        budget: &SolverBudget,
        dual_guess: Option<&[f64]>,
    ) -> SolverOutput;
}
