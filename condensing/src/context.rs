//! Per-control-loop context tying condensing, regularization, the external
//! solver and trajectory recovery together.

use dense_linalg::kernels::two_norm;
use dense_linalg::Regularization;
use log::{debug, warn};
use nalgebra::DVector;

use crate::dense_qp::condense;
use crate::error::{CondensingError, DimensionError};
use crate::ocp_qp::OcpQp;
use crate::solver::{DenseQpSolver, RowMajorQp, SolverBudget, SolverStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondensingConfig {
    /// Eigenvalue repair of the dense Hessian before it reaches the solver.
    pub regularization: Option<Regularization>,
    pub budget: SolverBudget,
    /// Pass the previous dual solution as the initial guess.
    pub warm_start: bool,
}

impl Default for CondensingConfig {
    fn default() -> Self {
        Self { regularization: None, budget: SolverBudget::default(), warm_start: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcpQpSolution {
    /// `x_0 .. x_N`
    pub x: Vec<DVector<f64>>,
    /// `u_0 .. u_{N-1}`
    pub u: Vec<DVector<f64>>,
    /// Dense-QP multipliers: bounds first, then constraint rows.
    pub dual: Vec<f64>,
    pub status: SolverStatus,
    pub iterations: usize,
}

/// Owns the solver handle and the dual buffer carried between calls.
///
/// Condensing buffers are locals of [`CondensingContext::solve`]; nothing is
/// shared between contexts.
#[derive(Debug)]
pub struct CondensingContext<S> {
    solver: S,
    config: CondensingConfig,
    dual: Vec<f64>,
}

impl<S: DenseQpSolver> CondensingContext<S> {
    pub fn new(solver: S, config: CondensingConfig) -> Self {
        Self { solver, config, dual: Vec::new() }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn config(&self) -> &CondensingConfig {
        &self.config
    }

    /// Dual solution of the last successful call.
    pub fn last_dual(&self) -> &[f64] {
        &self.dual
    }

    pub fn reset_warm_start(&mut self) {
        self.dual.clear();
    }

    /// Condenses `qp` around `x0`, solves the dense QP and expands the
    /// solution back to stage-wise states and controls.
    pub fn solve(
        &mut self,
        qp: &OcpQp,
        x0: &DVector<f64>,
    ) -> Result<OcpQpSolution, CondensingError> {
        let (mut dense, workspace) = condense(qp, x0)?;

        if let Some(regularization) = &self.config.regularization {
            regularization.apply(&mut dense.hessian)?;
        }

        let boundary = RowMajorQp::from_dense(&dense);
        let guess = if self.config.warm_start && self.dual.len() == boundary.dual_len() {
            Some(self.dual.as_slice())
        } else {
            None
        };

        let output = self.solver.solve(&boundary, &self.config.budget, guess);
        if !output.status.is_success() {
            warn!(
                "dense QP solver returned {:?} after {} iterations",
                output.status, output.iterations
            );
            return Err(CondensingError::Solver { status: output.status });
        }
        debug!(
            "dense QP solved in {} iterations, |u| = {:e}",
            output.iterations,
            two_norm(&output.primal)
        );

        if output.dual.len() != boundary.dual_len() {
            return Err(DimensionError::Length {
                what: "dual solution",
                expected: boundary.dual_len(),
                got: output.dual.len(),
            }
            .into());
        }
        let trajectory = workspace.recover(x0, &output.primal)?;
        self.dual.clone_from(&output.dual);

        Ok(OcpQpSolution {
            x: trajectory.x,
            u: trajectory.u,
            dual: output.dual,
            status: output.status,
            iterations: output.iterations,
        })
    }
}
