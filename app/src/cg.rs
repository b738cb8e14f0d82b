use std::time::Instant;

use condensing::{DenseQpSolver, RowMajorQp, SolverBudget, SolverOutput, SolverStatus};
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Unconstrained conjugate-gradient solver for `H u = -h`.
///
/// Bounds and constraint rows of the dense QP are ignored. The previous
/// primal solution seeds the next call when the sizes agree.
pub struct ConjugateGradient {
    pub tol: f64,
    previous: DVector<f64>,
}

impl ConjugateGradient {
    pub fn new(tol: f64) -> Self {
        assert!(tol > 0.0, "tol must be greater than 0.0");
        Self { tol, previous: DVector::zeros(0) }
    }
}

impl DenseQpSolver for ConjugateGradient {
    fn solve(
        &mut self,
        qp: &RowMajorQp,
        budget: &SolverBudget,
        _dual_guess: Option<&[f64]>,
    ) -> SolverOutput {
        let start = Instant::now();
        let n = qp.n_var;
        let h = DMatrix::from_row_slice(n, n, &qp.hessian);
        let f = DVector::from_column_slice(&qp.gradient);

        let mut x =
            if self.previous.len() == n { self.previous.clone() } else { DVector::zeros(n) };
        let mut status = SolverStatus::MaxIterations;
        let mut iterations = 0;

        if f.norm_squared() < self.tol * self.tol {
            debug!("cost gradient near zero, skipping CG");
            x.fill(0.0);
            status = SolverStatus::Optimal;
        } else {
            let mut r = -&f - &h * &x;
            let mut p = r.clone();
            let mut rs_old = r.dot(&r);

            if rs_old < self.tol * self.tol {
                status = SolverStatus::Optimal;
            }

            while status == SolverStatus::MaxIterations
                && iterations < budget.max_working_set_recalculations
            {
                if start.elapsed().as_secs_f64() > budget.max_cpu_time {
                    break;
                }
                iterations += 1;

                let hp = &h * &p;
                let denom = p.dot(&hp);
                if denom.abs() < 1e-12 {
                    debug!("CG exited early: no significant gradient direction (pᵀHp ≈ 0)");
                    status = SolverStatus::NumericalFailure;
                    break;
                }
                let alpha = rs_old / denom;

                x.axpy(alpha, &p, 1.0);
                r.axpy(-alpha, &hp, 1.0);

                let rs_new = r.dot(&r);
                if rs_new < self.tol * self.tol {
                    status = SolverStatus::Optimal;
                    break;
                }

                p = &r + (rs_new / rs_old) * &p;
                rs_old = rs_new;
            }
        }

        self.previous.clone_from(&x);
        SolverOutput {
            status,
            primal: x.as_slice().to_vec(),
            dual: vec![0.0; qp.dual_len()],
            iterations,
        }
    }
}
