use approx::assert_relative_eq;
use condensing::{
    condense, CondensingConfig, CondensingContext, CondensingError, DenseQpSolver, OcpQp, OcpQpDims,
    RowMajorQp, SolverBudget, SolverOutput, SolverStatus,
};
use dense_linalg::{Regularization, RegularizationMode};
use nalgebra::{DMatrix, DVector};

/// Solves `H u = -h` directly, ignoring every bound. Records what it was given.
#[derive(Default)]
struct ExactSolver {
    calls: usize,
    guesses: Vec<Option<Vec<f64>>>,
    last_hessian: Vec<f64>,
    last_budget: Option<SolverBudget>,
    forced_status: Option<SolverStatus>,
}

impl DenseQpSolver for ExactSolver {
    fn solve(
        &mut self,
        qp: &RowMajorQp,
        budget: &SolverBudget,
        dual_guess: Option<&[f64]>,
    ) -> SolverOutput {
        self.calls += 1;
        self.guesses.push(dual_guess.map(|d| d.to_vec()));
        self.last_hessian = qp.hessian.clone();
        self.last_budget = Some(*budget);

        if let Some(status) = self.forced_status {
            return SolverOutput { status, primal: Vec::new(), dual: Vec::new(), iterations: 0 };
        }

        let mut h = qp.hessian.clone();
        let mut primal: Vec<f64> = qp.gradient.iter().map(|g| -g).collect();
        let status = if dense_linalg::solve(&mut h, qp.n_var, &mut primal, 1).is_singular() {
            SolverStatus::NumericalFailure
        } else {
            SolverStatus::Optimal
        };
        let dual = vec![0.5 * self.calls as f64; qp.dual_len()];
        SolverOutput { status, primal, dual, iterations: 1 }
    }
}

fn double_integrator(horizon: usize) -> OcpQp {
    let dims = OcpQpDims::uniform(horizon, 2, 1, 0, 0);
    let mut qp = OcpQp::zeros(dims);
    for d in &mut qp.dynamics {
        d.a = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        d.b = DMatrix::from_row_slice(2, 1, &[0.005, 0.1]);
        d.offset = DVector::from_vec(vec![0.0, -0.01]);
    }
    for (i, c) in qp.cost.iter_mut().enumerate() {
        c.q = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 0.5]);
        c.q_vec = DVector::from_vec(vec![-0.1, 0.05]);
        if i < horizon {
            c.s = DMatrix::from_row_slice(1, 2, &[0.02, 0.01]);
            c.r = DMatrix::from_element(1, 1, 0.1);
            c.r_vec = DVector::from_element(1, 0.01);
        }
    }
    qp
}

#[test]
fn full_cycle_recovers_optimal_trajectory() {
    let qp = double_integrator(5);
    let x0 = DVector::from_vec(vec![1.0, -0.3]);
    let mut ctx = CondensingContext::new(ExactSolver::default(), CondensingConfig::default());

    let sol = ctx.solve(&qp, &x0).unwrap();

    assert_eq!(sol.status, SolverStatus::Optimal);
    assert_eq!(sol.x.len(), 6);
    assert_eq!(sol.u.len(), 5);
    assert_eq!(sol.x[0], x0);
    for (i, d) in qp.dynamics.iter().enumerate() {
        let next = &d.a * &sol.x[i] + &d.b * &sol.u[i] + &d.offset;
        assert_relative_eq!(sol.x[i + 1], next, epsilon = 1e-12);
    }

    // Stationarity of the dense problem at the recovered controls.
    let (dense, _) = condense(&qp, &x0).unwrap();
    let u = DVector::from_iterator(5, sol.u.iter().map(|u| u[0]));
    let residual = &dense.hessian * &u + &dense.gradient;
    assert!(residual.norm() < 1e-10, "residual {}", residual.norm());

    // Any perturbation raises the stage-wise cost.
    let best = qp.objective(&sol.x, &sol.u);
    for k in 0..5 {
        let mut u = sol.u.clone();
        u[k][0] += 1e-3;
        let mut x = vec![x0.clone()];
        for (i, d) in qp.dynamics.iter().enumerate() {
            x.push(&d.a * &x[i] + &d.b * &u[i] + &d.offset);
        }
        assert!(qp.objective(&x, &u) > best);
    }
}

#[test]
fn dual_solution_warm_starts_next_call() {
    let qp = double_integrator(3);
    let x0 = DVector::from_vec(vec![0.2, 0.0]);
    let mut ctx = CondensingContext::new(ExactSolver::default(), CondensingConfig::default());

    ctx.solve(&qp, &x0).unwrap();
    let second = ctx.solve(&qp, &x0).unwrap();

    let guesses = &ctx.solver().guesses;
    assert_eq!(guesses[0], None);
    assert_eq!(guesses[1], Some(vec![0.5; 3 + 4 * 2]));
    assert_eq!(second.dual, vec![1.0; 3 + 4 * 2]);
    assert_eq!(ctx.last_dual(), second.dual.as_slice());

    ctx.reset_warm_start();
    ctx.solve(&qp, &x0).unwrap();
    assert_eq!(ctx.solver().guesses[2], None);
}

#[test]
fn warm_start_can_be_disabled() {
    let qp = double_integrator(2);
    let x0 = DVector::from_vec(vec![0.2, 0.0]);
    let config = CondensingConfig { warm_start: false, ..CondensingConfig::default() };
    let mut ctx = CondensingContext::new(ExactSolver::default(), config);

    ctx.solve(&qp, &x0).unwrap();
    ctx.solve(&qp, &x0).unwrap();

    assert!(ctx.solver().guesses.iter().all(Option::is_none));
    assert_eq!(ctx.solver().last_budget, Some(SolverBudget::default()));
}

#[test]
fn solver_failure_is_propagated_unchanged() {
    let qp = double_integrator(3);
    let solver =
        ExactSolver { forced_status: Some(SolverStatus::Infeasible), ..ExactSolver::default() };
    let mut ctx = CondensingContext::new(solver, CondensingConfig::default());

    let err = ctx.solve(&qp, &DVector::zeros(2)).unwrap_err();

    assert_eq!(err, CondensingError::Solver { status: SolverStatus::Infeasible });
    assert_eq!(ctx.solver().calls, 1);
    assert!(ctx.last_dual().is_empty());
}

#[test]
fn indefinite_hessian_is_mirrored_before_solving() {
    let dims = OcpQpDims::uniform(2, 1, 1, 0, 0);
    let mut qp = OcpQp::zeros(dims);
    for d in &mut qp.dynamics {
        d.a = DMatrix::from_element(1, 1, 1.0);
        d.b = DMatrix::from_element(1, 1, 1.0);
    }
    for c in &mut qp.cost[..2] {
        c.r = DMatrix::from_element(1, 1, -1.0);
        c.r_vec = DVector::from_element(1, 1.0);
    }
    let config = CondensingConfig {
        regularization: Some(Regularization {
            mode: RegularizationMode::Mirror,
            ..Regularization::default()
        }),
        ..CondensingConfig::default()
    };
    let mut ctx = CondensingContext::new(ExactSolver::default(), config);

    let sol = ctx.solve(&qp, &DVector::zeros(1)).unwrap();

    let h = &ctx.solver().last_hessian;
    assert_relative_eq!(h[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(h[3], 1.0, epsilon = 1e-12);
    assert_relative_eq!(h[1], 0.0, epsilon = 1e-12);
    assert_eq!(h[1], h[2]);
    assert_relative_eq!(sol.u[0][0], -1.0, epsilon = 1e-12);
}

#[test]
fn wrong_initial_state_is_rejected_before_solving() {
    let qp = double_integrator(3);
    let mut ctx = CondensingContext::new(ExactSolver::default(), CondensingConfig::default());

    let err = ctx.solve(&qp, &DVector::zeros(3)).unwrap_err();

    assert!(matches!(err, CondensingError::Dimension(_)));
    assert_eq!(ctx.solver().calls, 0);
}
