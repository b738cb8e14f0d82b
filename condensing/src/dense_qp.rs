//! Fixed-initial-state condensing: eliminates every state of an OCP-QP and
//! produces a dense QP over the stacked controls `u_0 .. u_{N-1}`.
//!
//! ```text
//! min ½ uᵀHu + hᵀu   s.t.  lb <= u <= ub,  lbA <= A u <= ubA
//! ```
//!
//! Dense rows of stage `i`: its `nc[i]` general constraints followed by one
//! row per state component. Control bounds become box bounds on `u`.

use dense_linalg::kernels::{gemm, gemv, gemv_t, mat_copy, MatMut, MatRef};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::{CondensingError, DimensionError};
use crate::ocp_qp::OcpQp;
use crate::workspace::SensitivityWorkspace;

#[derive(Debug, Clone, PartialEq)]
pub struct DenseQp {
    /// `H`, symmetric.
    pub hessian: DMatrix<f64>,
    /// `h`
    pub gradient: DVector<f64>,
    /// `A`, column-major as accumulated by the engine.
    pub constraints: DMatrix<f64>,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
    pub lb_a: DVector<f64>,
    pub ub_a: DVector<f64>,
}

impl DenseQp {
    /// Zero cost and constraint matrix, unbounded limits.
    pub fn zeros(num_vars: usize, num_constraints: usize) -> Self {
        Self {
            hessian: DMatrix::zeros(num_vars, num_vars),
            gradient: DVector::zeros(num_vars),
            constraints: DMatrix::zeros(num_constraints, num_vars),
            lb: DVector::from_element(num_vars, f64::NEG_INFINITY),
            ub: DVector::from_element(num_vars, f64::INFINITY),
            lb_a: DVector::from_element(num_constraints, f64::NEG_INFINITY),
            ub_a: DVector::from_element(num_constraints, f64::INFINITY),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.gradient.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.lb_a.len()
    }

    /// Copies the upper triangle of `H` onto the lower one.
    pub fn symmetrize_hessian(&mut self) {
        let n = self.num_vars();
        for c in 0..n {
            for r in c + 1..n {
                self.hessian[(r, c)] = self.hessian[(c, r)];
            }
        }
    }

    pub fn objective(&self, u: &DVector<f64>) -> f64 {
        0.5 * u.dot(&(&self.hessian * u)) + self.gradient.dot(u)
    }
}

/// Condenses `qp` around the fixed initial state `x0`.
///
/// Returns the dense QP together with the sensitivity workspace needed to
/// recover the trajectory from its solution.
pub fn condense(
    qp: &OcpQp,
    x0: &DVector<f64>,
) -> Result<(DenseQp, SensitivityWorkspace), CondensingError> {
    qp.validate()?;
    let dims = &qp.dims;
    if x0.len() != dims.nx[0] {
        return Err(
            DimensionError::Length { what: "x0", expected: dims.nx[0], got: x0.len() }.into()
        );
    }

    let nvar = dims.num_condensed_vars();
    let ncon = dims.num_dense_constraints();
    debug!(
        "condensing horizon {} into {nvar} variables, {ncon} constraint rows ({} bounded)",
        dims.horizon(),
        qp.bounded_row_count()
    );

    let mut ws = SensitivityWorkspace::new(dims);
    ws.propagate(qp, x0);
    ws.map_constraints(qp);

    let mut dense = DenseQp::zeros(nvar, ncon);
    assemble_cost(qp, x0, &ws, &mut dense);
    dense.symmetrize_hessian();
    assemble_constraints(qp, x0, &ws, &mut dense);

    Ok((dense, ws))
}

/// View of the `(row, col)` block of a column-major matrix.
fn sub_mut(m: &mut DMatrix<f64>, row: usize, col: usize, nrows: usize, ncols: usize) -> MatMut<'_> {
    let ld = m.nrows();
    if nrows == 0 || ncols == 0 {
        return MatMut::col_major(&mut [], nrows, ncols, ld);
    }
    MatMut::col_major(&mut m.as_mut_slice()[row + col * ld..], nrows, ncols, ld)
}

/// Substitutes `x_i = c_i + Σ_{j<i} G[i-1][j] u_j` into every stage cost.
/// Only blocks `(j, k)` with `j <= k` of `H` are written.
fn assemble_cost(qp: &OcpQp, x0: &DVector<f64>, ws: &SensitivityWorkspace, dense: &mut DenseQp) {
    let dims = &qp.dims;

    for (i, cost) in qp.cost.iter().enumerate() {
        let nx = dims.nx[i];
        let nu = dims.nu[i];
        let off_i = ws.control_offset(i);
        let c_i = ws.stage_constant(x0, i);
        let q = MatRef::from_dmatrix(&cost.q);
        let s = MatRef::from_dmatrix(&cost.s);

        // Q c + q, gradient of the stage cost w.r.t. x at the constant part.
        let mut qc = cost.q_vec.clone();
        gemv(1.0, q, c_i.as_slice(), qc.as_mut_slice());

        if nu > 0 {
            for c in 0..nu {
                for r in 0..nu {
                    dense.hessian[(off_i + r, off_i + c)] += cost.r[(r, c)];
                }
            }
            let h_i = &mut dense.gradient.as_mut_slice()[off_i..off_i + nu];
            for (h, r) in h_i.iter_mut().zip(cost.r_vec.iter()) {
                *h += r;
            }
            gemv(1.0, s, c_i.as_slice(), h_i);
        }

        if i == 0 {
            continue;
        }

        // W_k = Q G[i-1][k]
        let weighted: Vec<DMatrix<f64>> = (0..i)
            .map(|k| {
                let g = ws.sensitivity(i - 1, k);
                let mut w = DMatrix::zeros(nx, g.ncols());
                gemm(1.0, q, g, 0.0, &mut MatMut::from_dmatrix(&mut w));
                w
            })
            .collect();

        for j in 0..i {
            let gj = ws.sensitivity(i - 1, j);
            let off_j = ws.control_offset(j);
            let nu_j = gj.ncols();

            for (k, w) in weighted.iter().enumerate().skip(j) {
                let off_k = ws.control_offset(k);
                gemm(
                    1.0,
                    gj.transpose(),
                    MatRef::from_dmatrix(w),
                    1.0,
                    &mut sub_mut(&mut dense.hessian, off_j, off_k, nu_j, w.ncols()),
                );
            }

            // Cross term uᵢᵀ S G uⱼ lands in block (j, i).
            if nu > 0 {
                gemm(
                    1.0,
                    gj.transpose(),
                    s.transpose(),
                    1.0,
                    &mut sub_mut(&mut dense.hessian, off_j, off_i, nu_j, nu),
                );
            }

            gemv_t(1.0, gj, qc.as_slice(), &mut dense.gradient.as_mut_slice()[off_j..off_j + nu_j]);
        }
    }
}

/// Writes the dense rows of every stage and the box bounds on the controls.
fn assemble_constraints(
    qp: &OcpQp,
    x0: &DVector<f64>,
    ws: &SensitivityWorkspace,
    dense: &mut DenseQp,
) {
    let dims = &qp.dims;
    let rows = dims.row_offsets();

    for i in 0..=qp.horizon() {
        let nx = dims.nx[i];
        let nc = dims.nc[i];
        let c_i = ws.stage_constant(x0, i);
        let general = &qp.constraints[i];

        // General rows: D[i][j] over u_j, constant Cx c_i moved into the bounds.
        let mut cx_c = DVector::zeros(nc);
        gemv(1.0, MatRef::from_dmatrix(&general.cx), c_i.as_slice(), cx_c.as_mut_slice());
        for r in 0..nc {
            dense.lb_a[rows[i] + r] = general.lc[r] - cx_c[r];
            dense.ub_a[rows[i] + r] = general.uc[r] - cx_c[r];
        }
        for j in 0..=i.min(qp.horizon().saturating_sub(1)) {
            let d = ws.constraint_sensitivity(i, j);
            let mut target =
                sub_mut(&mut dense.constraints, rows[i], ws.control_offset(j), nc, d.ncols());
            mat_copy(d, &mut target);
        }

        // State rows: G[i-1][j] over u_j, unbounded unless idxb says otherwise.
        let state_row = rows[i] + nc;
        for j in 0..i {
            let g = ws.sensitivity(i - 1, j);
            let mut target =
                sub_mut(&mut dense.constraints, state_row, ws.control_offset(j), nx, g.ncols());
            mat_copy(g, &mut target);
        }

        let bounds = &qp.bounds[i];
        for (k, &idx) in bounds.idxb.iter().enumerate() {
            if idx < nx {
                let row = state_row + idx;
                dense.lb_a[row] = dense.lb_a[row].max(bounds.lb[k] - c_i[idx]);
                dense.ub_a[row] = dense.ub_a[row].min(bounds.ub[k] - c_i[idx]);
            } else {
                let var = ws.control_offset(i) + idx - nx;
                dense.lb[var] = dense.lb[var].max(bounds.lb[k]);
                dense.ub[var] = dense.ub[var].min(bounds.ub[k]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp_qp::OcpQpDims;
    use approx::assert_relative_eq;

    /// Double integrator, horizon 3, with cross terms and a general constraint.
    fn double_integrator() -> OcpQp {
        let dims = OcpQpDims::uniform(3, 2, 1, 1, 1);
        let mut qp = OcpQp::zeros(dims);
        for (i, d) in qp.dynamics.iter_mut().enumerate() {
            d.a = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
            d.b = DMatrix::from_row_slice(2, 1, &[0.005, 0.1 + 0.01 * i as f64]);
            d.offset = DVector::from_vec(vec![0.01, -0.02]);
        }
        for (i, c) in qp.cost.iter_mut().enumerate() {
            c.q = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
            c.q_vec = DVector::from_vec(vec![0.1, -0.2 * i as f64]);
            if i < 3 {
                c.s = DMatrix::from_row_slice(1, 2, &[0.05, -0.1]);
                c.r = DMatrix::from_element(1, 1, 0.5);
                c.r_vec = DVector::from_element(1, 0.3);
            }
        }
        for (i, g) in qp.constraints.iter_mut().enumerate() {
            g.cx = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
            if i < 3 {
                g.cu = DMatrix::from_element(1, 1, 2.0);
            }
            g.lc = DVector::from_element(1, -1.0);
            g.uc = DVector::from_element(1, 1.0);
        }
        // velocity bound on stages 1..3, control bound on stage 0
        qp.bounds[0].idxb = vec![2];
        qp.bounds[0].lb[0] = -0.5;
        qp.bounds[0].ub[0] = 0.5;
        for b in &mut qp.bounds[1..] {
            b.idxb = vec![1];
            b.lb[0] = -2.0;
            b.ub[0] = 3.0;
        }
        qp
    }

    fn rollout(qp: &OcpQp, x0: &DVector<f64>, u: &[f64]) -> Vec<DVector<f64>> {
        let mut x = vec![x0.clone()];
        for (i, d) in qp.dynamics.iter().enumerate() {
            let next = &d.a * &x[i] + d.b.column(0) * u[i] + &d.offset;
            x.push(next);
        }
        x
    }

    #[test]
    fn sizes_follow_dimension_law() {
        let qp = double_integrator();
        let (dense, _) = condense(&qp, &DVector::from_vec(vec![1.0, 0.0])).unwrap();

        assert_eq!(dense.num_vars(), 3);
        assert_eq!(dense.num_constraints(), 4 * (1 + 2));
        assert_eq!(dense.constraints.shape(), (12, 3));
    }

    #[test]
    fn hessian_is_exactly_symmetric() {
        let qp = double_integrator();
        let (dense, _) = condense(&qp, &DVector::from_vec(vec![1.0, -0.5])).unwrap();

        for j in 0..3 {
            for k in 0..3 {
                assert_eq!(dense.hessian[(j, k)], dense.hessian[(k, j)]);
            }
        }
    }

    #[test]
    fn dense_objective_matches_stage_costs() {
        let qp = double_integrator();
        let x0 = DVector::from_vec(vec![1.0, -0.5]);
        let (dense, _) = condense(&qp, &x0).unwrap();

        let stage_cost = |u: &[f64]| {
            let x = rollout(&qp, &x0, u);
            let us: Vec<DVector<f64>> = u.iter().map(|v| DVector::from_element(1, *v)).collect();
            qp.objective(&x, &us)
        };
        let zero = [0.0; 3];
        for u in [[1.0, 0.0, 0.0], [0.3, -1.2, 0.7], [-2.0, 0.5, 1.5]] {
            let dense_diff = dense.objective(&DVector::from_column_slice(&u))
                - dense.objective(&DVector::from_column_slice(&zero));
            let stage_diff = stage_cost(&u) - stage_cost(&zero);
            assert_relative_eq!(dense_diff, stage_diff, epsilon = 1e-12);
        }
    }

    #[test]
    fn constraint_rows_reproduce_stage_constraints() {
        let qp = double_integrator();
        let x0 = DVector::from_vec(vec![0.2, 0.4]);
        let (dense, _) = condense(&qp, &x0).unwrap();

        let u = [0.7, -0.3, 1.1];
        let x = rollout(&qp, &x0, &u);
        let au = &dense.constraints * DVector::from_column_slice(&u);
        let rows = qp.dims.row_offsets();

        for i in 0..=3 {
            let g = &qp.constraints[i];
            let mut value = (&g.cx * &x[i])[0];
            if i < 3 {
                value += g.cu[(0, 0)] * u[i];
            }
            // lc <= value  <=>  lbA <= A u, with the same slack.
            let row = rows[i];
            assert_relative_eq!(value - g.lc[0], au[row] - dense.lb_a[row], epsilon = 1e-12);
            assert_relative_eq!(g.uc[0] - value, dense.ub_a[row] - au[row], epsilon = 1e-12);
        }

        for i in 1..=3 {
            let velocity_row = rows[i] + 1 + 1;
            assert_relative_eq!(
                x[i][1] - (-2.0),
                au[velocity_row] - dense.lb_a[velocity_row],
                epsilon = 1e-12
            );
            assert_relative_eq!(
                3.0 - x[i][1],
                dense.ub_a[velocity_row] - au[velocity_row],
                epsilon = 1e-12
            );

            let position_row = rows[i] + 1;
            assert_eq!(dense.lb_a[position_row], f64::NEG_INFINITY);
            assert_eq!(dense.ub_a[position_row], f64::INFINITY);
        }

        // Stage 0 state rows do not depend on the controls.
        for r in rows[0] + 1..rows[1] {
            assert!(dense.constraints.row(r).iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn control_bounds_become_box_bounds() {
        let qp = double_integrator();
        let (dense, _) = condense(&qp, &DVector::zeros(2)).unwrap();

        assert_eq!(dense.lb.as_slice(), &[-0.5, f64::NEG_INFINITY, f64::NEG_INFINITY]);
        assert_eq!(dense.ub.as_slice(), &[0.5, f64::INFINITY, f64::INFINITY]);
    }

    #[test]
    fn single_stage_round_trip() {
        let mut qp = OcpQp::zeros(OcpQpDims::uniform(1, 2, 1, 0, 0));
        qp.dynamics[0].a = DMatrix::identity(2, 2);
        qp.dynamics[0].b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let x0 = DVector::from_vec(vec![1.0, 0.0]);

        let (_, ws) = condense(&qp, &x0).unwrap();
        let u0 = 0.37;
        let traj = ws.recover(&x0, &[u0]).unwrap();

        let d = &qp.dynamics[0];
        let expected = &d.a * &x0 + d.b.column(0) * u0 + &d.offset;
        assert_relative_eq!(traj.x[1], expected, epsilon = 1e-15);
        assert_eq!(traj.x[0], x0);
        assert_eq!(traj.u[0][0], u0);
    }

    #[test]
    fn recovered_trajectory_matches_rollout() {
        let qp = double_integrator();
        let x0 = DVector::from_vec(vec![-0.3, 0.9]);
        let (_, ws) = condense(&qp, &x0).unwrap();

        let u = [0.2, 0.4, -0.6];
        let traj = ws.recover(&x0, &u).unwrap();
        for (got, want) in traj.x.iter().zip(rollout(&qp, &x0, &u)) {
            assert_relative_eq!(*got, want, epsilon = 1e-14);
        }
    }

    #[test]
    fn rejects_wrong_initial_state() {
        let qp = double_integrator();
        assert_eq!(
            condense(&qp, &DVector::zeros(3)).unwrap_err(),
            CondensingError::Dimension(DimensionError::Length { what: "x0", expected: 2, got: 3 })
        );
    }
}
