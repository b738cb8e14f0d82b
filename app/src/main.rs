mod cg;
mod model;

use std::f64::consts::PI;

use condensing::{CondensingConfig, CondensingContext, CondensingError, OcpQp, OcpQpDims};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

use cg::ConjugateGradient;
use model::{discretize, linearize, unicycle, Control, State, UN, XN};

const HORIZON: usize = 10;
const SIM_STEPS: usize = 60;
const DT: f64 = 0.1;
const RADIUS: f64 = 1.0;
const OMEGA: f64 = 0.5;

/// Point `t` seconds along a circle of radius `RADIUS`, starting at the origin heading +x.
fn reference(t: f64) -> (State<f64>, Control<f64>) {
    let angle = OMEGA * t;
    (
        State::new(RADIUS * angle.sin(), RADIUS * (1.0 - angle.cos()), angle),
        Control::new(RADIUS * OMEGA, OMEGA),
    )
}

fn wrap_angle(a: f64) -> f64 {
    a.sin().atan2(a.cos())
}

/// Error dynamics around the reference over the horizon starting at `t`.
fn build_tracking_qp(t: f64) -> Result<OcpQp, CondensingError> {
    let dims = OcpQpDims::uniform(HORIZON, XN, UN, 0, 0);
    let mut qp = OcpQp::zeros(dims);

    for (k, d) in qp.dynamics.iter_mut().enumerate() {
        let (x_ref, u_ref) = reference(t + k as f64 * DT);
        let (a, b) = linearize(unicycle, &x_ref, &u_ref);
        let (ad, bd) = discretize(&a, &b, DT)?;
        d.a = ad;
        d.b = bd;
    }

    let q = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 0.1]));
    for (k, c) in qp.cost.iter_mut().enumerate() {
        if k < HORIZON {
            c.q = q.clone();
            c.r = DMatrix::from_diagonal_element(UN, UN, 0.01);
        } else {
            c.q = &q * 10.0;
        }
    }

    Ok(qp)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut ctx = CondensingContext::new(ConjugateGradient::new(1e-9), CondensingConfig::default());
    let mut x = State::new(-0.2, 0.3, 20.0 * PI / 180.0);

    info!("starting closed loop: {SIM_STEPS} steps, horizon {HORIZON}, dt {DT}");

    for step in 0..SIM_STEPS {
        let t = step as f64 * DT;
        let (x_ref, u_ref) = reference(t);

        let mut error = x - x_ref;
        error[2] = wrap_angle(error[2]);

        let qp = match build_tracking_qp(t) {
            Ok(qp) => qp,
            Err(e) => {
                warn!("step {step}: discretization failed: {e}");
                break;
            }
        };

        let u = match ctx.solve(&qp, &DVector::from_column_slice(error.as_slice())) {
            Ok(sol) => {
                let terminal = &sol.x[HORIZON];
                info!("step {step}: predicted terminal error {:.4}", terminal.norm());
                u_ref + Control::from_column_slice(sol.u[0].as_slice())
            }
            Err(e) => {
                warn!("step {step}: {e}, applying reference control");
                ctx.reset_warm_start();
                u_ref
            }
        };

        x += unicycle(&x, &u) * DT;
        info!(
            "step {step}: x = ({:.3}, {:.3}, {:.3}), u = ({:.3}, {:.3}), tracking error {:.4}",
            x[0],
            x[1],
            x[2],
            u[0],
            u[1],
            error.norm()
        );
    }

    let (x_ref, _) = reference(SIM_STEPS as f64 * DT);
    let mut error = x - x_ref;
    error[2] = wrap_angle(error[2]);
    info!("final tracking error {:.4}", error.norm());
}
