use dense_linalg::{expm, LinalgError};
use nalgebra::{DMatrix, SMatrix, SVector, Scalar};
use num_dual::{Dual64, DualNum};

pub const XN: usize = 3;
pub const UN: usize = 2;

pub type State<T> = SVector<T, XN>;
pub type Control<T> = SVector<T, UN>;

/// Unicycle `[x, y, angle]` driven by forward and angular velocity `[v, w]`.
pub fn unicycle<T: DualNum<f64> + Scalar + Copy>(
    state: &State<T>,
    control: &Control<T>,
) -> State<T> {
    let angle = state[2];
    State::from([angle.cos() * control[0], angle.sin() * control[0], control[1]])
}

/// Jacobians of `dynamics_f` at `(x, u)`, one forward-mode pass per input.
pub fn linearize<F, const N: usize, const M: usize>(
    dynamics_f: F,
    x: &SVector<f64, N>,
    u: &SVector<f64, M>,
) -> (SMatrix<f64, N, N>, SMatrix<f64, N, M>)
where
    F: Fn(&SVector<Dual64, N>, &SVector<Dual64, M>) -> SVector<Dual64, N>,
{
    let mut a = SMatrix::zeros();
    let mut b = SMatrix::zeros();

    let x_dual = x.map(Dual64::from);
    let u_dual = u.map(Dual64::from);

    for i in 0..N {
        let mut perturbed = x_dual;
        perturbed[i].eps = 1.0;
        let dfdx = dynamics_f(&perturbed, &u_dual);
        for j in 0..N {
            a[(j, i)] = dfdx[j].eps;
        }
    }

    for i in 0..M {
        let mut perturbed = u_dual;
        perturbed[i].eps = 1.0;
        let dfdu = dynamics_f(&x_dual, &perturbed);
        for j in 0..N {
            b[(j, i)] = dfdu[j].eps;
        }
    }

    (a, b)
}

/// Zero-order-hold discretization: `exp([A B; 0 0] dt) = [Ad Bd; 0 I]`.
pub fn discretize<const N: usize, const M: usize>(
    a: &SMatrix<f64, N, N>,
    b: &SMatrix<f64, N, M>,
    dt: f64,
) -> Result<(DMatrix<f64>, DMatrix<f64>), LinalgError> {
    let mut augmented = DMatrix::zeros(N + M, N + M);
    augmented.view_mut((0, 0), (N, N)).copy_from(&(a * dt));
    augmented.view_mut((0, N), (N, M)).copy_from(&(b * dt));

    expm(&mut augmented)?;

    let ad = augmented.view((0, 0), (N, N)).into_owned();
    let bd = augmented.view((0, N), (N, M)).into_owned();
    Ok((ad, bd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn jacobians_match_closed_form() {
        let x = State::new(0.3, -1.0, 0.7);
        let u = Control::new(2.0, 0.1);

        let (a, b) = linearize(unicycle, &x, &u);

        assert_relative_eq!(a[(0, 2)], -0.7f64.sin() * 2.0, epsilon = 1e-14);
        assert_relative_eq!(a[(1, 2)], 0.7f64.cos() * 2.0, epsilon = 1e-14);
        assert_eq!(a[(0, 0)], 0.0);
        assert_relative_eq!(b[(0, 0)], 0.7f64.cos(), epsilon = 1e-14);
        assert_relative_eq!(b[(1, 0)], 0.7f64.sin(), epsilon = 1e-14);
        assert_eq!(b[(2, 1)], 1.0);
    }

    #[test]
    fn discretization_of_pure_integrator() {
        let a = SMatrix::<f64, 1, 1>::zeros();
        let b = SMatrix::<f64, 1, 1>::new(2.0);

        let (ad, bd) = discretize(&a, &b, 0.1).unwrap();

        assert_relative_eq!(ad[(0, 0)], 1.0, epsilon = 1e-15);
        assert_relative_eq!(bd[(0, 0)], 0.2, epsilon = 1e-15);
    }

    #[test]
    fn discretization_of_double_integrator() {
        let a = SMatrix::<f64, 2, 2>::new(0.0, 1.0, 0.0, 0.0);
        let b = SMatrix::<f64, 2, 1>::new(0.0, 1.0);

        let (ad, bd) = discretize(&a, &b, 0.5).unwrap();

        let expected = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]);
        assert_relative_eq!(ad, expected, epsilon = 1e-14);
        assert_relative_eq!(bd, DMatrix::from_row_slice(2, 1, &[0.125, 0.5]), epsilon = 1e-14);
    }
}
