//! Matrix exponential by scaling and squaring with diagonal Padé approximants.

use log::debug;
use nalgebra::DMatrix;

use crate::error::LinalgError;
use crate::kernels::{axpy, gemm, one_norm, MatMut, MatRef};
use crate::lu;

/// Degree of the `[m/m]` Padé approximant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadeOrder {
    Three,
    Five,
    Seven,
    Nine,
    Thirteen,
}

const PADE_3: [f64; 4] = [120.0, 60.0, 12.0, 1.0];
const PADE_5: [f64; 6] = [30240.0, 15120.0, 3360.0, 420.0, 30.0, 1.0];
const PADE_7: [f64; 8] = [17297280.0, 8648640.0, 1995840.0, 277200.0, 25200.0, 1512.0, 56.0, 1.0];
const PADE_9: [f64; 10] = [
    17643225600.0,
    8821612800.0,
    2075673600.0,
    302702400.0,
    30270240.0,
    2162160.0,
    110880.0,
    3960.0,
    90.0,
    1.0,
];
const PADE_13: [f64; 14] = [
    64764752532480000.0,
    32382376266240000.0,
    7771770303897600.0,
    1187353796428800.0,
    129060195264000.0,
    10559470521600.0,
    670442572800.0,
    33522128640.0,
    1323241920.0,
    40840800.0,
    960960.0,
    16380.0,
    182.0,
    1.0,
];

impl PadeOrder {
    pub const ALL: [PadeOrder; 5] =
        [Self::Three, Self::Five, Self::Seven, Self::Nine, Self::Thirteen];

    pub fn degree(self) -> usize {
        match self {
            Self::Three => 3,
            Self::Five => 5,
            Self::Seven => 7,
            Self::Nine => 9,
            Self::Thirteen => 13,
        }
    }

    /// Largest 1-norm for which this order reaches double precision
    /// without scaling.
    pub fn theta(self) -> f64 {
        match self {
            Self::Three => 0.01495585217958292,
            Self::Five => 0.2539398330063230,
            Self::Seven => 0.9504178996162932,
            Self::Nine => 2.097847961257068,
            Self::Thirteen => 5.371920351148152,
        }
    }

    pub fn coefficients(self) -> &'static [f64] {
        match self {
            Self::Three => &PADE_3,
            Self::Five => &PADE_5,
            Self::Seven => &PADE_7,
            Self::Nine => &PADE_9,
            Self::Thirteen => &PADE_13,
        }
    }

    /// Smallest order whose threshold bounds `norm`, if any.
    pub fn for_norm(norm: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|order| norm <= order.theta())
    }
}

/// Overwrites the square matrix `a` with `exp(a)`.
pub fn expm(a: &mut DMatrix<f64>) -> Result<(), LinalgError> {
    let (nrows, ncols) = a.shape();
    if nrows != ncols {
        return Err(LinalgError::NotSquare { nrows, ncols });
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    let n = nrows;
    if n == 0 {
        return Ok(());
    }

    // Finite entries can still overflow the column sums.
    let norm = one_norm(MatRef::from_dmatrix(a));
    if !norm.is_finite() {
        return Err(LinalgError::NonFinite);
    }
    if let Some(order) = PadeOrder::for_norm(norm) {
        debug!("expm: |A|_1 = {norm:e}, Padé order {}", order.degree());
        return pade_approximant(order, a);
    }

    let s = scaling_exponent(norm / PadeOrder::Thirteen.theta());
    debug!("expm: |A|_1 = {norm:e}, scaling by 2^-{s}, Padé order 13");
    *a *= 2f64.powi(-s);
    pade_approximant(PadeOrder::Thirteen, a)?;

    let mut temp = DMatrix::zeros(n, n);
    for _ in 0..s {
        gemm(
            1.0,
            MatRef::from_dmatrix(a),
            MatRef::from_dmatrix(a),
            0.0,
            &mut MatMut::from_dmatrix(&mut temp),
        );
        std::mem::swap(a, &mut temp);
    }
    Ok(())
}

/// `ceil(log2(ratio))` for `ratio > 1`, exact powers of two map to their
/// own exponent.
fn scaling_exponent(ratio: f64) -> i32 {
    let (mantissa, exponent) = frexp(ratio);
    exponent - i32::from(mantissa == 0.5)
}

/// Splits a positive normal `x` into `m * 2^e` with `m` in `[0.5, 1)`.
fn frexp(x: f64) -> (f64, i32) {
    debug_assert!(x.is_normal() && x > 0.0);
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32 - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, exponent)
}

/// Overwrites `a` with the `[m/m]` Padé approximant `(V - U)⁻¹ (V + U)`,
/// `U` holding the odd and `V` the even powers.
fn pade_approximant(order: PadeOrder, a: &mut DMatrix<f64>) -> Result<(), LinalgError> {
    let n = a.nrows();
    let c = order.coefficients();
    let eye = DMatrix::<f64>::identity(n, n);

    let a2 = product(a, a);
    let a4 = product(&a2, &a2);
    let a6 = product(&a4, &a2);

    let (u, mut v) = if order == PadeOrder::Thirteen {
        // U = A [A6 (c13 A6 + c11 A4 + c9 A2) + c7 A6 + c5 A4 + c3 A2 + c1 I]
        let mut inner = DMatrix::zeros(n, n);
        accumulate(&mut inner, &[(c[13], &a6), (c[11], &a4), (c[9], &a2)]);
        let mut temp = product(&a6, &inner);
        accumulate(&mut temp, &[(c[7], &a6), (c[5], &a4), (c[3], &a2), (c[1], &eye)]);
        let u = product(a, &temp);

        // V = A6 (c12 A6 + c10 A4 + c8 A2) + c6 A6 + c4 A4 + c2 A2 + c0 I
        inner.fill(0.0);
        accumulate(&mut inner, &[(c[12], &a6), (c[10], &a4), (c[8], &a2)]);
        let mut v = product(&a6, &inner);
        accumulate(&mut v, &[(c[6], &a6), (c[4], &a4), (c[2], &a2), (c[0], &eye)]);
        (u, v)
    } else {
        let a8 = match order {
            PadeOrder::Nine => Some(product(&a6, &a2)),
            _ => None,
        };
        let powers = [Some(&eye), Some(&a2), Some(&a4), Some(&a6), a8.as_ref()];

        let mut v = DMatrix::zeros(n, n);
        let mut temp = DMatrix::zeros(n, n);
        for (k, coeff) in c.iter().enumerate() {
            let Some(power) = powers[k / 2] else { break };
            if k % 2 == 0 {
                axpy(*coeff, power.as_slice(), v.as_mut_slice());
            } else {
                axpy(*coeff, power.as_slice(), temp.as_mut_slice());
            }
        }
        (product(a, &temp), v)
    };

    // Numerator V + U lands in `a`, denominator V - U in `v`.
    a.copy_from(&v);
    axpy(1.0, u.as_slice(), a.as_mut_slice());
    axpy(-1.0, u.as_slice(), v.as_mut_slice());

    let factors = lu::solve(v.as_mut_slice(), n, a.as_mut_slice(), n);
    factors.check().map(|_| ())
}

fn product(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let mut c = DMatrix::zeros(a.nrows(), b.ncols());
    let mut target = MatMut::from_dmatrix(&mut c);
    gemm(1.0, MatRef::from_dmatrix(a), MatRef::from_dmatrix(b), 0.0, &mut target);
    c
}

fn accumulate(target: &mut DMatrix<f64>, terms: &[(f64, &DMatrix<f64>)]) {
    for (coeff, m) in terms {
        axpy(*coeff, m.as_slice(), target.as_mut_slice());
    }
}
