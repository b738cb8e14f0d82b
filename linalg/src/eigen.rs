//! Symmetric eigen-decomposition.
//!
//! Householder reduction to tridiagonal form followed by the implicit-shift
//! QL iteration (the EISPACK `tred2`/`tql2` pair). Eigenvalues come out in the
//! order the iteration produces them, which is neither ascending nor
//! descending in general.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::LinalgError;

/// Iteration cap per eigenvalue in the QL sweep.
pub const MAX_QL_ITERATIONS: usize = 30;

/// `A = V diag(d) Vᵀ` with orthogonal `V`.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvectors, one per column.
    pub eigenvectors: DMatrix<f64>,
    pub eigenvalues: DVector<f64>,
}

impl SymmetricEigen {
    /// Decomposes the symmetric matrix `a`. Only symmetry of the input is
    /// assumed, the routine reads both triangles.
    pub fn new(a: &DMatrix<f64>) -> Result<Self, LinalgError> {
        Self::with_max_iterations(a, MAX_QL_ITERATIONS)
    }

    /// Same as [`SymmetricEigen::new`] with `max_iterations` QL sweeps allowed
    /// per eigenvalue.
    pub fn with_max_iterations(
        a: &DMatrix<f64>,
        max_iterations: usize,
    ) -> Result<Self, LinalgError> {
        let (nrows, ncols) = a.shape();
        if nrows != ncols {
            return Err(LinalgError::NotSquare { nrows, ncols });
        }
        if a.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }

        let n = nrows;
        let mut v = a.clone();
        let mut d = DVector::zeros(n);
        let mut e = DVector::zeros(n);
        if n == 0 {
            return Ok(Self { eigenvectors: v, eigenvalues: d });
        }

        tridiagonalize(&mut v, &mut d, &mut e);
        ql_implicit(&mut v, &mut d, &mut e, max_iterations)?;

        Ok(Self { eigenvectors: v, eigenvalues: d })
    }

    /// `V diag(d) Vᵀ`, computed on the lower triangle and mirrored so the
    /// result is exactly symmetric.
    pub fn reconstruct(&self) -> DMatrix<f64> {
        reconstruct(&self.eigenvectors, self.eigenvalues.as_slice())
    }
}

pub(crate) fn reconstruct(v: &DMatrix<f64>, d: &[f64]) -> DMatrix<f64> {
    let n = v.nrows();
    let mut a = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..=i {
            let mut acc = 0.0;
            for (k, dk) in d.iter().enumerate() {
                acc += v[(i, k)] * dk * v[(j, k)];
            }
            a[(i, j)] = acc;
            a[(j, i)] = acc;
        }
    }
    a
}

/// Householder tridiagonalization. On return `v` holds the accumulated
/// orthogonal transform, `d` the diagonal and `e[1..]` the sub-diagonal.
fn tridiagonalize(v: &mut DMatrix<f64>, d: &mut DVector<f64>, e: &mut DVector<f64>) {
    let n = v.nrows();

    for j in 0..n {
        d[j] = v[(n - 1, j)];
    }

    for i in (1..n).rev() {
        // Scale to avoid under/overflow.
        let mut scale = 0.0;
        let mut h = 0.0;
        for k in 0..i {
            scale += d[k].abs();
        }

        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[(i - 1, j)];
                v[(i, j)] = 0.0;
                v[(j, i)] = 0.0;
            }
        } else {
            for k in 0..i {
                d[k] /= scale;
                h += d[k] * d[k];
            }
            let mut f = d[i - 1];
            let mut g = h.sqrt();
            if f > 0.0 {
                g = -g;
            }
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;
            for j in 0..i {
                e[j] = 0.0;
            }

            // Apply the similarity transform to the remaining columns.
            for j in 0..i {
                f = d[j];
                v[(j, i)] = f;
                g = e[j] + v[(j, j)] * f;
                for k in j + 1..i {
                    g += v[(k, j)] * d[k];
                    e[k] += v[(k, j)] * f;
                }
                e[j] = g;
            }
            f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }
            for j in 0..i {
                f = d[j];
                g = e[j];
                for k in j..i {
                    v[(k, j)] -= f * e[k] + g * d[k];
                }
                d[j] = v[(i - 1, j)];
                v[(i, j)] = 0.0;
            }
        }
        d[i] = h;
    }

    // Accumulate transformations.
    for i in 0..n - 1 {
        v[(n - 1, i)] = v[(i, i)];
        v[(i, i)] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[(k, i + 1)] / h;
            }
            for j in 0..=i {
                let mut g = 0.0;
                for k in 0..=i {
                    g += v[(k, i + 1)] * v[(k, j)];
                }
                for k in 0..=i {
                    v[(k, j)] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[(k, i + 1)] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[(n - 1, j)];
        v[(n - 1, j)] = 0.0;
    }
    v[(n - 1, n - 1)] = 1.0;
    e[0] = 0.0;
}

/// Implicit-shift QL on the tridiagonal `(d, e)`, rotations accumulated into `v`.
fn ql_implicit(
    v: &mut DMatrix<f64>,
    d: &mut DVector<f64>,
    e: &mut DVector<f64>,
    max_iterations: usize,
) -> Result<(), LinalgError> {
    let n = v.nrows();

    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1 = 0.0_f64;
    let eps = f64::EPSILON;

    for l in 0..n {
        // Find small sub-diagonal element.
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        let mut m = l;
        while m < n {
            if e[m].abs() <= eps * tst1 {
                break;
            }
            m += 1;
        }

        // If m == l, d[l] is already an eigenvalue.
        if m > l {
            let mut iter = 0;
            loop {
                iter += 1;

                // Implicit shift.
                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for i in l + 2..n {
                    d[i] -= h;
                }
                f += h;

                // Implicit QL transformation.
                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = p.hypot(e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);

                    for k in 0..n {
                        h = v[(k, i + 1)];
                        v[(k, i + 1)] = s * v[(k, i)] + c * h;
                        v[(k, i)] = c * v[(k, i)] - s * h;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= eps * tst1 {
                    break;
                }
                if iter >= max_iterations {
                    let tol = eps * tst1;
                    debug!("QL sweep stalled at index {l}: |e| = {:e}, tol = {tol:e}", e[l].abs());
                    return Err(LinalgError::NoConvergence { index: l, iterations: iter });
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }

    Ok(())
}
