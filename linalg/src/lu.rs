//! LU factorization with partial pivoting and the matching solves.
//!
//! A zero pivot does not stop the factorization. It is recorded in
//! [`LuFactors::singular_column`] and the caller decides what to do with it.

use log::warn;

use crate::error::LinalgError;
use crate::kernels::{axpy, ger, iamax, scal, swap, MatMut};

/// Row interchanges and singularity marker produced by [`lu_factor`].
///
/// The factors themselves are stored in place in the input buffer: the strict
/// lower triangle holds the unit-lower `L`, the upper triangle holds `U`.
#[derive(Debug, Clone, PartialEq)]
pub struct LuFactors {
    /// Row `j` was interchanged with row `pivots[j]` (0-based).
    pub pivots: Vec<usize>,
    singular_column: Option<usize>,
}

impl LuFactors {
    /// First column (1-based) whose pivot was exactly zero.
    pub fn singular_column(&self) -> Option<usize> {
        self.singular_column
    }

    pub fn is_singular(&self) -> bool {
        self.singular_column.is_some()
    }

    /// Treat a singular factorization as an error.
    pub fn check(self) -> Result<Self, LinalgError> {
        match self.singular_column {
            Some(column) => Err(LinalgError::Singular { column }),
            None => Ok(self),
        }
    }
}

/// Factors the `n x n` column-major matrix `a` (leading dimension `lda`) in place.
pub fn lu_factor(a: &mut [f64], lda: usize, n: usize) -> LuFactors {
    let mut pivots = vec![0; n];
    let mut singular_column = None;
    let mut row = vec![0.0; n];

    for j in 0..n {
        let jp = j + iamax(n - j, &a[j + lda * j..], 1);
        pivots[j] = jp;

        if a[jp + lda * j] != 0.0 {
            swap(n, a, j, jp, lda);

            let ajj = a[j + lda * j];
            let sub = &mut a[j + 1 + lda * j..n + lda * j];
            if ajj.abs() >= f64::EPSILON {
                scal(1.0 / ajj, sub);
            } else {
                for v in sub.iter_mut() {
                    *v /= ajj;
                }
            }
        } else if singular_column.is_none() {
            singular_column = Some(j + 1);
        }

        if j + 1 < n {
            let trailing = n - j - 1;
            let (left, right) = a.split_at_mut(lda * (j + 1));
            for k in 0..trailing {
                row[k] = right[j + lda * k];
            }
            let x = &left[j + 1 + lda * j..n + lda * j];
            let mut tail = MatMut::col_major(&mut right[j + 1..], trailing, trailing, lda);
            ger(-1.0, x, 1, &row[..trailing], 1, &mut tail);
        }
    }

    LuFactors { pivots, singular_column }
}

/// Solves `A X = B` given the output of [`lu_factor`]. `b` is `n x nrhs`
/// column-major with leading dimension `ldb` and is overwritten with `X`.
pub fn lu_solve(
    a: &[f64],
    lda: usize,
    n: usize,
    pivots: &[usize],
    b: &mut [f64],
    ldb: usize,
    nrhs: usize,
) {
    if n == 0 || nrhs == 0 {
        return;
    }

    for (i, &ip) in pivots.iter().enumerate().take(n) {
        swap(nrhs, b, i, ip, ldb);
    }

    for j in 0..nrhs {
        let col = &mut b[ldb * j..ldb * j + n];

        // L is unit lower
        for k in 0..n {
            let bk = col[k];
            if bk != 0.0 {
                axpy(-bk, &a[k + 1 + lda * k..n + lda * k], &mut col[k + 1..]);
            }
        }

        for k in (0..n).rev() {
            col[k] /= a[k + lda * k];
            let bk = col[k];
            if bk != 0.0 {
                axpy(-bk, &a[lda * k..lda * k + k], &mut col[..k]);
            }
        }
    }
}

/// Factor-then-solve for a square `n x n` system with `nrhs` right-hand sides.
///
/// Both buffers are column-major and tightly packed. `a` is overwritten with
/// its LU factors. When a zero pivot is found `b` is left untouched and the
/// column is reported through the returned factors.
pub fn solve(a: &mut [f64], n: usize, b: &mut [f64], nrhs: usize) -> LuFactors {
    let factors = lu_factor(a, n, n);
    match factors.singular_column() {
        Some(column) => warn!("LU solve skipped: zero pivot in column {column} of {n}"),
        None => lu_solve(a, n, n, &factors.pivots, b, n, nrhs),
    }
    factors
}
