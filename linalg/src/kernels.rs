//! Elementary dense kernels.
//!
//! Matrices are addressed through strided views so that the same routine
//! covers column-major, row-major and transposed operands: element `(i, j)`
//! lives at `data[i * row_stride + j * col_stride]`. A column-major buffer
//! with leading dimension `ld` has `row_stride = 1, col_stride = ld`.
//!
//! None of the routines allocate. Shapes are only checked with
//! `debug_assert!`; callers size the buffers.

use nalgebra::DMatrix;

/// Read-only strided view of a dense matrix.
#[derive(Clone, Copy, Debug)]
pub struct MatRef<'a> {
    data: &'a [f64],
    nrows: usize,
    ncols: usize,
    row_stride: usize,
    col_stride: usize,
}

impl<'a> MatRef<'a> {
    pub fn col_major(data: &'a [f64], nrows: usize, ncols: usize, ld: usize) -> Self {
        debug_assert!(ld >= nrows || ncols <= 1);
        Self { data, nrows, ncols, row_stride: 1, col_stride: ld }
    }

    pub fn row_major(data: &'a [f64], nrows: usize, ncols: usize, ld: usize) -> Self {
        Self { data, nrows, ncols, row_stride: ld, col_stride: 1 }
    }

    pub fn from_dmatrix(m: &'a DMatrix<f64>) -> Self {
        Self::col_major(m.as_slice(), m.nrows(), m.ncols(), m.nrows())
    }

    /// Same buffer, rows and columns swapped. No data is moved.
    pub fn transpose(self) -> Self {
        Self {
            data: self.data,
            nrows: self.ncols,
            ncols: self.nrows,
            row_stride: self.col_stride,
            col_stride: self.row_stride,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.row_stride + j * self.col_stride]
    }
}

/// Mutable strided view of a dense matrix.
#[derive(Debug)]
pub struct MatMut<'a> {
    data: &'a mut [f64],
    nrows: usize,
    ncols: usize,
    row_stride: usize,
    col_stride: usize,
}

impl<'a> MatMut<'a> {
    pub fn col_major(data: &'a mut [f64], nrows: usize, ncols: usize, ld: usize) -> Self {
        debug_assert!(ld >= nrows || ncols <= 1);
        Self { data, nrows, ncols, row_stride: 1, col_stride: ld }
    }

    pub fn row_major(data: &'a mut [f64], nrows: usize, ncols: usize, ld: usize) -> Self {
        Self { data, nrows, ncols, row_stride: ld, col_stride: 1 }
    }

    pub fn from_dmatrix(m: &'a mut DMatrix<f64>) -> Self {
        let (nrows, ncols) = m.shape();
        Self::col_major(m.as_mut_slice(), nrows, ncols, nrows)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn rb(&self) -> MatRef<'_> {
        MatRef {
            data: self.data,
            nrows: self.nrows,
            ncols: self.ncols,
            row_stride: self.row_stride,
            col_stride: self.col_stride,
        }
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.row_stride + j * self.col_stride]
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut f64 {
        &mut self.data[i * self.row_stride + j * self.col_stride]
    }
}

/// `C = alpha * A * B + beta * C`.
///
/// With `beta == 0` the previous content of `C` is never read, so it may hold
/// garbage (including NaN).
pub fn gemm(alpha: f64, a: MatRef<'_>, b: MatRef<'_>, beta: f64, c: &mut MatMut<'_>) {
    debug_assert_eq!(a.ncols(), b.nrows());
    debug_assert_eq!(c.nrows(), a.nrows());
    debug_assert_eq!(c.ncols(), b.ncols());

    let k = a.ncols();
    for jj in 0..c.ncols() {
        for ii in 0..c.nrows() {
            let mut acc = 0.0;
            for kk in 0..k {
                acc += a.at(ii, kk) * b.at(kk, jj);
            }
            let cij = c.at_mut(ii, jj);
            *cij = if beta == 0.0 { alpha * acc } else { alpha * acc + beta * *cij };
        }
    }
}

/// `y += alpha * A * x`.
pub fn gemv(alpha: f64, a: MatRef<'_>, x: &[f64], y: &mut [f64]) {
    debug_assert!(x.len() >= a.ncols());
    debug_assert!(y.len() >= a.nrows());

    for jj in 0..a.ncols() {
        let xj = alpha * x[jj];
        if xj == 0.0 {
            continue;
        }
        for ii in 0..a.nrows() {
            y[ii] += a.at(ii, jj) * xj;
        }
    }
}

/// `y += alpha * Aᵀ * x`.
pub fn gemv_t(alpha: f64, a: MatRef<'_>, x: &[f64], y: &mut [f64]) {
    gemv(alpha, a.transpose(), x, y)
}

/// Strided vector copy of `n` elements.
pub fn copy(n: usize, x: &[f64], incx: usize, y: &mut [f64], incy: usize) {
    if incx == 1 && incy == 1 {
        y[..n].copy_from_slice(&x[..n]);
    } else {
        for ii in 0..n {
            y[ii * incy] = x[ii * incx];
        }
    }
}

pub fn scal(alpha: f64, x: &mut [f64]) {
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

/// `y += alpha * x`.
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

pub fn mat_copy(a: MatRef<'_>, b: &mut MatMut<'_>) {
    debug_assert_eq!(a.nrows(), b.nrows());
    debug_assert_eq!(a.ncols(), b.ncols());
    for jj in 0..a.ncols() {
        for ii in 0..a.nrows() {
            *b.at_mut(ii, jj) = a.at(ii, jj);
        }
    }
}

/// Index of the first element of largest magnitude among `n` strided entries.
/// Returns 0 for `n <= 1`.
pub fn iamax(n: usize, x: &[f64], incx: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let mut idx = 0;
    let mut max = x[0].abs();
    for jj in 1..n {
        let v = x[jj * incx].abs();
        if v > max {
            max = v;
            idx = jj;
        }
    }
    idx
}

/// Swaps `n` strided entries starting at offsets `x` and `y` of the same buffer.
///
/// Both sequences share one buffer because the typical use is interchanging
/// two rows of a column-major matrix.
pub fn swap(n: usize, data: &mut [f64], x: usize, y: usize, inc: usize) {
    if x == y {
        return;
    }
    for jj in 0..n {
        data.swap(x + jj * inc, y + jj * inc);
    }
}

/// Rank-1 update `A += alpha * x * yᵀ`.
pub fn ger(alpha: f64, x: &[f64], incx: usize, y: &[f64], incy: usize, a: &mut MatMut<'_>) {
    if a.nrows() == 0 || a.ncols() == 0 || alpha == 0.0 {
        return;
    }
    for jj in 0..a.ncols() {
        let temp = alpha * y[jj * incy];
        for ii in 0..a.nrows() {
            *a.at_mut(ii, jj) += x[ii * incx] * temp;
        }
    }
}

/// Induced 1-norm: largest absolute column sum.
pub fn one_norm(a: MatRef<'_>) -> f64 {
    (0..a.ncols())
        .map(|jj| (0..a.nrows()).map(|ii| a.at(ii, jj).abs()).sum::<f64>())
        .fold(0.0_f64, f64::max)
}

pub fn two_norm(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gemm_matches_nalgebra() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = DMatrix::from_row_slice(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let mut c = DMatrix::from_element(2, 2, f64::NAN);

        gemm(
            1.0,
            MatRef::from_dmatrix(&a),
            MatRef::from_dmatrix(&b),
            0.0,
            &mut MatMut::from_dmatrix(&mut c),
        );

        assert_relative_eq!(c, &a * &b, epsilon = 1e-12);
    }

    #[test]
    fn gemm_transposed_view_accumulates() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut c = DMatrix::identity(2, 2);

        gemm(
            2.0,
            MatRef::from_dmatrix(&a).transpose(),
            MatRef::from_dmatrix(&a),
            1.0,
            &mut MatMut::from_dmatrix(&mut c),
        );

        let expected = a.transpose() * &a * 2.0 + DMatrix::identity(2, 2);
        assert_relative_eq!(c, expected, epsilon = 1e-12);
    }

    #[test]
    fn gemv_normal_and_transposed() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, -1.0, 3.0, 1.0]);
        let mut y = [1.0, 1.0];
        gemv(1.0, MatRef::from_dmatrix(&a), &[1.0, 2.0, 3.0], &mut y);
        assert_eq!(y, [8.0, 9.0]);

        let mut z = [0.0; 3];
        gemv_t(1.0, MatRef::from_dmatrix(&a), &[1.0, 1.0], &mut z);
        assert_eq!(z, [0.0, 3.0, 3.0]);
    }

    #[test]
    fn row_major_view_reads_rows_contiguously() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = MatRef::row_major(&data, 2, 3, 3);
        assert_eq!(m.at(0, 2), 3.0);
        assert_eq!(m.at(1, 0), 4.0);
        assert_eq!(m.transpose().at(2, 1), 6.0);
    }

    #[test]
    fn iamax_picks_first_largest_magnitude() {
        assert_eq!(iamax(4, &[1.0, -5.0, 5.0, 2.0], 1), 1);
        assert_eq!(iamax(2, &[1.0, 9.0, -3.0, 0.0], 2), 1);
        assert_eq!(iamax(0, &[], 1), 0);
    }

    #[test]
    fn swap_exchanges_rows_of_column_major_matrix() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        swap(2, m.as_mut_slice(), 0, 1, 2);
        assert_eq!(m, DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 1.0, 2.0]));
    }

    #[test]
    fn ger_adds_outer_product() {
        let mut a = DMatrix::zeros(2, 3);
        ger(2.0, &[1.0, 2.0], 1, &[1.0, 0.0, -1.0], 1, &mut MatMut::from_dmatrix(&mut a));
        assert_eq!(a, DMatrix::from_row_slice(2, 3, &[2.0, 0.0, -2.0, 4.0, 0.0, -4.0]));
    }

    #[test]
    fn vector_helpers() {
        let mut y = [1.0, 2.0];
        axpy(3.0, &[1.0, -1.0], &mut y);
        assert_eq!(y, [4.0, -1.0]);
        scal(0.5, &mut y);
        assert_eq!(y, [2.0, -0.5]);

        let mut z = [0.0; 4];
        copy(2, &[7.0, 8.0], 1, &mut z, 2);
        assert_eq!(z, [7.0, 0.0, 8.0, 0.0]);

        assert_relative_eq!(two_norm(&[3.0, 4.0]), 5.0);
    }

    #[test]
    fn one_norm_is_largest_column_sum() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, -7.0, -2.0, 3.0]);
        assert_relative_eq!(one_norm(MatRef::from_dmatrix(&a)), 10.0);
    }
}
