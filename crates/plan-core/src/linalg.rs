//! Dense row-major matrices and slice-based vector helpers.
//!
//! Sector counts are small (tens of sectors), so everything here is a plain
//! `Vec<f64>` with O(n²) matrix-vector products. Matrix-matrix products are
//! only used at load and recalibration time.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upper bound on squarings used by [`spectral_radius`].
const MAX_SQUARINGS: usize = 64;

/// Pivot magnitude below which a matrix is treated as singular.
const PIVOT_EPS: f64 = 1e-12;

/// Square or rectangular matrix stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// All-zero matrix of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// n×n identity.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Square matrix with `diag` on the diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        let mut m = Self::zeros(n, n);
        for (i, &d) in diag.iter().enumerate() {
            m.set(i, i, d);
        }
        m
    }

    /// Build from nested rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ValidationError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(ValidationError::ConfigMismatch(format!(
                    "row {i} has {} columns, expected {n_cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// True when rows == cols.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.cols + col] = val;
    }

    /// Borrow one row as a slice.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterator over `(row, col, value)` for every entry.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(idx, &v)| (idx / self.cols, idx % self.cols, v))
    }

    /// Diagonal entries (min(rows, cols) of them).
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// True when every off-diagonal entry is exactly zero.
    pub fn is_diagonal(&self) -> bool {
        self.entries().all(|(r, c, v)| r == c || v == 0.0)
    }

    /// Matrix-vector product `self · v`.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.cols);
        (0..self.rows).map(|r| dot(self.row(r), v)).collect()
    }

    /// Matrix-matrix product `self · other`.
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        debug_assert_eq!(self.cols, other.rows);
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a_ik = self.get(i, k);
                if a_ik == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    let idx = i * out.cols + j;
                    out.data[idx] += a_ik * other.get(k, j);
                }
            }
        }
        out
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for (r, c, v) in self.entries() {
            out.set(c, r, v);
        }
        out
    }

    /// Multiply every entry by `factor`.
    pub fn scale_in_place(&mut self, factor: f64) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Column sums; for a technical-coefficient matrix these are the
    /// intermediate input costs per unit of each sector's output.
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for (_, c, v) in self.entries() {
            sums[c] += v;
        }
        sums
    }

    /// Induced 1-norm (maximum absolute column sum).
    pub fn norm_1(&self) -> f64 {
        let mut sums = vec![0.0; self.cols];
        for (_, c, v) in self.entries() {
            sums[c] += v.abs();
        }
        sums.into_iter().fold(0.0, f64::max)
    }

    /// `(I − self) · x`, used to turn gross output into net final output.
    pub fn leontief_apply(&self, x: &[f64]) -> Vec<f64> {
        let ax = self.mul_vec(x);
        sub(x, &ax)
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting.
    /// Returns `None` for non-square or numerically singular matrices.
    pub fn inverse(&self) -> Option<Matrix> {
        if !self.is_square() {
            return None;
        }
        let n = self.rows;
        let mut work = self.clone();
        let mut inv = Matrix::identity(n);
        for col in 0..n {
            let pivot_row = (col..n).max_by(|&a, &b| {
                work.get(a, col)
                    .abs()
                    .total_cmp(&work.get(b, col).abs())
            })?;
            let pivot = work.get(pivot_row, col);
            if pivot.abs() < PIVOT_EPS || !pivot.is_finite() {
                return None;
            }
            if pivot_row != col {
                work.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }
            let scale = 1.0 / pivot;
            for j in 0..n {
                work.set(col, j, work.get(col, j) * scale);
                inv.set(col, j, inv.get(col, j) * scale);
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n {
                    work.set(r, j, work.get(r, j) - factor * work.get(col, j));
                    inv.set(r, j, inv.get(r, j) - factor * inv.get(col, j));
                }
            }
        }
        Some(inv)
    }

    /// Lower-triangular Cholesky factor `L` with `L·Lᵀ = self`.
    /// Returns `None` unless the matrix is symmetric positive definite.
    pub fn cholesky(&self) -> Option<Matrix> {
        if !self.is_square() {
            return None;
        }
        let n = self.rows;
        for (r, c, v) in self.entries() {
            if (v - self.get(c, r)).abs() > 1e-9 * (1.0 + v.abs()) {
                return None;
            }
        }
        let mut l = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let mut sum = self.get(i, j);
                for k in 0..j {
                    sum -= l.get(i, k) * l.get(j, k);
                }
                if i == j {
                    if sum <= 0.0 {
                        return None;
                    }
                    l.set(i, j, sum.sqrt());
                } else {
                    l.set(i, j, sum / l.get(j, j));
                }
            }
        }
        Some(l)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

/// Spectral radius estimate via Gelfand's formula `ρ = lim ‖Aᵐ‖^(1/m)`,
/// evaluated on `m = 2ʲ` by repeated squaring with rescaling.
///
/// Every intermediate estimate is an upper bound on the true radius, so a
/// value below one certifies the productivity condition.
pub fn spectral_radius(a: &Matrix) -> f64 {
    if !a.is_square() || a.rows() == 0 {
        return 0.0;
    }
    let mut m = a.clone();
    // A^(2^j) = exp(log_scale) * m
    let mut log_scale = 0.0_f64;
    let mut power = 1.0_f64;
    let mut estimate = f64::INFINITY;
    for _ in 0..MAX_SQUARINGS {
        let norm = m.norm_1();
        if norm == 0.0 {
            return 0.0;
        }
        if !norm.is_finite() {
            return f64::INFINITY;
        }
        let log_norm = log_scale + norm.ln();
        let next = (log_norm / power).exp();
        if (estimate - next).abs() <= 1e-12 * next {
            return next;
        }
        estimate = next;
        m.scale_in_place(1.0 / norm);
        m = m.matmul(&m);
        log_scale = 2.0 * log_norm;
        power *= 2.0;
    }
    estimate
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
#[inline]
pub fn norm2(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

pub fn scale(v: &[f64], factor: f64) -> Vec<f64> {
    v.iter().map(|x| x * factor).collect()
}

/// Element-wise product.
pub fn hadamard(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

pub fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn m(rows: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ValidationError::ConfigMismatch(_)));
    }

    #[test]
    fn mul_vec_matches_hand_computation() {
        let a = m(vec![vec![0.2, 0.1], vec![0.1, 0.3]]);
        let y = a.mul_vec(&[100.0, 100.0]);
        assert_relative_eq!(y[0], 30.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], 40.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_of_leontief_matrix() {
        let i_minus_a = m(vec![vec![0.8, -0.1], vec![-0.1, 0.7]]);
        let inv = i_minus_a.inverse().unwrap();
        let prod = i_minus_a.matmul(&inv);
        for (r, c, v) in prod.entries() {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert_relative_eq!(v, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let s = m(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert!(s.inverse().is_none());
    }

    #[test]
    fn cholesky_reconstructs() {
        let cov = m(vec![vec![4.0, 2.0], vec![2.0, 3.0]]);
        let l = cov.cholesky().unwrap();
        assert_eq!(l.get(0, 1), 0.0);
        let back = l.matmul(&l.transpose());
        for (r, c, v) in back.entries() {
            assert_relative_eq!(v, cov.get(r, c), epsilon = 1e-12);
        }
        assert!(m(vec![vec![1.0, 2.0], vec![2.0, 1.0]]).cholesky().is_none());
    }

    #[test]
    fn spectral_radius_of_diagonal_and_nilpotent() {
        let d = Matrix::from_diagonal(&[0.3, 0.7, 0.5]);
        assert_relative_eq!(spectral_radius(&d), 0.7, epsilon = 1e-9);
        let nil = m(vec![vec![0.0, 5.0], vec![0.0, 0.0]]);
        assert_eq!(spectral_radius(&nil), 0.0);
    }

    #[test]
    fn spectral_radius_of_symmetric_two_by_two() {
        // eigenvalues of [[0.2,0.1],[0.1,0.3]] are 0.25 ± sqrt(0.0125)
        let a = m(vec![vec![0.2, 0.1], vec![0.1, 0.3]]);
        let expected = 0.25 + 0.0125_f64.sqrt();
        assert_relative_eq!(spectral_radius(&a), expected, epsilon = 1e-8);
    }

    #[test]
    fn spectral_radius_above_one_for_expanding_matrix() {
        let a = m(vec![vec![0.6, 0.6], vec![0.6, 0.6]]);
        assert_relative_eq!(spectral_radius(&a), 1.2, epsilon = 1e-8);
    }

    proptest! {
        #[test]
        fn radius_bounded_by_one_norm(entries in proptest::collection::vec(0.0f64..0.3, 9)) {
            let rows = entries.chunks(3).map(|c| c.to_vec()).collect();
            let a = Matrix::from_rows(rows).unwrap();
            let rho = spectral_radius(&a);
            prop_assert!(rho >= 0.0);
            prop_assert!(rho <= a.norm_1() * (1.0 + 1e-9));
        }

        #[test]
        fn transpose_is_involution(entries in proptest::collection::vec(-10.0f64..10.0, 6)) {
            let rows = entries.chunks(3).map(|c| c.to_vec()).collect();
            let a = Matrix::from_rows(rows).unwrap();
            prop_assert_eq!(a.transpose().transpose(), a);
        }
    }
}
