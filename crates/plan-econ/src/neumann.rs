//! Truncated Neumann series for Leontief systems `(I − A)·x = d`.

use plan_core::{axpy, check_productive, norm2, Matrix};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::EconError;

/// Result of one truncated solve.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// `x_k = (I + A + … + A^k)·d`
    pub x: Vec<f64>,
    /// `‖d − (I − A)·x_k‖`, which equals `‖A^(k+1)·d‖`.
    pub residual: f64,
    /// Residual relative to `‖d‖` (zero when `d` is zero).
    pub relative_residual: f64,
}

/// Raw series `(I + A + … + A^k)·d` by repeated matrix-vector products.
///
/// Does not check the productivity condition; callers go through
/// [`NeumannSolver`] unless `A` is already known to be productive.
pub fn neumann(a: &Matrix, d: &[f64], k: usize) -> Vec<f64> {
    let mut x = d.to_vec();
    let mut term = d.to_vec();
    for _ in 0..k {
        term = a.mul_vec(&term);
        axpy(1.0, &term, &mut x);
    }
    x
}

/// Explicit residual `‖d − (I − A)·x‖`.
pub fn residual_norm(a: &Matrix, d: &[f64], x: &[f64]) -> f64 {
    let net = a.leontief_apply(x);
    let diff: Vec<f64> = d.iter().zip(&net).map(|(di, ni)| di - ni).collect();
    norm2(&diff)
}

/// Neumann-series solver bound to a matrix that passed the productivity check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NeumannSolver {
    a: Matrix,
    spectral_radius: f64,
    max_residual: f64,
}

impl NeumannSolver {
    /// Check productivity once; fails with `NonProductiveMatrix` otherwise.
    pub fn new(a: Matrix) -> Result<Self, EconError> {
        let spectral_radius = check_productive(&a)?;
        Ok(Self {
            a,
            spectral_radius,
            max_residual: f64::INFINITY,
        })
    }

    /// Largest relative residual a solve may return before it is reported
    /// as diverged.
    pub fn with_max_residual(mut self, max_residual: f64) -> Self {
        self.max_residual = max_residual;
        self
    }

    pub fn matrix(&self) -> &Matrix {
        &self.a
    }

    pub fn spectral_radius(&self) -> f64 {
        self.spectral_radius
    }

    /// Solver for `Aᵀ`, which shares the spectral radius of `A`.
    pub fn transposed(&self) -> Self {
        Self {
            a: self.a.transpose(),
            spectral_radius: self.spectral_radius,
            max_residual: self.max_residual,
        }
    }

    /// Approximate `(I − A)⁻¹·d` with `k` powers of `A`.
    ///
    /// The final term `A^(k+1)·d` is the exact residual of `x_k`, so it is
    /// computed once more at the end instead of re-multiplying by `(I − A)`.
    pub fn solve(&self, d: &[f64], k: usize) -> Result<Solution, EconError> {
        if k == 0 {
            return Err(EconError::InvalidIterations);
        }
        if d.len() != self.a.cols() {
            return Err(EconError::DimensionMismatch(format!(
                "demand vector has {} entries, matrix is {}x{}",
                d.len(),
                self.a.rows(),
                self.a.cols()
            )));
        }
        let mut x = d.to_vec();
        let mut term = d.to_vec();
        for _ in 0..k {
            term = self.a.mul_vec(&term);
            axpy(1.0, &term, &mut x);
        }
        let residual = norm2(&self.a.mul_vec(&term));
        let d_norm = norm2(d);
        let relative_residual = if d_norm > 0.0 { residual / d_norm } else { 0.0 };
        if !plan_core::all_finite(&x)
            || !relative_residual.is_finite()
            || relative_residual > self.max_residual
        {
            return Err(EconError::SolverDivergence {
                residual: relative_residual,
                iterations: k,
            });
        }
        Ok(Solution {
            x,
            residual,
            relative_residual,
        })
    }
}

/// One point of the convergence diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub k: usize,
    /// Relative residual `‖A^(k+1)·d‖ / ‖d‖`.
    pub residual_error: f64,
}

/// Exponential decay `δ(k) = δ(0)·e^(−αk)` fitted to the error curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayFit {
    pub delta0: f64,
    pub alpha: f64,
    /// Coefficient of determination of the log-linear regression.
    pub r_squared: f64,
}

/// Output of [`convergence_test`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub points: Vec<ConvergencePoint>,
    pub tolerance: f64,
    pub converged_k: Option<usize>,
    pub decay: Option<DecayFit>,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.converged_k.is_some()
    }

    pub fn final_error(&self) -> Option<f64> {
        self.points.last().map(|p| p.residual_error)
    }
}

/// Calibration diagnostic: residual for `k = 1..=k_max` and the fitted
/// geometric decay rate. Not used on the per-period path.
pub fn convergence_test(
    solver: &NeumannSolver,
    d: &[f64],
    k_max: usize,
    tolerance: f64,
) -> Result<ConvergenceReport, EconError> {
    if k_max == 0 {
        return Err(EconError::InvalidIterations);
    }
    if d.len() != solver.a.cols() {
        return Err(EconError::DimensionMismatch(format!(
            "test vector has {} entries, matrix has {} columns",
            d.len(),
            solver.a.cols()
        )));
    }
    info!(k_max, tolerance, "testing Neumann series convergence");
    let d_norm = norm2(d);
    let mut term = d.to_vec();
    let mut points = Vec::with_capacity(k_max);
    let mut converged_k = None;
    for k in 1..=k_max {
        term = solver.a.mul_vec(&term);
        // term is now A^k d, the residual of x_(k-1); advance once more
        // without keeping it so that point k describes x_k.
        let next = solver.a.mul_vec(&term);
        let residual_error = if d_norm > 0.0 { norm2(&next) / d_norm } else { 0.0 };
        points.push(ConvergencePoint { k, residual_error });
        if converged_k.is_none() && residual_error < tolerance {
            info!(k, residual_error, "Neumann series converged");
            converged_k = Some(k);
        }
    }
    if converged_k.is_none() {
        warn!(
            k_max,
            final_error = points.last().map_or(f64::NAN, |p| p.residual_error),
            "Neumann series did not converge"
        );
    }
    let decay = fit_decay(&points);
    Ok(ConvergenceReport {
        points,
        tolerance,
        converged_k,
        decay,
    })
}

/// Least-squares fit of `ln δ(k) = ln δ(0) − α·k` over strictly positive errors.
pub fn fit_decay(points: &[ConvergencePoint]) -> Option<DecayFit> {
    let usable: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| p.residual_error > 0.0 && p.residual_error.is_finite())
        .map(|p| (p.k as f64, p.residual_error.ln()))
        .collect();
    if usable.len() < 2 {
        return None;
    }
    let n = usable.len() as f64;
    let mean_k = usable.iter().map(|(k, _)| k).sum::<f64>() / n;
    let mean_y = usable.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = usable.iter().map(|(k, _)| (k - mean_k).powi(2)).sum();
    let sxy: f64 = usable
        .iter()
        .map(|(k, y)| (k - mean_k) * (y - mean_y))
        .sum();
    let syy: f64 = usable.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_k;
    let r_squared = if syy > 0.0 { sxy * sxy / (sxx * syy) } else { 1.0 };
    Some(DecayFit {
        delta0: intercept.exp(),
        alpha: -slope,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use plan_core::ValidationError;
    use proptest::prelude::*;

    fn toy() -> NeumannSolver {
        NeumannSolver::new(Matrix::from_rows(vec![vec![0.2, 0.1], vec![0.1, 0.3]]).unwrap())
            .unwrap()
    }

    #[test]
    fn two_sector_scenario_meets_tolerance() {
        let solver = toy();
        let f = [100.0, 100.0];
        let sol = solver.solve(&f, 20).unwrap();
        assert!(residual_norm(solver.matrix(), &f, &sol.x) < 1e-6);
        assert_relative_eq!(sol.residual, residual_norm(solver.matrix(), &f, &sol.x), epsilon = 1e-9);
    }

    #[test]
    fn residual_shrinks_with_more_terms() {
        let a = Matrix::from_rows(vec![vec![1.0 / 6.0; 3]; 3]).unwrap();
        let solver = NeumannSolver::new(a).unwrap();
        assert_relative_eq!(solver.spectral_radius(), 0.5, epsilon = 1e-8);
        let d = [1.0, 1.0, 1.0];
        let r1 = solver.solve(&d, 1).unwrap().residual;
        let r5 = solver.solve(&d, 5).unwrap().residual;
        assert!(r5 < r1);
    }

    #[test]
    fn non_productive_fails_before_iterating() {
        let a = Matrix::from_rows(vec![vec![0.5, 0.6], vec![0.6, 0.5]]).unwrap();
        let err = NeumannSolver::new(a).unwrap_err();
        assert!(matches!(
            err,
            EconError::Validation(ValidationError::NonProductiveMatrix { .. })
        ));
    }

    #[test]
    fn zero_iterations_rejected() {
        assert_eq!(toy().solve(&[1.0, 1.0], 0), Err(EconError::InvalidIterations));
    }

    #[test]
    fn wrong_dimension_rejected() {
        assert!(matches!(
            toy().solve(&[1.0, 1.0, 1.0], 5),
            Err(EconError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn residual_cap_reports_divergence() {
        let solver = toy().with_max_residual(1e-3);
        let err = solver.solve(&[100.0, 100.0], 1).unwrap_err();
        match err {
            EconError::SolverDivergence { residual, iterations } => {
                assert_eq!(iterations, 1);
                assert!(residual > 1e-3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(solver.solve(&[100.0, 100.0], 20).is_ok());
    }

    #[test]
    fn diagnostic_fits_geometric_decay() {
        let a = Matrix::from_diagonal(&[0.5, 0.5]);
        let solver = NeumannSolver::new(a).unwrap();
        let report = convergence_test(&solver, &[1.0, 2.0], 30, 1e-4).unwrap();
        assert_eq!(report.points.len(), 30);
        // residual of x_k is 0.5^(k+1)
        assert_relative_eq!(report.points[0].residual_error, 0.25, epsilon = 1e-12);
        assert_eq!(report.converged_k, Some(13));
        let decay = report.decay.unwrap();
        assert_relative_eq!(decay.alpha, 2.0_f64.ln(), epsilon = 1e-9);
        assert_relative_eq!(decay.delta0, 0.5, epsilon = 1e-9);
        assert!(decay.r_squared > 0.999_999);
    }

    #[test]
    fn diagnostic_reports_non_convergence() {
        let solver = toy();
        let report = convergence_test(&solver, &[1.0, 1.0], 3, 1e-12).unwrap();
        assert!(!report.converged());
        assert!(report.final_error().unwrap() > 1e-12);
    }

    fn symmetric(upper: &[f64]) -> Matrix {
        // 3x3 symmetric matrix from its 6 upper-triangular entries
        let idx = [[0, 1, 2], [1, 3, 4], [2, 4, 5]];
        let rows = idx
            .iter()
            .map(|r| r.iter().map(|&i| upper[i]).collect())
            .collect();
        Matrix::from_rows(rows).unwrap()
    }

    proptest! {
        #[test]
        fn residual_non_increasing_in_k(
            upper in proptest::collection::vec(0.0f64..0.3, 6),
            d in proptest::collection::vec(0.1f64..100.0, 3),
        ) {
            let solver = NeumannSolver::new(symmetric(&upper)).unwrap();
            let mut prev = f64::INFINITY;
            for k in 1..15 {
                let r = solver.solve(&d, k).unwrap().residual;
                prop_assert!(r <= prev * (1.0 + 1e-12) + 1e-300);
                prev = r;
            }
        }

        #[test]
        fn leontief_roundtrip_recovers_x(
            upper in proptest::collection::vec(0.0f64..0.3, 6),
            x in proptest::collection::vec(-50.0f64..50.0, 3),
        ) {
            let solver = NeumannSolver::new(symmetric(&upper)).unwrap();
            let d = solver.matrix().leontief_apply(&x);
            let back = solver.solve(&d, 400).unwrap().x;
            for (xi, bi) in x.iter().zip(&back) {
                prop_assert!((xi - bi).abs() < 1e-8 * (1.0 + xi.abs()));
            }
        }
    }
}
