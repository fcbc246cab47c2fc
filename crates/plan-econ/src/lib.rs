#![deny(warnings)]

//! Planning models for the input–output simulator.
//!
//! This crate provides:
//! - A truncated Neumann-series solver for `(I − A)·x = d` with convergence diagnostics
//! - Per-sector AR(1) demand forecasting over a rolling window
//! - Seeded persistent demand shocks
//! - The nested capital/investment planner
//! - Excess-demand pricing and the planned-consumption feedback loop

use plan_core::ValidationError;
use thiserror::Error;

mod forecast;
mod investment;
mod neumann;
mod pricing;
mod shock;

pub use forecast::{
    extrapolate_calibrated, fit_and_extrapolate, fit_ar1, recalibrate_fits,
    recalibrate_persistence, ArFit, DegenerateFit, Degeneracy, DemandForecaster, Forecast,
    ForecastSettings,
};
pub use investment::{unutilized_capital, CapitalInvestmentPlanner, InvestmentPlan};
pub use neumann::{
    convergence_test, fit_decay, neumann, residual_norm, ConvergencePoint, ConvergenceReport,
    DecayFit, NeumannSolver, Solution,
};
pub use pricing::{excess_demand, update_planned_consumption, PriceFeedbackCorrector};
pub use shock::{apply_to_shares, next_shock, ShockGenerator};

/// Errors produced by the planning models.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Input data failed validation (productivity, dimensions, ranges).
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Residual did not shrink below the accepted bound within the iteration cap.
    #[error("Neumann series diverged: relative residual {residual:.3e} after {iterations} iterations")]
    SolverDivergence { residual: f64, iterations: usize },
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// The series needs at least one term beyond the identity.
    #[error("iteration count must be at least 1")]
    InvalidIterations,
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}
