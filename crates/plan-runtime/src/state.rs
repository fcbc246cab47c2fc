//! Cross-period state and the per-period snapshots recorded for reporting.

use chrono::NaiveDate;
use plan_econ::{ArFit, DegenerateFit, DemandForecaster, ShockGenerator};
use serde::{Deserialize, Serialize};

/// Everything one period hands to the next.
///
/// The orchestrator never mutates a state in place: a period transition
/// reads one `SimState` and produces the next, so a failed period leaves the
/// last valid state intact for post-mortem inspection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Last completed period.
    pub period: usize,
    /// `K(t)`
    pub capital: Vec<f64>,
    /// `I(t)`, installed at the start of the next period.
    pub investment: Vec<f64>,
    /// `X(t)`
    pub output: Vec<f64>,
    /// `ΔK_expected(t)`, added to next period's capital requirement.
    pub expected_capital_growth: Vec<f64>,
    /// `C_p(t)`
    pub planned: Vec<f64>,
    /// `C_p(t+1)`, already corrected for this period's price deviation.
    pub planned_next: Vec<f64>,
    /// `ΔP(t)`
    pub price_deviation: Vec<f64>,
    /// Consumption shares `α(t)`.
    pub shares: Vec<f64>,
    /// Persistent shock `s(t)`.
    pub shock: Vec<f64>,
    /// `G(t)`
    pub government: Vec<f64>,
    pub debt: f64,
    /// Persistence used while the forecaster window is filling; refreshed at
    /// every recalibration.
    pub persistence: Vec<f64>,
    /// First-difference AR(1) fits from the last recalibration. Once set they
    /// drive the demand forecast until the next recalibration.
    pub calibration: Option<Vec<ArFit>>,
    /// Planned-consumption deltas since the last recalibration.
    pub delta_history: Vec<Vec<f64>>,
    /// Fits that were degenerate this period; a warning is raised only when a
    /// model first turns degenerate.
    pub degenerate_fits: Vec<DegenerateFit>,
    pub forecaster: DemandForecaster,
    pub shocks: ShockGenerator,
}

/// Immutable snapshot of one period, in physical units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: usize,
    pub date: NaiveDate,
    /// True for the periods that fill the forecaster window.
    pub warm_up: bool,
    pub capital: Vec<f64>,
    pub unutilized_capital: Vec<f64>,
    pub shock: Vec<f64>,
    pub shares: Vec<f64>,
    pub forecast_delta: Vec<f64>,
    pub forecast_delta2: Vec<f64>,
    pub rho: Vec<f64>,
    pub planned: Vec<f64>,
    pub investment: Vec<f64>,
    pub government: Vec<f64>,
    pub final_demand: Vec<f64>,
    pub output: Vec<f64>,
    /// Relative residual of the output solve.
    pub residual: f64,
    pub taxes: f64,
    pub income: f64,
    /// `C_0`: what households would buy at base prices.
    pub desired: Vec<f64>,
    pub excess_demand: Vec<f64>,
    pub prices: Vec<f64>,
    /// Realized consumption at current prices.
    pub consumption: Vec<f64>,
    pub aggregate_demand: Vec<f64>,
    /// `X_max = B⁻¹·K`
    pub capacity_output: Vec<f64>,
    /// `F_c = (I − A)·X_max`
    pub capacity_final_demand: Vec<f64>,
    pub debt: f64,
}

/// Recoverable conditions observed during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimWarning {
    /// Capital required for the solved output exceeds the installed stock.
    CapacityExceeded {
        period: usize,
        sector: usize,
        required: f64,
        available: f64,
    },
    /// The AR(1) fit fell back to a zero persistence.
    DegenerateForecast {
        period: usize,
        sector: usize,
        second_difference: bool,
        variance: f64,
    },
    /// Planned investment was negative before any clamping.
    Disinvestment {
        period: usize,
        sector: usize,
        amount: f64,
    },
    /// Disinvestment exceeded the depreciated stock; capital was floored at
    /// zero and `shortfall` dropped.
    CapitalFloored {
        period: usize,
        sector: usize,
        shortfall: f64,
    },
}

impl SimWarning {
    pub fn period(&self) -> usize {
        match self {
            SimWarning::CapacityExceeded { period, .. }
            | SimWarning::DegenerateForecast { period, .. }
            | SimWarning::Disinvestment { period, .. }
            | SimWarning::CapitalFloored { period, .. } => *period,
        }
    }
}

/// Outcome of an annual recalibration pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecalibrationRecord {
    pub period: usize,
    /// Per-sector persistence re-estimated over the trailing window.
    pub persistence: Vec<f64>,
    pub intercepts: Vec<f64>,
    /// Sectors whose fit was degenerate and fall back to the last delta.
    pub degenerate_sectors: Vec<usize>,
    /// Number of deltas the estimate used.
    pub observations: usize,
    pub spectral_radius: f64,
    /// Factor applied to planned consumption to meet the growth target.
    pub rescale_factor: Option<f64>,
}
