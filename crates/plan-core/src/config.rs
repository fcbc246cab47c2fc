//! Run configuration, deserialized from YAML by the CLI.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::check_range;
use crate::{Matrix, ValidationError};

/// Functional form used to turn excess demand into a price deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAdjustment {
    /// `ΔP = P0 · (−ED / (ε·C_0))`
    #[default]
    Linear,
    /// `ΔP = P0 · (exp(−ED / (ε·C_0)) − 1)`; prices stay positive.
    LogLinear,
}

/// How the realized capital gap enters investment, and with it whether
/// investment can turn negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentRule {
    /// `ΔK_unexpected = −min(ΔK_expected, K_u)`: spare capital only offsets
    /// the expected build-out, so investment never falls below replacement.
    #[default]
    SpareFirst,
    /// `ΔK_unexpected = −K_u`: the whole gap is corrected in one period and
    /// negative investment (disinvestment) flows into final demand.
    FullGap,
    /// As `FullGap`, with negative sector investment floored at zero.
    FullGapClamped,
}

/// How government revenue and the deficit are computed each period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiscalRule {
    /// Taxes cover `(1 − tau)` of public spending on investment and
    /// government demand; the remaining share is borrowed.
    #[default]
    SpendingShare,
    /// Taxes are `tau` times the base-price value of gross output and are
    /// set against government demand only.
    OutputTax,
}

/// Sector class used to assign per-class depreciation, capital intensity
/// and demand trend. Sectors are ordered heavy, then medium, then light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorClass {
    Heavy,
    Medium,
    Light,
}

/// Inclusive `(min, max)` ranges per sector class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassRanges {
    pub heavy: (f64, f64),
    pub medium: (f64, f64),
    pub light: (f64, f64),
}

impl ClassRanges {
    pub fn for_class(&self, class: SectorClass) -> (f64, f64) {
        match class {
            SectorClass::Heavy => self.heavy,
            SectorClass::Medium => self.medium,
            SectorClass::Light => self.light,
        }
    }

    fn validate(
        &self,
        field: &str,
        lo: f64,
        hi: f64,
        range: &'static str,
    ) -> Result<(), ValidationError> {
        for (name, (min, max)) in [
            ("heavy", self.heavy),
            ("medium", self.medium),
            ("light", self.light),
        ] {
            check_range(format!("{field}.{name}.min"), min, lo, hi, range)?;
            check_range(format!("{field}.{name}.max"), max, lo, hi, range)?;
            if min > max {
                return Err(ValidationError::OutOfRange {
                    field: format!("{field}.{name}"),
                    value: min,
                    range: "min <= max",
                });
            }
        }
        Ok(())
    }
}

/// Output settings consumed by the reporting collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub save_csv: bool,
    pub save_parquet: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("simulation_outputs"),
            save_csv: true,
            save_parquet: false,
        }
    }
}

/// Full run configuration. Every field has a default so partial YAML files
/// are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Planning horizon in months, excluding the forecaster warm-up.
    pub t_plan: usize,
    /// Forecaster window `W` in months; also the warm-up length.
    pub window: usize,
    /// Tax parameter; meaning depends on `fiscal_rule`.
    pub tau: f64,
    /// Share of capital held back as a capacity buffer when measuring spare capital.
    pub b: f64,
    /// Initial capacity relative to initial output.
    pub initial_capacity_buffer: f64,
    /// Annual growth target for government demand.
    pub g_a: f64,
    /// Neumann iterations per solve.
    pub k: usize,
    pub n: usize,
    pub n_heavy: usize,
    pub n_medium: usize,
    pub n_light: usize,
    pub shock_sigma: f64,
    pub shock_persist: f64,
    /// Optional n×n covariance of shock innovations; diagonal `sigma²` when absent.
    pub shock_covariance: Option<Vec<Vec<f64>>>,
    /// Monthly demand trend per class.
    pub mu_heavy: f64,
    pub mu_medium: f64,
    pub mu_light: f64,
    /// Price elasticity `ε` shared by the price update and the plan correction.
    pub price_elasticity: f64,
    /// Annual depreciation ranges per class; converted to monthly rates.
    pub depreciation_annual: ClassRanges,
    /// Explicit annual depreciation per sector; overrides the class ranges.
    pub depreciation: Option<Vec<f64>>,
    /// Capital per unit of monthly output, per class (diagonal of `B`).
    pub capital_intensity: ClassRanges,
    /// Explicit full capital coefficient matrix; overrides the class ranges.
    pub capital_coefficients: Option<Vec<Vec<f64>>>,
    pub random_seed: u64,
    /// Largest `k` tried by the Neumann convergence diagnostic.
    pub neumann_max_k: usize,
    /// Relative error at which the diagnostic declares convergence.
    pub neumann_tolerance: f64,
    /// Largest relative residual accepted from a per-period solve.
    pub max_residual: f64,
    /// Absolute slack on the capacity check `B·X <= K + tolerance`, in
    /// capital units.
    pub capacity_tolerance: f64,
    /// Periods between annual recalibrations.
    pub recalibration_interval: usize,
    /// Rescale planned consumption to the nominal growth path at recalibration.
    pub rescale_to_growth_target: bool,
    /// Fit an intercept in the AR(1) regressions.
    pub forecast_intercept: bool,
    /// Persistence applied to the last delta while the window is filling.
    pub warmup_persistence: f64,
    /// Regressor variance, as a fraction of the regressor's mean square, at
    /// or below which a fit is treated as degenerate.
    pub min_forecast_variance: f64,
    pub price_adjustment: PriceAdjustment,
    pub investment_rule: InvestmentRule,
    pub fiscal_rule: FiscalRule,
    /// Calendar month of period zero.
    pub start_date: NaiveDate,
    /// Path to a JSON or YAML dataset; a synthetic economy is built when absent.
    pub dataset: Option<PathBuf>,
    pub report: ReportConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            t_plan: 60,
            window: 12,
            tau: 0.05,
            b: 0.05,
            initial_capacity_buffer: 1.1,
            g_a: 0.03,
            k: 20,
            n: 12,
            n_heavy: 3,
            n_medium: 4,
            n_light: 5,
            shock_sigma: 0.01,
            shock_persist: 0.5,
            shock_covariance: None,
            mu_heavy: 0.0,
            mu_medium: 0.0,
            mu_light: 0.0,
            price_elasticity: -1.0,
            depreciation_annual: ClassRanges {
                heavy: (0.04, 0.08),
                medium: (0.08, 0.15),
                light: (0.15, 0.25),
            },
            depreciation: None,
            capital_intensity: ClassRanges {
                heavy: (30.0, 48.0),
                medium: (18.0, 30.0),
                light: (6.0, 18.0),
            },
            capital_coefficients: None,
            random_seed: 42,
            neumann_max_k: 50,
            neumann_tolerance: 1e-4,
            max_residual: 0.05,
            capacity_tolerance: 1e-6,
            recalibration_interval: 12,
            rescale_to_growth_target: false,
            forecast_intercept: true,
            warmup_persistence: 1.0,
            min_forecast_variance: 1e-12,
            price_adjustment: PriceAdjustment::Linear,
            investment_rule: InvestmentRule::SpareFirst,
            fiscal_rule: FiscalRule::SpendingShare,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            dataset: None,
            report: ReportConfig::default(),
        }
    }
}

impl PlanConfig {
    /// Monthly growth rate equivalent to the annual target `g_a`.
    pub fn monthly_growth(&self) -> f64 {
        (1.0 + self.g_a).powf(1.0 / 12.0) - 1.0
    }

    /// Total simulated periods: warm-up window plus planning horizon.
    pub fn total_periods(&self) -> usize {
        self.t_plan + self.window
    }

    /// Class of every sector, in sector order.
    pub fn sector_classes(&self) -> Vec<SectorClass> {
        std::iter::repeat(SectorClass::Heavy)
            .take(self.n_heavy)
            .chain(std::iter::repeat(SectorClass::Medium).take(self.n_medium))
            .chain(std::iter::repeat(SectorClass::Light).take(self.n_light))
            .collect()
    }

    /// Per-sector monthly demand trend `μ`.
    pub fn trend_vector(&self) -> Vec<f64> {
        self.sector_classes()
            .into_iter()
            .map(|c| match c {
                SectorClass::Heavy => self.mu_heavy,
                SectorClass::Medium => self.mu_medium,
                SectorClass::Light => self.mu_light,
            })
            .collect()
    }

    /// Cholesky factor of the configured shock covariance, if any.
    pub fn shock_cholesky(&self) -> Result<Option<Matrix>, ValidationError> {
        let Some(rows) = &self.shock_covariance else {
            return Ok(None);
        };
        let cov = Matrix::from_rows(rows.clone())?;
        if cov.rows() != self.n || cov.cols() != self.n {
            return Err(ValidationError::ConfigMismatch(format!(
                "shock covariance is {}x{}, expected {n}x{n}",
                cov.rows(),
                cov.cols(),
                n = self.n
            )));
        }
        cov.cholesky().map(Some).ok_or(ValidationError::InvalidCovariance)
    }

    /// Validate internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.n == 0 {
            return Err(ValidationError::ConfigMismatch("n must be > 0".into()));
        }
        let classes = self.n_heavy + self.n_medium + self.n_light;
        if classes != self.n {
            return Err(ValidationError::ConfigMismatch(format!(
                "n_heavy + n_medium + n_light = {classes}, but n = {}",
                self.n
            )));
        }
        if self.t_plan == 0 {
            return Err(ValidationError::ConfigMismatch("t_plan must be > 0".into()));
        }
        if self.window < 2 {
            return Err(ValidationError::ConfigMismatch(
                "forecast window must hold at least 2 periods".into(),
            ));
        }
        if self.k == 0 || self.neumann_max_k == 0 {
            return Err(ValidationError::ConfigMismatch(
                "Neumann iteration counts must be >= 1".into(),
            ));
        }
        if self.recalibration_interval == 0 {
            return Err(ValidationError::ConfigMismatch(
                "recalibration_interval must be >= 1".into(),
            ));
        }
        check_range("tau", self.tau, 0.0, 1.0, "[0, 1]")?;
        check_range("b", self.b, 0.0, 0.999, "[0, 1)")?;
        check_range(
            "initial_capacity_buffer",
            self.initial_capacity_buffer,
            f64::MIN_POSITIVE,
            f64::MAX,
            "(0, inf)",
        )?;
        check_range("g_a", self.g_a, -0.999, f64::MAX, "(-1, inf)")?;
        check_range("shock_sigma", self.shock_sigma, 0.0, f64::MAX, "[0, inf)")?;
        check_range("shock_persist", self.shock_persist, -0.999_999, 0.999_999, "(-1, 1)")?;
        for (name, mu) in [
            ("mu_heavy", self.mu_heavy),
            ("mu_medium", self.mu_medium),
            ("mu_light", self.mu_light),
        ] {
            check_range(name, mu, -1.0, 1.0, "[-1, 1]")?;
        }
        if !self.price_elasticity.is_finite() || self.price_elasticity == 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "price_elasticity".into(),
                value: self.price_elasticity,
                range: "finite and non-zero",
            });
        }
        self.depreciation_annual
            .validate("depreciation_annual", 0.0, 1.0, "[0, 1]")?;
        self.capital_intensity
            .validate("capital_intensity", f64::MIN_POSITIVE, f64::MAX, "(0, inf)")?;
        if let Some(rates) = &self.depreciation {
            if rates.len() != self.n {
                return Err(ValidationError::ConfigMismatch(format!(
                    "depreciation has {} entries, expected {}",
                    rates.len(),
                    self.n
                )));
            }
            for (i, &d) in rates.iter().enumerate() {
                check_range(format!("depreciation[{i}]"), d, 0.0, 1.0, "[0, 1]")?;
            }
        }
        if let Some(rows) = &self.capital_coefficients {
            let b = Matrix::from_rows(rows.clone())?;
            if b.rows() != self.n || b.cols() != self.n {
                return Err(ValidationError::ConfigMismatch(format!(
                    "capital coefficients are {}x{}, expected {n}x{n}",
                    b.rows(),
                    b.cols(),
                    n = self.n
                )));
            }
        }
        check_range("neumann_tolerance", self.neumann_tolerance, 0.0, 1.0, "[0, 1]")?;
        check_range("max_residual", self.max_residual, 0.0, f64::MAX, "[0, inf)")?;
        check_range("capacity_tolerance", self.capacity_tolerance, 0.0, f64::MAX, "[0, inf)")?;
        check_range("warmup_persistence", self.warmup_persistence, -1.0, 1.0, "[-1, 1]")?;
        check_range(
            "min_forecast_variance",
            self.min_forecast_variance,
            0.0,
            f64::MAX,
            "[0, inf)",
        )?;
        self.shock_cholesky()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PlanConfig::default().validate().unwrap();
    }

    #[test]
    fn sector_count_mismatch() {
        let cfg = PlanConfig {
            n: 10,
            ..PlanConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::ConfigMismatch(_))
        ));
    }

    #[test]
    fn classes_follow_counts() {
        let cfg = PlanConfig::default();
        let classes = cfg.sector_classes();
        assert_eq!(classes.len(), 12);
        assert_eq!(classes[0], SectorClass::Heavy);
        assert_eq!(classes[3], SectorClass::Medium);
        assert_eq!(classes[11], SectorClass::Light);
    }

    #[test]
    fn monthly_growth_compounds_to_annual() {
        let cfg = PlanConfig {
            g_a: 0.05,
            ..PlanConfig::default()
        };
        let annual = (1.0 + cfg.monthly_growth()).powi(12) - 1.0;
        assert!((annual - 0.05).abs() < 1e-12);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "t_plan: 24\nprice_adjustment: log_linear\nstart_date: 2030-06-01\n";
        let cfg: PlanConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.t_plan, 24);
        assert_eq!(cfg.window, 12);
        assert_eq!(cfg.price_adjustment, PriceAdjustment::LogLinear);
        assert_eq!(cfg.start_date, NaiveDate::from_ymd_opt(2030, 6, 1).unwrap());
        assert_eq!(cfg.total_periods(), 36);
    }

    #[test]
    fn demo_config_matches_defaults() {
        let yaml = include_str!("../../../demos/plan.yaml");
        let cfg: PlanConfig = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg, PlanConfig::default());
    }

    #[test]
    fn covariance_must_be_positive_definite() {
        let mut cfg = PlanConfig {
            n: 2,
            n_heavy: 1,
            n_medium: 1,
            n_light: 0,
            ..PlanConfig::default()
        };
        cfg.shock_covariance = Some(vec![vec![1.0, 2.0], vec![2.0, 1.0]]);
        assert_eq!(cfg.validate(), Err(ValidationError::InvalidCovariance));
        cfg.shock_covariance = Some(vec![vec![1.0, 0.5], vec![0.5, 1.0]]);
        assert!(cfg.shock_cholesky().unwrap().is_some());
    }
}
