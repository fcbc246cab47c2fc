//! The monthly planning loop.

use chrono::{Months, NaiveDate};
use plan_core::{
    add, all_finite, check_productive, dot, hadamard, scale, sub, Economy, FiscalRule, PlanConfig,
    ValidationError,
};
use plan_econ::{
    apply_to_shares, excess_demand, recalibrate_fits, unutilized_capital,
    CapitalInvestmentPlanner, DemandForecaster, EconError, ForecastSettings, NeumannSolver,
    PriceFeedbackCorrector, ShockGenerator,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{PeriodRecord, RecalibrationRecord, RunError, SimState, SimWarning};

/// One period transition: the next state, its snapshot, and what went wrong
/// along the way without stopping the run.
#[derive(Clone, Debug)]
pub struct Transition {
    pub state: SimState,
    pub record: PeriodRecord,
    pub warnings: Vec<SimWarning>,
}

/// Everything a completed run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Base price vector `P0`.
    pub base_prices: Vec<f64>,
    pub records: Vec<PeriodRecord>,
    pub recalibrations: Vec<RecalibrationRecord>,
    pub warnings: Vec<SimWarning>,
    pub final_state: SimState,
}

/// Taxes raised and deficit run by the government in one period.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Fiscal {
    taxes: f64,
    deficit: f64,
}

/// Drives `Initialized → Running → Completed` over `T_plan + W` periods.
#[derive(Clone, Debug)]
pub struct Simulation {
    cfg: PlanConfig,
    economy: Economy,
    solver: NeumannSolver,
    planner: CapitalInvestmentPlanner,
    corrector: PriceFeedbackCorrector,
    settings: ForecastSettings,
    base_prices: Vec<f64>,
    /// `P0·C_p(0)`, the value of the initial consumption plan.
    base_plan_value: f64,
    growth: f64,
}

impl Simulation {
    /// Validate the configuration against the economy and derive base prices.
    ///
    /// Fails with `NonProductiveMatrix` before any period runs.
    pub fn new(economy: Economy, cfg: PlanConfig) -> Result<Self, EconError> {
        cfg.validate()?;
        economy.check_config(&cfg)?;
        let productive = NeumannSolver::new(economy.technical.clone())?;

        // labor-value prices: P0ᵀ(I − A) = vᵀ
        let base_prices = productive
            .transposed()
            .solve(&economy.value_added, cfg.k)?
            .x;
        let solver = productive.with_max_residual(cfg.max_residual);
        for (i, &p) in base_prices.iter().enumerate() {
            if !(p > 0.0) {
                return Err(ValidationError::OutOfRange {
                    field: format!("base_prices[{i}]"),
                    value: p,
                    range: "(0, inf)",
                }
                .into());
            }
        }
        let base_plan_value: f64 = economy.demand.consumption.iter().sum();
        if !(base_plan_value > 0.0) {
            return Err(ValidationError::OutOfRange {
                field: "total household consumption".into(),
                value: base_plan_value,
                range: "(0, inf)",
            }
            .into());
        }

        let planner = CapitalInvestmentPlanner::new(
            solver.clone(),
            economy.capital.clone(),
            economy.depreciation.clone(),
            cfg.k,
            cfg.investment_rule,
        )?;
        let corrector = PriceFeedbackCorrector::new(cfg.price_elasticity, cfg.price_adjustment)?;
        let settings = ForecastSettings {
            window: cfg.window,
            intercept: cfg.forecast_intercept,
            min_variance: cfg.min_forecast_variance,
        };
        info!(
            sectors = economy.sectors(),
            spectral_radius = economy.spectral_radius,
            periods = cfg.total_periods(),
            "simulation initialized"
        );
        Ok(Self {
            growth: cfg.monthly_growth(),
            cfg,
            economy,
            solver,
            planner,
            corrector,
            settings,
            base_prices,
            base_plan_value,
        })
    }

    pub fn config(&self) -> &PlanConfig {
        &self.cfg
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub fn solver(&self) -> &NeumannSolver {
        &self.solver
    }

    pub fn base_prices(&self) -> &[f64] {
        &self.base_prices
    }

    /// Period zero: demand from the final-demand table at base prices, and a
    /// capital stock sized to the initial capacity buffer.
    pub fn initial(&self) -> Result<Transition, EconError> {
        let econ = &self.economy;
        let cfg = &self.cfg;
        let n = econ.sectors();
        let p0 = &self.base_prices;
        let table = &econ.demand;

        let shares = scale(&table.consumption, 1.0 / self.base_plan_value);
        let planned = divide(&table.consumption, p0);
        let government = divide(&table.government, p0);
        let start = self.initial_stock(&planned, &government)?;

        let final_demand = add(&add(&planned, &start.investment), &government);
        let fiscal = self.fiscal(&start.output, &start.investment, &government);
        let income = dot(&econ.value_added, &start.output) - fiscal.taxes;
        let capacity_output = econ.capital_inverse.mul_vec(&start.capital);
        let capacity_final_demand = econ.technical.leontief_apply(&capacity_output);

        let record = PeriodRecord {
            period: 0,
            date: period_date(cfg.start_date, 0),
            warm_up: cfg.window > 0,
            capital: start.capital.clone(),
            unutilized_capital: vec![0.0; n],
            shock: vec![0.0; n],
            shares: shares.clone(),
            forecast_delta: vec![0.0; n],
            forecast_delta2: vec![0.0; n],
            rho: vec![cfg.warmup_persistence; n],
            planned: planned.clone(),
            investment: start.investment.clone(),
            government: government.clone(),
            final_demand: final_demand.clone(),
            output: start.output.clone(),
            residual: start.residual,
            taxes: fiscal.taxes,
            income,
            desired: planned.clone(),
            excess_demand: vec![0.0; n],
            prices: p0.clone(),
            consumption: planned.clone(),
            aggregate_demand: final_demand,
            capacity_output,
            capacity_final_demand,
            debt: 0.0,
        };
        let state = SimState {
            period: 0,
            capital: start.capital,
            investment: start.investment,
            output: start.output,
            expected_capital_growth: vec![0.0; n],
            planned_next: planned.clone(),
            planned,
            price_deviation: vec![0.0; n],
            shares,
            shock: vec![0.0; n],
            government,
            debt: 0.0,
            persistence: vec![cfg.warmup_persistence; n],
            calibration: None,
            delta_history: Vec::new(),
            degenerate_fits: Vec::new(),
            forecaster: DemandForecaster::new(self.settings),
            shocks: ShockGenerator::new(cfg.random_seed).with_cholesky(cfg.shock_cholesky()?),
        };
        Ok(Transition {
            state,
            record,
            warnings: Vec::new(),
        })
    }

    /// Stationary start: output that covers final demand and the replacement
    /// of its own buffered capital stock, `X = solve(A + b₀·Δ·B, C + G)`.
    fn initial_stock(
        &self,
        planned: &[f64],
        government: &[f64],
    ) -> Result<InitialStock, EconError> {
        let econ = &self.economy;
        let buffer = self.cfg.initial_capacity_buffer;
        let k = self.cfg.k.max(self.cfg.neumann_max_k);
        let n = econ.sectors();

        let mut augmented = econ.technical.clone();
        for row in 0..n {
            for col in 0..n {
                let extra = buffer * econ.depreciation[row] * econ.capital.get(row, col);
                augmented.set(row, col, augmented.get(row, col) + extra);
            }
        }
        let base = add(planned, government);
        match NeumannSolver::new(augmented) {
            Ok(stationary) => {
                let solution = stationary.solve(&base, k)?;
                let capital = econ.capital.mul_vec(&scale(&solution.x, buffer));
                let investment = hadamard(&econ.depreciation, &capital);
                Ok(InitialStock {
                    output: solution.x,
                    capital,
                    investment,
                    residual: solution.relative_residual,
                })
            }
            Err(err) => {
                warn!(error = %err, "no stationary start, sizing capital from the demand table");
                let table_output = divide(&econ.demand.total_output, &self.base_prices);
                let sized = econ.capital.mul_vec(&scale(&table_output, buffer));
                let investment = hadamard(&econ.depreciation, &sized);
                let solution = self.solver.solve(&add(&base, &investment), k)?;
                let capital = econ.capital.mul_vec(&scale(&solution.x, buffer));
                Ok(InitialStock {
                    output: solution.x,
                    capital,
                    investment,
                    residual: solution.relative_residual,
                })
            }
        }
    }

    /// Advance one period. `prev` is left untouched.
    pub fn step(&self, prev: &SimState) -> Result<Transition, EconError> {
        let econ = &self.economy;
        let cfg = &self.cfg;
        let p0 = &self.base_prices;
        let t = prev.period + 1;
        let mut warnings = Vec::new();

        let (capital, floored) =
            advance_capital(&prev.capital, &econ.depreciation, &prev.investment);
        for (sector, shortfall) in floored {
            warn!(period = t, sector, shortfall, "capital floored at zero");
            warnings.push(SimWarning::CapitalFloored {
                period: t,
                sector,
                shortfall,
            });
        }
        let requirement = add(
            &econ.capital.mul_vec(&prev.output),
            &prev.expected_capital_growth,
        );
        let unutilized = unutilized_capital(&capital, cfg.b, &requirement);

        let planned = prev.planned_next.clone();
        let delta = sub(&planned, &prev.planned);
        let government = scale(&prev.government, 1.0 + self.growth);

        let mut shocks = prev.shocks.clone();
        let shock = shocks.next_shock(
            &prev.shock,
            cfg.shock_sigma,
            cfg.shock_persist,
            &econ.trend,
        );
        let shares = apply_to_shares(&prev.shares, &shock);

        let mut forecaster = prev.forecaster.clone();
        forecaster.observe(delta.clone());
        let mut delta_history = prev.delta_history.clone();
        delta_history.push(delta);
        let forecast = match &prev.calibration {
            Some(fits) => forecaster.forecast_calibrated(fits),
            None => forecaster.forecast(&prev.persistence),
        };
        for fit in &forecast.degenerate {
            let ongoing = prev.degenerate_fits.iter().any(|d| {
                d.sector == fit.sector && d.second_difference == fit.second_difference
            });
            if ongoing {
                continue;
            }
            warn!(
                period = t,
                sector = fit.sector,
                second_difference = fit.second_difference,
                variance = fit.variance,
                "degenerate forecast, persistence set to zero"
            );
            warnings.push(SimWarning::DegenerateForecast {
                period: t,
                sector: fit.sector,
                second_difference: fit.second_difference,
                variance: fit.variance,
            });
        }

        let plan = self.planner.plan_investment(
            &forecast.delta,
            &forecast.delta2,
            &capital,
            &unutilized,
            &government,
            self.growth,
        )?;
        for &sector in &plan.disinvesting {
            let amount = plan.expected[sector] + plan.unexpected[sector] + plan.replacement[sector];
            warn!(period = t, sector, amount, "planned investment is negative");
            warnings.push(SimWarning::Disinvestment {
                period: t,
                sector,
                amount,
            });
        }

        let final_demand = add(&add(&planned, &plan.investment), &government);
        let solution = self.solver.solve(&final_demand, cfg.k)?;
        let output = solution.x;

        let required = econ.capital.mul_vec(&output);
        let short = over_capacity(&required, &capital, cfg.capacity_tolerance);
        for (sector, need, available) in short {
            warn!(period = t, sector, required = need, available, "capacity exceeded");
            warnings.push(SimWarning::CapacityExceeded {
                period: t,
                sector,
                required: need,
                available,
            });
        }

        let fiscal = self.fiscal(&output, &plan.investment, &government);
        let income = dot(&econ.value_added, &output) - fiscal.taxes;
        let desired: Vec<f64> = shares.iter().zip(p0).map(|(a, p)| a * income / p).collect();
        let excess = excess_demand(&desired, &planned);
        let price_deviation = self.corrector.price_deviation(&excess, &desired, p0)?;
        let prices = add(p0, &price_deviation);
        let consumption: Vec<f64> = shares
            .iter()
            .zip(&prices)
            .map(|(a, p)| a * income / p)
            .collect();
        if !all_finite(&consumption) {
            return Err(EconError::NonFinite("realized consumption"));
        }
        let aggregate_demand = add(&add(&consumption, &plan.investment), &government);
        let capacity_output = econ.capital_inverse.mul_vec(&capital);
        let capacity_final_demand = econ.technical.leontief_apply(&capacity_output);

        let planned_next =
            self.corrector
                .update_planned_consumption(&planned, &price_deviation, p0)?;
        let debt = prev.debt + fiscal.deficit;
        debug!(
            period = t,
            residual = solution.relative_residual,
            income,
            debt,
            "period complete"
        );

        let record = PeriodRecord {
            period: t,
            date: period_date(cfg.start_date, t),
            warm_up: t < cfg.window,
            capital: capital.clone(),
            unutilized_capital: unutilized,
            shock: shock.clone(),
            shares: shares.clone(),
            forecast_delta: forecast.delta,
            forecast_delta2: forecast.delta2,
            rho: forecast.rho,
            planned: planned.clone(),
            investment: plan.investment.clone(),
            government: government.clone(),
            final_demand,
            output: output.clone(),
            residual: solution.relative_residual,
            taxes: fiscal.taxes,
            income,
            desired,
            excess_demand: excess,
            prices,
            consumption,
            aggregate_demand,
            capacity_output,
            capacity_final_demand,
            debt,
        };
        let state = SimState {
            period: t,
            capital,
            investment: plan.investment,
            output,
            expected_capital_growth: plan.expected,
            planned,
            planned_next,
            price_deviation,
            shares,
            shock,
            government,
            debt,
            persistence: prev.persistence.clone(),
            calibration: prev.calibration.clone(),
            delta_history,
            degenerate_fits: forecast.degenerate,
            forecaster,
            shocks,
        };
        Ok(Transition {
            state,
            record,
            warnings,
        })
    }

    /// Annual pass: re-estimate the first-difference fits over the trailing
    /// window only, re-check productivity, and optionally pull the plan back
    /// onto the growth target. The new fits drive the forecast until the next
    /// pass. On error `state` is left as it was.
    pub fn recalibrate(&self, state: &mut SimState) -> Result<RecalibrationRecord, EconError> {
        let spectral_radius = check_productive(&self.economy.technical)?;

        let span = self.cfg.window;
        let observations = state.delta_history.len().min(span);
        let drop = state.delta_history.len() - observations;
        let fits = recalibrate_fits(&state.delta_history[drop..], span, &self.settings);

        let rescale_factor = if self.cfg.rescale_to_growth_target {
            let periods = (state.period + 1) as f64;
            let target = self.base_plan_value * (1.0 + self.growth).powf(periods);
            let current = dot(&self.base_prices, &state.planned_next);
            if current > 0.0 {
                let factor = target / current;
                state.planned_next = scale(&state.planned_next, factor);
                Some(factor)
            } else {
                None
            }
        } else {
            None
        };

        state.delta_history.drain(..drop);
        let persistence: Vec<f64> = fits.iter().map(|fit| fit.phi).collect();
        let intercepts: Vec<f64> = fits.iter().map(|fit| fit.intercept).collect();
        let degenerate_sectors: Vec<usize> = fits
            .iter()
            .enumerate()
            .filter(|(_, fit)| fit.degenerate.is_some())
            .map(|(sector, _)| sector)
            .collect();
        if fits.len() == state.persistence.len() {
            state.persistence = persistence.clone();
            state.calibration = Some(fits);
        }

        let mean_rho = if persistence.is_empty() {
            0.0
        } else {
            persistence.iter().sum::<f64>() / persistence.len() as f64
        };
        if !degenerate_sectors.is_empty() {
            warn!(
                period = state.period,
                sectors = ?degenerate_sectors,
                "degenerate recalibration, forecasting the last delta"
            );
        }
        info!(
            period = state.period,
            mean_rho,
            observations,
            spectral_radius,
            ?rescale_factor,
            "annual recalibration"
        );
        Ok(RecalibrationRecord {
            period: state.period,
            persistence,
            intercepts,
            degenerate_sectors,
            observations,
            spectral_radius,
            rescale_factor,
        })
    }

    /// Run every period. Stops at the first fatal error, reporting the last
    /// valid period and its state.
    pub fn run(&self) -> Result<SimulationOutput, RunError> {
        let total = self.cfg.total_periods();
        info!(
            periods = total,
            warm_up = self.cfg.window,
            seed = self.cfg.random_seed,
            "starting simulation"
        );
        let first = self.initial().map_err(RunError::at_start)?;
        let mut records = Vec::with_capacity(total);
        let mut warnings = first.warnings;
        let mut recalibrations = Vec::new();
        records.push(first.record);
        let mut state = first.state;

        for t in 1..total {
            let next = match self.step(&state) {
                Ok(next) => next,
                Err(source) => {
                    return Err(RunError {
                        period: t,
                        source,
                        last_valid: records.pop().map(Box::new),
                        state: Some(Box::new(state)),
                    })
                }
            };
            warnings.extend(next.warnings);
            records.push(next.record);
            state = next.state;

            if t % self.cfg.recalibration_interval == 0 {
                match self.recalibrate(&mut state) {
                    Ok(rec) => recalibrations.push(rec),
                    Err(source) => {
                        return Err(RunError {
                            period: t,
                            source,
                            last_valid: records.pop().map(Box::new),
                            state: Some(Box::new(state)),
                        })
                    }
                }
            }
            if t % 12 == 0 {
                info!(year = t / 12, of = total / 12, "progress");
            }
        }

        info!(
            periods = records.len(),
            warnings = warnings.len(),
            debt = state.debt,
            "simulation complete"
        );
        Ok(SimulationOutput {
            base_prices: self.base_prices.clone(),
            records,
            recalibrations,
            warnings,
            final_state: state,
        })
    }

    fn fiscal(&self, output: &[f64], investment: &[f64], government: &[f64]) -> Fiscal {
        let p0 = &self.base_prices;
        let tau = self.cfg.tau;
        match self.cfg.fiscal_rule {
            FiscalRule::SpendingShare => {
                let spending = dot(p0, &add(investment, government));
                let taxes = (1.0 - tau) * spending;
                Fiscal {
                    taxes,
                    deficit: spending - taxes,
                }
            }
            FiscalRule::OutputTax => {
                let taxes = tau * dot(p0, output);
                Fiscal {
                    taxes,
                    deficit: dot(p0, government) - taxes,
                }
            }
        }
    }
}

struct InitialStock {
    output: Vec<f64>,
    capital: Vec<f64>,
    investment: Vec<f64>,
    residual: f64,
}

/// `K(t) = (I − Δ)·K(t−1) + I(t−1)`, floored at zero. Floored sectors are
/// returned with the amount the floor absorbed.
fn advance_capital(
    capital: &[f64],
    depreciation: &[f64],
    investment: &[f64],
) -> (Vec<f64>, Vec<(usize, f64)>) {
    let mut floored = Vec::new();
    let next: Vec<f64> = capital
        .iter()
        .zip(depreciation)
        .zip(investment)
        .enumerate()
        .map(|(sector, ((k, d), i))| {
            let stock = (1.0 - d) * k + i;
            if stock < 0.0 {
                floored.push((sector, -stock));
                0.0
            } else {
                stock
            }
        })
        .collect();
    (next, floored)
}

/// Sectors where the capital requirement `B·X` exceeds the installed stock
/// by more than `tolerance`, as `(sector, required, available)`.
fn over_capacity(required: &[f64], capital: &[f64], tolerance: f64) -> Vec<(usize, f64, f64)> {
    required
        .iter()
        .zip(capital)
        .enumerate()
        .filter(|(_, (need, available))| **need > **available + tolerance)
        .map(|(sector, (need, available))| (sector, *need, *available))
        .collect()
}

fn divide(values: &[f64], by: &[f64]) -> Vec<f64> {
    values.iter().zip(by).map(|(v, p)| v / p).collect()
}

/// Calendar month of period `t`, saturating at the end of the calendar.
pub fn period_date(start: NaiveDate, t: usize) -> NaiveDate {
    u32::try_from(t)
        .ok()
        .and_then(|m| start.checked_add_months(Months::new(m)))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use plan_core::{FinalDemandTable, IoTables, Matrix};

    fn toy_economy() -> Economy {
        let technical = Matrix::from_rows(vec![
            vec![0.10, 0.05, 0.05],
            vec![0.05, 0.10, 0.05],
            vec![0.05, 0.05, 0.10],
        ])
        .unwrap();
        let tables = IoTables {
            technical,
            value_added: vec![0.8, 0.8, 0.8],
            demand: FinalDemandTable {
                consumption: vec![50.0, 30.0, 20.0],
                investment: vec![5.0, 5.0, 5.0],
                government: vec![10.0, 10.0, 10.0],
                total_output: vec![90.0, 65.0, 50.0],
            },
        };
        Economy::new(
            tables,
            Matrix::from_diagonal(&[4.0, 3.0, 2.0]),
            vec![0.01, 0.01, 0.02],
            vec![0.0; 3],
        )
        .unwrap()
    }

    fn toy_config() -> PlanConfig {
        PlanConfig {
            n: 3,
            n_heavy: 1,
            n_medium: 1,
            n_light: 1,
            t_plan: 24,
            window: 6,
            ..PlanConfig::default()
        }
    }

    #[test]
    fn base_prices_price_value_added() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let p0 = sim.base_prices();
        // P0ᵀ(I − A) = vᵀ
        let at = sim.economy().technical.transpose();
        let back = at.leontief_apply(p0);
        for (b, v) in back.iter().zip(&sim.economy().value_added) {
            assert_relative_eq!(*b, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn initial_capital_matches_buffered_output() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let first = sim.initial().unwrap();
        let econ = sim.economy();
        let expected = econ.capital.mul_vec(&scale(&first.state.output, 1.1));
        for (k, e) in first.state.capital.iter().zip(&expected) {
            assert_relative_eq!(k, e, epsilon = 1e-9);
        }
        let replacement = hadamard(&econ.depreciation, &first.state.capital);
        assert_eq!(first.state.investment, replacement);
        assert_eq!(first.record.period, 0);
        assert_eq!(first.state.debt, 0.0);
    }

    #[test]
    fn step_leaves_previous_state_untouched() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let first = sim.initial().unwrap();
        let before = first.state.clone();
        let next = sim.step(&first.state).unwrap();
        assert_eq!(next.state.period, 1);
        assert_eq!(first.state.capital, before.capital);
        assert_eq!(first.state.planned, before.planned);
        assert_eq!(next.record.date, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
    }

    #[test]
    fn capital_advances_by_depreciation_and_investment() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let first = sim.initial().unwrap();
        let next = sim.step(&first.state).unwrap();
        let econ = sim.economy();
        for s in 0..3 {
            let expected = (1.0 - econ.depreciation[s]) * first.state.capital[s]
                + first.state.investment[s];
            assert_relative_eq!(next.state.capital[s], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn spending_share_deficit_is_tau_of_spending() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let first = sim.initial().unwrap();
        let next = sim.step(&first.state).unwrap();
        let spending = dot(
            sim.base_prices(),
            &add(&next.record.investment, &next.record.government),
        );
        assert_relative_eq!(next.state.debt, 0.05 * spending, epsilon = 1e-9);
    }

    #[test]
    fn output_tax_charges_output() {
        let cfg = PlanConfig {
            fiscal_rule: FiscalRule::OutputTax,
            tau: 0.2,
            ..toy_config()
        };
        let sim = Simulation::new(toy_economy(), cfg).unwrap();
        let first = sim.initial().unwrap();
        let next = sim.step(&first.state).unwrap();
        let p0 = sim.base_prices();
        let taxes = 0.2 * dot(p0, &next.record.output);
        assert_relative_eq!(next.record.taxes, taxes, epsilon = 1e-9);
        assert_relative_eq!(
            next.state.debt,
            dot(p0, &next.record.government) - taxes,
            epsilon = 1e-9
        );
    }

    #[test]
    fn recalibration_keeps_only_trailing_window() {
        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let mut state = sim.initial().unwrap().state;
        state.delta_history = (0..20).map(|i| vec![i as f64; 3]).collect();
        let rec = sim.recalibrate(&mut state).unwrap();
        assert_eq!(rec.observations, 6);
        assert_eq!(state.delta_history.len(), 6);
        assert_eq!(state.delta_history[0], vec![14.0; 3]);
        assert_eq!(state.persistence, rec.persistence);
        let fits = state.calibration.as_ref().unwrap();
        assert_relative_eq!(fits[0].phi, 1.0, epsilon = 1e-9);
        assert_relative_eq!(rec.intercepts[0], 1.0, epsilon = 1e-9);
        assert!(rec.degenerate_sectors.is_empty());
    }

    #[test]
    fn failed_recalibration_leaves_state_intact() {
        let mut sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let mut state = sim.initial().unwrap().state;
        state.delta_history = (0..20).map(|i| vec![i as f64; 3]).collect();
        let persistence = state.persistence.clone();
        sim.economy.technical = Matrix::from_rows(vec![
            vec![0.6, 0.5, 0.0],
            vec![0.5, 0.6, 0.0],
            vec![0.0, 0.0, 0.1],
        ])
        .unwrap();
        assert!(sim.recalibrate(&mut state).is_err());
        assert_eq!(state.delta_history.len(), 20);
        assert_eq!(state.delta_history[0], vec![0.0; 3]);
        assert_eq!(state.persistence, persistence);
        assert!(state.calibration.is_none());
    }

    #[test]
    fn capital_is_floored_with_a_warning() {
        let (capital, floored) = advance_capital(&[10.0, 10.0], &[0.1, 0.1], &[1.0, -12.0]);
        assert_eq!(capital[0], 10.0);
        assert_eq!(capital[1], 0.0);
        assert_eq!(floored.len(), 1);
        assert_eq!(floored[0].0, 1);
        assert_relative_eq!(floored[0].1, 3.0, epsilon = 1e-12);

        let sim = Simulation::new(toy_economy(), toy_config()).unwrap();
        let mut state = sim.initial().unwrap().state;
        state.investment[2] = -1e4;
        let next = sim.step(&state).unwrap();
        assert_eq!(next.state.capital[2], 0.0);
        assert!(next.warnings.iter().any(|w| matches!(
            w,
            SimWarning::CapitalFloored {
                period: 1,
                sector: 2,
                ..
            }
        )));
    }

    #[test]
    fn capacity_tolerance_is_absolute() {
        let capital = [1e6, 10.0];
        let tolerance = 1e-6;
        // a relative margin would let 1e6 + 0.5 through
        let flagged = over_capacity(&[1e6 + 0.5, 10.0], &capital, tolerance);
        assert_eq!(flagged, vec![(0, 1e6 + 0.5, 1e6)]);
        let within = over_capacity(&[1e6, 10.0 + 5e-7], &capital, tolerance);
        assert!(within.is_empty());
    }

    #[test]
    fn rescale_meets_growth_target() {
        let cfg = PlanConfig {
            rescale_to_growth_target: true,
            ..toy_config()
        };
        let sim = Simulation::new(toy_economy(), cfg).unwrap();
        let mut state = sim.initial().unwrap().state;
        state.period = 11;
        state.planned_next = scale(&state.planned_next, 0.5);
        let rec = sim.recalibrate(&mut state).unwrap();
        let factor = rec.rescale_factor.unwrap();
        assert_relative_eq!(factor, 2.0 * (1.0 + sim.growth).powi(12), epsilon = 1e-9);
        assert_relative_eq!(
            dot(sim.base_prices(), &state.planned_next),
            100.0 * (1.0 + sim.growth).powi(12),
            epsilon = 1e-9
        );
    }

    #[test]
    fn period_dates_follow_months() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(period_date(start, 1), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(period_date(start, 12), NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
    }
}
