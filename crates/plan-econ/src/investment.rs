//! Capital build-out and realized investment.

use plan_core::{add, all_finite, hadamard, scale, InvestmentRule, Matrix};
use serde::{Deserialize, Serialize};

use crate::{EconError, NeumannSolver};

/// Investment decided for one period, by component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPlan {
    /// `ΔK_expected`: capital needed for forecast demand growth.
    pub expected: Vec<f64>,
    /// `ΔK_unexpected`: spare capital netted against the expected build-out.
    pub unexpected: Vec<f64>,
    /// `δ·K(t)`: replacement of depreciated capital.
    pub replacement: Vec<f64>,
    /// `I(t)`, after the negative-investment rule.
    pub investment: Vec<f64>,
    /// Sectors whose planned investment was negative before any clamping.
    pub disinvesting: Vec<usize>,
}

/// Spare capital after the buffer share `b` and the expected requirement:
/// `K_u = (1 − b)·K − K_e`.
pub fn unutilized_capital(capital_stock: &[f64], buffer: f64, expected_need: &[f64]) -> Vec<f64> {
    capital_stock
        .iter()
        .zip(expected_need)
        .map(|(k, need)| (1.0 - buffer) * k - need)
        .collect()
}

/// Applies the nested Leontief solve to turn demand forecasts into a
/// capital and investment plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapitalInvestmentPlanner {
    solver: NeumannSolver,
    capital: Matrix,
    depreciation: Vec<f64>,
    k: usize,
    rule: InvestmentRule,
}

impl CapitalInvestmentPlanner {
    pub fn new(
        solver: NeumannSolver,
        capital: Matrix,
        depreciation: Vec<f64>,
        k: usize,
        rule: InvestmentRule,
    ) -> Result<Self, EconError> {
        let n = solver.matrix().rows();
        if capital.rows() != n || capital.cols() != n || depreciation.len() != n {
            return Err(EconError::DimensionMismatch(format!(
                "planner needs {n}x{n} capital coefficients and {n} depreciation rates"
            )));
        }
        if k == 0 {
            return Err(EconError::InvalidIterations);
        }
        Ok(Self {
            solver,
            capital,
            depreciation,
            k,
            rule,
        })
    }

    /// `ΔK_expected = B·solve(A, Δc + g·G + B·solve(A, Δ²c + g²·G))`.
    ///
    /// The inner solve is the output required to build the capital that the
    /// outer solve says growth will need.
    pub fn expected_capital(
        &self,
        delta: &[f64],
        delta2: &[f64],
        government: &[f64],
        g: f64,
    ) -> Result<Vec<f64>, EconError> {
        let inner_demand = add(delta2, &scale(government, g * g));
        let inner = self.solver.solve(&inner_demand, self.k)?;
        let outer_demand = add(
            &add(delta, &scale(government, g)),
            &self.capital.mul_vec(&inner.x),
        );
        let outer = self.solver.solve(&outer_demand, self.k)?;
        Ok(self.capital.mul_vec(&outer.x))
    }

    /// Plan `I(t) = ΔK_expected + ΔK_unexpected + δ·K(t)`.
    ///
    /// `unutilized` is spare capital `K_u(t)`. Under
    /// [`InvestmentRule::SpareFirst`] `ΔK_unexpected = −min(ΔK_expected, K_u)`,
    /// so spare capital is used before new capital is built and a shortfall
    /// is made up on top of the expected need. The full-gap rules use
    /// `ΔK_unexpected = −K_u`.
    pub fn plan_investment(
        &self,
        delta: &[f64],
        delta2: &[f64],
        capital_stock: &[f64],
        unutilized: &[f64],
        government: &[f64],
        g: f64,
    ) -> Result<InvestmentPlan, EconError> {
        let n = self.depreciation.len();
        for (name, len) in [
            ("delta", delta.len()),
            ("delta2", delta2.len()),
            ("capital_stock", capital_stock.len()),
            ("unutilized", unutilized.len()),
            ("government", government.len()),
        ] {
            if len != n {
                return Err(EconError::DimensionMismatch(format!(
                    "{name} has {len} entries, expected {n}"
                )));
            }
        }

        let expected = self.expected_capital(delta, delta2, government, g)?;
        let unexpected: Vec<f64> = match self.rule {
            InvestmentRule::SpareFirst => expected
                .iter()
                .zip(unutilized)
                .map(|(e, u)| -e.min(*u))
                .collect(),
            InvestmentRule::FullGap | InvestmentRule::FullGapClamped => {
                unutilized.iter().map(|u| -u).collect()
            }
        };
        let replacement = hadamard(&self.depreciation, capital_stock);
        let raw = add(&add(&expected, &unexpected), &replacement);
        if !all_finite(&raw) {
            return Err(EconError::NonFinite("planned investment"));
        }

        let disinvesting: Vec<usize> = raw
            .iter()
            .enumerate()
            .filter(|(_, &i)| i < 0.0)
            .map(|(s, _)| s)
            .collect();
        let investment = match self.rule {
            InvestmentRule::FullGapClamped => raw.into_iter().map(|i| i.max(0.0)).collect(),
            InvestmentRule::SpareFirst | InvestmentRule::FullGap => raw,
        };

        Ok(InvestmentPlan {
            expected,
            unexpected,
            replacement,
            investment,
            disinvesting,
        })
    }
}
