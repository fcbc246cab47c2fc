//! Excess demand, price updates and the planned-consumption feedback loop.

use plan_core::{all_finite, PriceAdjustment};
use serde::{Deserialize, Serialize};

use crate::EconError;

/// Excess demand per sector: `ED = C_0 − C_p`.
///
/// With output solved exactly, aggregate demand at base prices minus net
/// output reduces to the gap between what households would buy at base
/// prices and what the plan provided.
pub fn excess_demand(base_consumption: &[f64], planned: &[f64]) -> Vec<f64> {
    base_consumption
        .iter()
        .zip(planned)
        .map(|(c0, cp)| c0 - cp)
        .collect()
}

/// Turns excess demand into price moves and price moves into plan corrections.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedbackCorrector {
    elasticity: f64,
    adjustment: PriceAdjustment,
}

impl PriceFeedbackCorrector {
    pub fn new(elasticity: f64, adjustment: PriceAdjustment) -> Result<Self, EconError> {
        if !elasticity.is_finite() || elasticity == 0.0 {
            return Err(EconError::NonFinite("price elasticity"));
        }
        Ok(Self {
            elasticity,
            adjustment,
        })
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    pub fn adjustment(&self) -> PriceAdjustment {
        self.adjustment
    }

    /// Price deviation `ΔP` from base prices for the observed excess demand.
    ///
    /// Linear: `ΔP = P0·(−ED / (ε·C_0))`. Log-linear:
    /// `ΔP = P0·(exp(−ED / (ε·C_0)) − 1)`, which keeps prices positive.
    /// Sectors with no base consumption get `ΔP = 0`.
    pub fn price_deviation(
        &self,
        excess: &[f64],
        base_consumption: &[f64],
        p0: &[f64],
    ) -> Result<Vec<f64>, EconError> {
        check_len("base_consumption", base_consumption.len(), excess.len())?;
        check_len("p0", p0.len(), excess.len())?;
        let dp: Vec<f64> = excess
            .iter()
            .zip(base_consumption)
            .zip(p0)
            .map(|((ed, c0), p)| {
                if *c0 == 0.0 {
                    return 0.0;
                }
                let ratio = -ed / (self.elasticity * c0);
                match self.adjustment {
                    PriceAdjustment::Linear => p * ratio,
                    PriceAdjustment::LogLinear => p * ratio.exp_m1(),
                }
            })
            .collect();
        if !all_finite(&dp) {
            return Err(EconError::NonFinite("price deviation"));
        }
        Ok(dp)
    }

    /// `C_p(t) = C_p(t−1) − C_p(t−1)·ε·ΔP(t−1)/P0`.
    pub fn update_planned_consumption(
        &self,
        planned_prev: &[f64],
        price_deviation_prev: &[f64],
        p0: &[f64],
    ) -> Result<Vec<f64>, EconError> {
        update_planned_consumption(planned_prev, price_deviation_prev, p0, self.elasticity)
    }
}

/// Free-function form of [`PriceFeedbackCorrector::update_planned_consumption`]
/// for callers holding the elasticity directly.
pub fn update_planned_consumption(
    planned_prev: &[f64],
    price_deviation_prev: &[f64],
    p0: &[f64],
    elasticity: f64,
) -> Result<Vec<f64>, EconError> {
    check_len("price_deviation", price_deviation_prev.len(), planned_prev.len())?;
    check_len("p0", p0.len(), planned_prev.len())?;
    let next: Vec<f64> = planned_prev
        .iter()
        .zip(price_deviation_prev)
        .zip(p0)
        .map(|((cp, dp), p)| {
            if *p == 0.0 {
                *cp
            } else {
                cp - cp * (elasticity * dp / p)
            }
        })
        .collect();
    if !all_finite(&next) {
        return Err(EconError::NonFinite("planned consumption"));
    }
    Ok(next)
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<(), EconError> {
    if len != expected {
        return Err(EconError::DimensionMismatch(format!(
            "{name} has {len} entries, expected {expected}"
        )));
    }
    Ok(())
}
