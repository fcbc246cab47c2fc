//! Per-sector AR(1) forecasts of planned-consumption deltas.
//!
//! The model is `Δc(t) = ρ·Δc(t−1) + c + ε(t)`, fitted by closed-form
//! ordinary least squares over a trailing window. The same model is fitted
//! independently to the second differences `Δ²c`.
//!
//! Between recalibrations the first-difference parameters can be held fixed
//! at the last annual estimate ([`extrapolate_calibrated`]); the
//! second-difference model is always refitted over the current window.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Settings shared by every fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastSettings {
    /// Window length `W`.
    pub window: usize,
    /// Fit an intercept `c` alongside `ρ`.
    pub intercept: bool,
    /// Regressor variance, relative to the regressor's mean square, at or
    /// below which the fit is degenerate.
    pub min_variance: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            window: 12,
            intercept: true,
            min_variance: 1e-12,
        }
    }
}

/// Why a fit fell back to the naive forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degeneracy {
    /// Fewer than two `(x, y)` pairs.
    TooFewPoints,
    /// The regressor does not vary.
    ZeroVariance,
}

/// AR(1) estimate for one sector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArFit {
    /// Persistence `ρ`.
    pub phi: f64,
    pub intercept: f64,
    /// Residual standard deviation (ddof = 1).
    pub sigma: f64,
    /// Regressor variance the fit was taken on.
    pub variance: f64,
    pub degenerate: Option<Degeneracy>,
}

impl ArFit {
    fn fallback(reason: Degeneracy, variance: f64) -> Self {
        Self {
            phi: 0.0,
            intercept: 0.0,
            sigma: 0.0,
            variance,
            degenerate: Some(reason),
        }
    }

    /// One-step prediction from the last observation. Degenerate fits
    /// return the last observation unchanged.
    pub fn predict(&self, last: f64) -> f64 {
        if self.degenerate.is_some() {
            last
        } else {
            self.phi * last + self.intercept
        }
    }
}

/// Closed-form OLS of `y(t+1)` on `y(t)` over `series`.
///
/// The fit is degenerate when the regressor variance does not exceed
/// `min_variance` times the regressor's mean square, so the threshold
/// follows the scale of the series.
pub fn fit_ar1(series: &[f64], intercept: bool, min_variance: f64) -> ArFit {
    if series.len() < 3 {
        return ArFit::fallback(Degeneracy::TooFewPoints, 0.0);
    }
    let x = &series[..series.len() - 1];
    let y = &series[1..];
    let n = x.len() as f64;
    let threshold = min_variance * x.iter().map(|xi| xi * xi).sum::<f64>() / n;

    let (phi, c, variance) = if intercept {
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
        let sxy: f64 = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
            .sum();
        let variance = sxx / n;
        if !(variance > threshold) {
            return ArFit::fallback(Degeneracy::ZeroVariance, variance);
        }
        let phi = sxy / sxx;
        (phi, mean_y - phi * mean_x, variance)
    } else {
        let sxx: f64 = x.iter().map(|xi| xi * xi).sum();
        let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| xi * yi).sum();
        let variance = sxx / n;
        if !(variance > threshold) {
            return ArFit::fallback(Degeneracy::ZeroVariance, variance);
        }
        (sxy / sxx, 0.0, variance)
    };

    let ssr: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - (phi * xi + c)).powi(2))
        .sum();
    let sigma = if n > 1.0 { (ssr / (n - 1.0)).sqrt() } else { 0.0 };
    ArFit {
        phi,
        intercept: c,
        sigma,
        variance,
        degenerate: None,
    }
}

/// A degenerate fit, reported to the caller for logging.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DegenerateFit {
    pub sector: usize,
    /// True for the second-difference model.
    pub second_difference: bool,
    pub reason: Degeneracy,
    pub variance: f64,
}

/// Forecast for the next period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// `Δ̂c(t+1)`
    pub delta: Vec<f64>,
    /// `Δ̂²c(t+1)`
    pub delta2: Vec<f64>,
    /// Persistence of the first-difference model per sector.
    pub rho: Vec<f64>,
    /// True while the window is still filling.
    pub warming_up: bool,
    pub degenerate: Vec<DegenerateFit>,
}

/// Fit per-sector AR(1) models over `history_window` (oldest first) and
/// extrapolate one step ahead.
///
/// While the window holds fewer than `settings.window` observations the
/// forecast is `persistence_guess · Δc(t)` with a zero second difference.
pub fn fit_and_extrapolate(
    history_window: &[Vec<f64>],
    persistence_guess: &[f64],
    settings: &ForecastSettings,
) -> Forecast {
    extrapolate(history_window, persistence_guess, None, settings)
}

/// As [`fit_and_extrapolate`], with the first-difference model fixed to
/// `calibration` instead of refitted. A degenerate calibrated fit forecasts
/// the last observed delta.
pub fn extrapolate_calibrated(
    history_window: &[Vec<f64>],
    calibration: &[ArFit],
    settings: &ForecastSettings,
) -> Forecast {
    let guess: Vec<f64> = calibration.iter().map(|fit| fit.phi).collect();
    extrapolate(history_window, &guess, Some(calibration), settings)
}

fn extrapolate(
    history_window: &[Vec<f64>],
    persistence_guess: &[f64],
    calibration: Option<&[ArFit]>,
    settings: &ForecastSettings,
) -> Forecast {
    let n = persistence_guess.len();
    let Some(last) = history_window.last() else {
        return Forecast {
            delta: vec![0.0; n],
            delta2: vec![0.0; n],
            rho: persistence_guess.to_vec(),
            warming_up: true,
            degenerate: Vec::new(),
        };
    };

    if history_window.len() < settings.window {
        return Forecast {
            delta: last
                .iter()
                .zip(persistence_guess)
                .map(|(d, rho)| rho * d)
                .collect(),
            delta2: vec![0.0; n],
            rho: persistence_guess.to_vec(),
            warming_up: true,
            degenerate: Vec::new(),
        };
    }

    let mut delta = Vec::with_capacity(n);
    let mut delta2 = Vec::with_capacity(n);
    let mut rho = Vec::with_capacity(n);
    let mut degenerate = Vec::new();
    for sector in 0..n {
        let series: Vec<f64> = history_window.iter().map(|v| v[sector]).collect();
        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

        let fit = match calibration {
            Some(fits) => fits[sector],
            None => {
                let fit = fit_ar1(&series, settings.intercept, settings.min_variance);
                if let Some(reason) = fit.degenerate {
                    degenerate.push(DegenerateFit {
                        sector,
                        second_difference: false,
                        reason,
                        variance: fit.variance,
                    });
                }
                fit
            }
        };
        delta.push(fit.predict(series[series.len() - 1]));
        rho.push(fit.phi);

        let fit2 = fit_ar1(&diffs, settings.intercept, settings.min_variance);
        if let Some(reason) = fit2.degenerate {
            degenerate.push(DegenerateFit {
                sector,
                second_difference: true,
                reason,
                variance: fit2.variance,
            });
        }
        delta2.push(diffs.last().map_or(0.0, |&d| fit2.predict(d)));
    }

    Forecast {
        delta,
        delta2,
        rho,
        warming_up: false,
        degenerate,
    }
}

/// Re-estimate per-sector AR(1) fits from the trailing `span` observations
/// of `history`, ignoring everything older.
pub fn recalibrate_fits(
    history: &[Vec<f64>],
    span: usize,
    settings: &ForecastSettings,
) -> Vec<ArFit> {
    let start = history.len().saturating_sub(span);
    let trailing = &history[start..];
    let n = trailing.first().map_or(0, Vec::len);
    (0..n)
        .map(|sector| {
            let series: Vec<f64> = trailing.iter().map(|v| v[sector]).collect();
            fit_ar1(&series, settings.intercept, settings.min_variance)
        })
        .collect()
}

/// Persistence `ρ` of [`recalibrate_fits`].
pub fn recalibrate_persistence(
    history: &[Vec<f64>],
    span: usize,
    settings: &ForecastSettings,
) -> Vec<f64> {
    recalibrate_fits(history, span, settings)
        .iter()
        .map(|fit| fit.phi)
        .collect()
}

/// Rolling window of consumption deltas owned by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemandForecaster {
    settings: ForecastSettings,
    window: VecDeque<Vec<f64>>,
}

impl DemandForecaster {
    pub fn new(settings: ForecastSettings) -> Self {
        Self {
            window: VecDeque::with_capacity(settings.window),
            settings,
        }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    /// Append the newest delta, dropping the oldest once the window is full.
    pub fn observe(&mut self, delta: Vec<f64>) {
        if self.window.len() == self.settings.window {
            self.window.pop_front();
        }
        self.window.push_back(delta);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window contents, oldest first.
    pub fn history(&self) -> Vec<Vec<f64>> {
        self.window.iter().cloned().collect()
    }

    /// Refit over the current window and forecast one step ahead.
    pub fn forecast(&self, persistence_guess: &[f64]) -> Forecast {
        let window: Vec<Vec<f64>> = self.history();
        fit_and_extrapolate(&window, persistence_guess, &self.settings)
    }

    /// Forecast with the first-difference model held at `calibration`.
    pub fn forecast_calibrated(&self, calibration: &[ArFit]) -> Forecast {
        let window: Vec<Vec<f64>> = self.history();
        extrapolate_calibrated(&window, calibration, &self.settings)
    }
}
