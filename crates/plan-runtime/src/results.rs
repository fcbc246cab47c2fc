//! Aggregate series and summary scalars, valued at base prices.

use chrono::NaiveDate;
use plan_core::dot;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{PeriodRecord, SimulationOutput};

/// One row of the aggregate report. Values are `P0`-weighted sums.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatePoint {
    pub period: usize,
    pub date: NaiveDate,
    pub warm_up: bool,
    pub gdp_real: f64,
    pub capacity: f64,
    pub output_gap_pct: f64,
    pub capacity_utilization_pct: f64,
    pub consumption: f64,
    pub planned_consumption: f64,
    pub investment: f64,
    pub government: f64,
    pub aggregate_demand: f64,
    /// Plan-weighted price index, `Σ P·C_p / Σ P0·C_p`.
    pub price_index: f64,
    pub debt: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean_absolute_output_gap_pct: f64,
    pub mean_excess_demand_pct: f64,
    pub mean_capacity_utilization_pct: f64,
    pub annualized_growth_pct: f64,
    /// Final debt over annualized final-period GDP.
    pub debt_to_gdp_pct: f64,
    pub planning_periods: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub series: Vec<AggregatePoint>,
    pub summary: Summary,
}

impl SimulationResults {
    /// Rows after the warm-up window.
    pub fn planning_series(&self) -> impl Iterator<Item = &AggregatePoint> {
        self.series.iter().filter(|p| !p.warm_up)
    }
}

/// Value one period's snapshot at base prices.
pub fn aggregate(record: &PeriodRecord, p0: &[f64]) -> AggregatePoint {
    let gdp_real = dot(p0, &record.final_demand);
    let capacity = dot(p0, &record.capacity_final_demand);
    let planned_consumption = dot(p0, &record.planned);
    let plan_at_prices = dot(&record.prices, &record.planned);
    AggregatePoint {
        period: record.period,
        date: record.date,
        warm_up: record.warm_up,
        gdp_real,
        capacity,
        output_gap_pct: 100.0 * (gdp_real - capacity) / capacity,
        capacity_utilization_pct: 100.0 * gdp_real / capacity,
        consumption: dot(p0, &record.consumption),
        planned_consumption,
        investment: dot(p0, &record.investment),
        government: dot(p0, &record.government),
        aggregate_demand: dot(p0, &record.aggregate_demand),
        price_index: if planned_consumption != 0.0 {
            plan_at_prices / planned_consumption
        } else {
            1.0
        },
        debt: record.debt,
    }
}

/// Series for every period plus summary scalars over the planning periods.
///
/// Growth compares the last period with period zero over the whole run.
pub fn compute_results(output: &SimulationOutput) -> SimulationResults {
    let series: Vec<AggregatePoint> = output
        .records
        .iter()
        .map(|r| aggregate(r, &output.base_prices))
        .collect();
    let summary = summarize(&series);
    info!(
        mean_absolute_output_gap_pct = summary.mean_absolute_output_gap_pct,
        mean_excess_demand_pct = summary.mean_excess_demand_pct,
        mean_capacity_utilization_pct = summary.mean_capacity_utilization_pct,
        annualized_growth_pct = summary.annualized_growth_pct,
        debt_to_gdp_pct = summary.debt_to_gdp_pct,
        "summary"
    );
    SimulationResults { series, summary }
}

fn summarize(series: &[AggregatePoint]) -> Summary {
    let planning: Vec<&AggregatePoint> = series.iter().filter(|p| !p.warm_up).collect();
    let (annualized_growth_pct, debt_to_gdp_pct) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => {
            let years = series.len() as f64 / 12.0;
            let growth = (last.gdp_real / first.gdp_real).powf(1.0 / years) - 1.0;
            (100.0 * growth, 100.0 * last.debt / (12.0 * last.gdp_real))
        }
        _ => (f64::NAN, f64::NAN),
    };

    Summary {
        mean_absolute_output_gap_pct: mean(&planning, |p| p.output_gap_pct.abs()),
        mean_excess_demand_pct: mean(&planning, |p| {
            100.0 * (p.consumption - p.planned_consumption) / p.consumption
        }),
        mean_capacity_utilization_pct: mean(&planning, |p| p.capacity_utilization_pct),
        annualized_growth_pct,
        debt_to_gdp_pct,
        planning_periods: planning.len(),
    }
}

fn mean(points: &[&AggregatePoint], f: impl Fn(&AggregatePoint) -> f64) -> f64 {
    if points.is_empty() {
        return f64::NAN;
    }
    points.iter().map(|&p| f(p)).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn point(period: usize, gdp: f64, capacity: f64, warm_up: bool) -> AggregatePoint {
        AggregatePoint {
            period,
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            warm_up,
            gdp_real: gdp,
            capacity,
            output_gap_pct: 100.0 * (gdp - capacity) / capacity,
            capacity_utilization_pct: 100.0 * gdp / capacity,
            consumption: 10.0,
            planned_consumption: 9.0,
            investment: 0.0,
            government: 0.0,
            aggregate_demand: 0.0,
            price_index: 1.0,
            debt: 12.0,
        }
    }

    #[test]
    fn summary_skips_warm_up() {
        let series = vec![
            point(0, 100.0, 50.0, true),
            point(1, 100.0, 100.0, false),
            point(2, 90.0, 100.0, false),
        ];
        let s = summarize(&series);
        assert_eq!(s.planning_periods, 2);
        assert_relative_eq!(s.mean_absolute_output_gap_pct, 5.0, epsilon = 1e-12);
        assert_relative_eq!(s.mean_capacity_utilization_pct, 95.0, epsilon = 1e-12);
        assert_relative_eq!(s.mean_excess_demand_pct, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn growth_is_annualized_over_the_run() {
        let mut series: Vec<AggregatePoint> =
            (0..24).map(|t| point(t, 100.0, 100.0, false)).collect();
        series[23].gdp_real = 121.0;
        let s = summarize(&series);
        assert_relative_eq!(s.annualized_growth_pct, 10.0, epsilon = 1e-9);
        assert_relative_eq!(s.debt_to_gdp_pct, 100.0 * 12.0 / (12.0 * 121.0), epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn mean_gap_bounds_utilization(
            rows in proptest::collection::vec((1.0f64..200.0, 1.0f64..200.0), 1..30)
        ) {
            let series: Vec<AggregatePoint> = rows
                .iter()
                .enumerate()
                .map(|(t, &(gdp, cap))| point(t, gdp, cap, false))
                .collect();
            let s = summarize(&series);
            let drift = (s.mean_capacity_utilization_pct - 100.0).abs();
            prop_assert!(s.mean_absolute_output_gap_pct + 1e-9 >= drift);
            prop_assert_eq!(s.planning_periods, rows.len());
        }
    }
}
