//! CSV report tables.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use plan_runtime::{AggregatePoint, SimulationResults, Summary};

use crate::create;

/// Header of `aggregate_results.csv`, also the Parquet column order.
pub const AGGREGATE_COLUMNS: [&str; 13] = [
    "period",
    "date",
    "gdp_real",
    "capacity",
    "output_gap_pct",
    "capacity_utilization_pct",
    "consumption",
    "planned_consumption",
    "investment",
    "government",
    "aggregate_demand",
    "price_index",
    "debt",
];

/// One row per planning period; warm-up rows are left out.
pub fn write_aggregate_csv(path: &Path, results: &SimulationResults) -> Result<()> {
    let mut out = BufWriter::new(create(path)?);
    let rows = results.planning_series().count();
    write_rows(&mut out, results.planning_series())
        .and_then(|_| out.flush())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows, "aggregate table written");
    Ok(())
}

fn write_rows<'a, W: Write>(
    out: &mut W,
    points: impl Iterator<Item = &'a AggregatePoint>,
) -> std::io::Result<()> {
    writeln!(out, "{}", AGGREGATE_COLUMNS.join(","))?;
    for p in points {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            p.period,
            p.date.format("%Y-%m"),
            p.gdp_real,
            p.capacity,
            p.output_gap_pct,
            p.capacity_utilization_pct,
            p.consumption,
            p.planned_consumption,
            p.investment,
            p.government,
            p.aggregate_demand,
            p.price_index,
            p.debt,
        )?;
    }
    Ok(())
}

/// Two-column `metric,value` table of the summary scalars.
pub fn write_summary_csv(path: &Path, summary: &Summary) -> Result<()> {
    let rows: [(&str, f64); 6] = [
        ("mean_absolute_output_gap_pct", summary.mean_absolute_output_gap_pct),
        ("mean_excess_demand_pct", summary.mean_excess_demand_pct),
        ("mean_capacity_utilization_pct", summary.mean_capacity_utilization_pct),
        ("annualized_growth_pct", summary.annualized_growth_pct),
        ("debt_to_gdp_pct", summary.debt_to_gdp_pct),
        ("planning_periods", summary.planning_periods as f64),
    ];
    let mut out = BufWriter::new(create(path)?);
    write_metrics(&mut out, &rows)
        .and_then(|_| out.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn write_metrics<W: Write>(out: &mut W, rows: &[(&str, f64)]) -> std::io::Result<()> {
    writeln!(out, "metric,value")?;
    for (name, value) in rows {
        writeln!(out, "{name},{value}")?;
    }
    Ok(())
}
