#![deny(warnings)]

//! Run artifacts: report tables, diagnostics and post-mortem snapshots.
//!
//! Everything here writes into a single output directory. Tabular reports
//! are plain CSV (and optionally Parquet), diagnostics are JSON, and the
//! simulation state is stored with `bincode` so a failed run can be
//! resumed or inspected later.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plan_core::ReportConfig;
use plan_econ::ConvergenceReport;
use plan_runtime::{SimWarning, SimulationOutput, SimulationResults};
use serde::Serialize;
use tracing::info;

mod columnar;
mod snapshot;
mod table;

pub use columnar::{aggregate_schema, write_aggregate_parquet};
pub use snapshot::{read_snapshot, snapshot_path, write_failure, write_snapshot, FailureNote};
pub use table::{write_aggregate_csv, write_summary_csv, AGGREGATE_COLUMNS};

pub const AGGREGATE_CSV: &str = "aggregate_results.csv";
pub const AGGREGATE_PARQUET: &str = "aggregate_results.parquet";
pub const SUMMARY_CSV: &str = "summary_statistics.csv";
pub const CONVERGENCE_JSON: &str = "convergence.json";
pub const WARNINGS_JSON: &str = "warnings.json";

/// Write every report enabled in `report` and return the paths created.
///
/// JSON diagnostics are always written; `save_csv` and `save_parquet`
/// switch the tabular outputs.
pub fn write_reports(
    report: &ReportConfig,
    output: &SimulationOutput,
    results: &SimulationResults,
    convergence: &ConvergenceReport,
) -> Result<Vec<PathBuf>> {
    let dir = report.output_dir.as_path();
    ensure_dir(dir)?;
    let mut written = Vec::new();

    if report.save_csv {
        let path = dir.join(AGGREGATE_CSV);
        write_aggregate_csv(&path, results)?;
        written.push(path);
        let path = dir.join(SUMMARY_CSV);
        write_summary_csv(&path, &results.summary)?;
        written.push(path);
    }
    if report.save_parquet {
        let path = dir.join(AGGREGATE_PARQUET);
        write_aggregate_parquet(&path, results)?;
        written.push(path);
    }

    let path = dir.join(CONVERGENCE_JSON);
    write_json(&path, convergence)?;
    written.push(path);
    let path = dir.join(WARNINGS_JSON);
    write_warnings(&path, &output.warnings)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "reports written");
    Ok(written)
}

/// Run warnings in period order.
pub fn write_warnings(path: &Path, warnings: &[SimWarning]) -> Result<()> {
    let mut sorted: Vec<&SimWarning> = warnings.iter().collect();
    sorted.sort_by_key(|w| w.period());
    write_json(path, &sorted)
}

/// Pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))
}

pub(crate) fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use plan_core::InvestmentRule;

    #[test]
    fn warnings_are_sorted_by_period() {
        let path = fixtures::scratch("warnings").join(WARNINGS_JSON);
        let warnings = vec![
            SimWarning::Disinvestment {
                period: 9,
                sector: 1,
                amount: -3.0,
            },
            SimWarning::CapacityExceeded {
                period: 2,
                sector: 0,
                required: 12.0,
                available: 10.0,
            },
        ];
        write_warnings(&path, &warnings).unwrap();
        let parsed: Vec<SimWarning> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].period(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kind\": \"capacity_exceeded\""));
    }

    #[test]
    fn run_disinvestment_lands_in_warnings_json() {
        let out = fixtures::simulation(0.05, InvestmentRule::FullGap)
            .run()
            .unwrap();
        let path = fixtures::scratch("warnings-run").join(WARNINGS_JSON);
        write_warnings(&path, &out.warnings).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kind\": \"disinvestment\""));
        let parsed: Vec<SimWarning> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), out.warnings.len());
        let sectors: Vec<usize> = parsed
            .iter()
            .filter_map(|w| match w {
                SimWarning::Disinvestment {
                    period: 1, sector, ..
                } => Some(*sector),
                _ => None,
            })
            .collect();
        assert_eq!(sectors, vec![0, 1]);
        assert!(parsed.windows(2).all(|w| w[0].period() <= w[1].period()));
    }

    #[test]
    fn json_write_reports_unwritable_path() {
        let file = fixtures::scratch("blocked").join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = write_json(&file.join("convergence.json"), &1.0).unwrap_err();
        assert!(format!("{err:#}").contains("not-a-dir"));
    }
}
