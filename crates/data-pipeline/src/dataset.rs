//! Input–output tables read from JSON or YAML files.

use std::path::Path;

use anyhow::{bail, Context, Result};
use plan_core::{FinalDemandTable, IoTables, Matrix};
use serde::{Deserialize, Serialize};
use tracing::info;

fn one() -> f64 {
    1.0
}

/// Tables as published: value added is an absolute amount per sector, not
/// a share of output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    /// Technical coefficients `A`, row `i` column `j`.
    pub technical: Vec<Vec<f64>>,
    pub value_added: Vec<f64>,
    pub consumption: Vec<f64>,
    #[serde(default)]
    pub investment: Vec<f64>,
    pub government: Vec<f64>,
    pub total_output: Vec<f64>,
    /// Multiplier applied to every monetary column (e.g. `1e6` for tables
    /// published in millions).
    #[serde(default = "one")]
    pub unit: f64,
}

impl RawDataset {
    /// Read a dataset, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let raw: RawDataset = match ext.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse YAML dataset {}", path.display()))?,
            _ => serde_json::from_str(&text)
                .with_context(|| format!("failed to parse JSON dataset {}", path.display()))?,
        };
        info!(
            path = %path.display(),
            sectors = raw.value_added.len(),
            "dataset loaded"
        );
        Ok(raw)
    }

    pub fn sectors(&self) -> usize {
        self.value_added.len()
    }

    /// Scale monetary columns and convert value added to per-unit shares.
    pub fn into_tables(self) -> Result<IoTables> {
        let n = self.sectors();
        if !(self.unit > 0.0 && self.unit.is_finite()) {
            bail!("dataset unit must be positive, got {}", self.unit);
        }
        let investment = if self.investment.is_empty() {
            vec![0.0; n]
        } else {
            self.investment
        };
        for (name, len) in [
            ("technical", self.technical.len()),
            ("consumption", self.consumption.len()),
            ("investment", investment.len()),
            ("government", self.government.len()),
            ("total_output", self.total_output.len()),
        ] {
            if len != n {
                bail!("{name} has {len} sectors, expected {n}");
            }
        }
        let technical = Matrix::from_rows(self.technical).context("technical coefficients")?;
        let unit = self.unit;
        let scaled = |v: Vec<f64>| -> Vec<f64> { v.into_iter().map(|x| x * unit).collect() };
        let total_output = scaled(self.total_output);
        let value_added = value_added_per_unit(&scaled(self.value_added), &total_output);
        Ok(IoTables {
            technical,
            value_added,
            demand: FinalDemandTable {
                consumption: scaled(self.consumption),
                investment: scaled(investment),
                government: scaled(self.government),
                total_output,
            },
        })
    }
}

/// Value added per unit of output, `v_i = VA_i / x_i`. Sectors without
/// output (or with non-finite ratios) get zero.
pub fn value_added_per_unit(value_added: &[f64], total_output: &[f64]) -> Vec<f64> {
    value_added
        .iter()
        .zip(total_output)
        .map(|(va, x)| {
            let v = va / x;
            if v.is_finite() {
                v
            } else {
                0.0
            }
        })
        .collect()
}

/// Load and convert in one step.
pub fn load_tables(path: &Path) -> Result<IoTables> {
    RawDataset::load(path)?
        .into_tables()
        .with_context(|| format!("invalid dataset {}", path.display()))
}
