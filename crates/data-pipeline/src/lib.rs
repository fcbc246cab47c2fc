#![deny(warnings)]

//! Data loading for the planning simulator.
//!
//! Reads input–output tables from JSON or YAML, derives per-unit value
//! added, draws the per-sector parameters that published tables lack, and
//! assembles a validated [`plan_core::Economy`]. When no dataset is
//! configured a seeded synthetic economy is generated instead.

use anyhow::{Context, Result};
use plan_core::{Economy, IoTables, PlanConfig};
use tracing::info;

mod dataset;
mod synthetic;

pub use dataset::{load_tables, value_added_per_unit, RawDataset};
pub use synthetic::{sector_profile, synthetic_tables, SectorProfile};

/// Tables from `cfg.dataset`, or a synthetic economy when none is set.
pub fn load_or_generate(cfg: &PlanConfig) -> Result<IoTables> {
    match &cfg.dataset {
        Some(path) => load_tables(path),
        None => {
            info!(sectors = cfg.n, seed = cfg.random_seed, "generating synthetic economy");
            Ok(synthetic_tables(cfg))
        }
    }
}

/// Validated economy for `cfg`: tables plus the sector profile.
pub fn build_economy(cfg: &PlanConfig) -> Result<Economy> {
    let tables = load_or_generate(cfg)?;
    economy_from_tables(tables, cfg)
}

/// Combine already-loaded tables with the configured sector profile.
pub fn economy_from_tables(tables: IoTables, cfg: &PlanConfig) -> Result<Economy> {
    let profile = sector_profile(cfg)?;
    let economy = Economy::new(tables, profile.capital, profile.depreciation, profile.trend)
        .context("input data failed validation")?;
    economy
        .check_config(cfg)
        .context("input data does not match the configuration")?;
    info!(
        sectors = economy.sectors(),
        spectral_radius = economy.spectral_radius,
        "economy ready"
    );
    Ok(economy)
}
