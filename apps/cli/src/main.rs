#![deny(warnings)]

//! Headless runner: load a configuration, simulate the plan, write reports.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use plan_core::PlanConfig;
use plan_econ::convergence_test;
use plan_runtime::{compute_results, Simulation};
use tracing::{info, warn, Subscriber};
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Run log written next to the reports.
const LOG_FILE: &str = "simulation.log";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    seed: Option<u64>,
    parquet: bool,
    /// Collected before logging is up, reported right after.
    unknown: Vec<String>,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--output-dir" => args.output_dir = it.next().map(PathBuf::from),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--parquet" => args.parquet = true,
            _ => args.unknown.push(arg),
        }
    }
    args
}

fn load_config(path: Option<&Path>) -> Result<PlanConfig> {
    let Some(path) = path else {
        return Ok(PlanConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

/// Plain-text layer writing `out_dir/simulation.log`, started afresh each run.
fn file_layer<S>(out_dir: &Path) -> Result<fmt::Layer<S, DefaultFields, Format, Mutex<File>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;
    let path = out_dir.join(LOG_FILE);
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
}

fn main() -> Result<()> {
    let args = parse_args();
    let mut cfg = load_config(args.config.as_deref())?;

    // Logging setup: console plus a log file in the output directory
    let out_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| cfg.report.output_dir.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer(&out_dir)?)
        .init();
    info!(
        git_sha = env!("GIT_SHA"),
        build_date = env!("BUILD_DATE"),
        log = %out_dir.join(LOG_FILE).display(),
        "io-planner"
    );
    for arg in &args.unknown {
        warn!(arg = %arg, "ignoring unknown argument");
    }
    match &args.config {
        Some(path) => info!(path = %path.display(), "config loaded"),
        None => info!("no --config given, using defaults"),
    }

    if let Some(dir) = args.output_dir {
        cfg.report.output_dir = dir;
    }
    if let Some(seed) = args.seed {
        cfg.random_seed = seed;
    }
    cfg.report.save_parquet |= args.parquet;
    cfg.validate().context("invalid configuration")?;

    let economy = data_pipeline::build_economy(&cfg)?;
    let report = cfg.report.clone();
    let (max_k, tolerance) = (cfg.neumann_max_k, cfg.neumann_tolerance);
    let sim = Simulation::new(economy, cfg).context("failed to set up the simulation")?;

    // Test vector: household demand in physical units.
    let test_vector: Vec<f64> = sim
        .economy()
        .demand
        .consumption
        .iter()
        .zip(sim.base_prices())
        .map(|(c, p)| c / p)
        .collect();
    let convergence = convergence_test(sim.solver(), &test_vector, max_k, tolerance)?;
    match convergence.converged_k {
        Some(k) => info!(k, tolerance, "neumann series converged"),
        None => warn!(
            max_k,
            final_error = convergence.final_error(),
            "neumann series did not reach tolerance"
        ),
    }

    let output = match sim.run() {
        Ok(output) => output,
        Err(err) => {
            persistence::write_failure(&report.output_dir, &err)?;
            return Err(err.into());
        }
    };
    let results = compute_results(&output);
    let s = &results.summary;

    println!(
        "Plan OK | sectors: {} | periods: {} | spectral radius: {:.3}",
        sim.economy().sectors(),
        output.records.len(),
        sim.solver().spectral_radius()
    );
    println!(
        "KPI | gap: {:.2}% | excess demand: {:.2}% | utilization: {:.1}% | growth: {:.2}% | debt/GDP: {:.1}% | warnings: {}",
        s.mean_absolute_output_gap_pct,
        s.mean_excess_demand_pct,
        s.mean_capacity_utilization_pct,
        s.annualized_growth_pct,
        s.debt_to_gdp_pct,
        output.warnings.len()
    );

    let written = persistence::write_reports(&report, &output, &results, &convergence)?;
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
