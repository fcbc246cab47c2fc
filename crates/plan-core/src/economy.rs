//! Validated, immutable description of the economy handed to the engine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::check_range;
use crate::{spectral_radius, Matrix, PlanConfig, ValidationError};

/// Final demand table as delivered by the data loader, one row per sector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalDemandTable {
    /// Household consumption in currency units.
    pub consumption: Vec<f64>,
    /// Gross fixed capital formation in currency units.
    pub investment: Vec<f64>,
    /// Government final demand in currency units.
    pub government: Vec<f64>,
    /// Total gross output in currency units.
    pub total_output: Vec<f64>,
}

impl FinalDemandTable {
    pub fn sectors(&self) -> usize {
        self.consumption.len()
    }
}

/// Raw input-output tables at the loader boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IoTables {
    /// Technical coefficients `A`.
    pub technical: Matrix,
    /// Value added per unit of output `v`.
    pub value_added: Vec<f64>,
    pub demand: FinalDemandTable,
}

/// Immutable economy the simulation runs on.
///
/// Construction checks every load-time invariant: dimensions, non-negative
/// technical coefficients, value-added shares in `[0, 1]`, depreciation in
/// `[0, 1]`, an invertible capital matrix, and the productivity condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Economy {
    /// Technical coefficients `A`.
    pub technical: Matrix,
    /// Capital coefficients `B`.
    pub capital: Matrix,
    /// `B⁻¹`, used to derive capacity from the capital stock.
    pub capital_inverse: Matrix,
    /// Value added per unit output `v`.
    pub value_added: Vec<f64>,
    /// Monthly depreciation rates `Δ`.
    pub depreciation: Vec<f64>,
    /// Monthly demand trend `μ` per sector.
    pub trend: Vec<f64>,
    pub demand: FinalDemandTable,
    /// Spectral radius of `A` measured at load.
    pub spectral_radius: f64,
}

impl Economy {
    /// Assemble and validate an economy.
    pub fn new(
        tables: IoTables,
        capital: Matrix,
        depreciation: Vec<f64>,
        trend: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        let n = tables.technical.rows();
        if !tables.technical.is_square() {
            return Err(ValidationError::ConfigMismatch(format!(
                "technical coefficients are {}x{}, expected a square matrix",
                tables.technical.rows(),
                tables.technical.cols()
            )));
        }
        if capital.rows() != n || capital.cols() != n {
            return Err(ValidationError::ConfigMismatch(format!(
                "capital coefficients are {}x{}, expected {n}x{n}",
                capital.rows(),
                capital.cols()
            )));
        }
        for (name, len) in [
            ("value_added", tables.value_added.len()),
            ("consumption", tables.demand.consumption.len()),
            ("investment", tables.demand.investment.len()),
            ("government", tables.demand.government.len()),
            ("total_output", tables.demand.total_output.len()),
            ("depreciation", depreciation.len()),
            ("trend", trend.len()),
        ] {
            if len != n {
                return Err(ValidationError::ConfigMismatch(format!(
                    "{name} has {len} sectors, expected {n}"
                )));
            }
        }

        validate_technical(&tables.technical)?;
        for (i, &v) in tables.value_added.iter().enumerate() {
            check_range(format!("value_added[{i}]"), v, 0.0, 1.0, "[0, 1]")?;
        }
        for (i, &d) in depreciation.iter().enumerate() {
            check_range(format!("depreciation[{i}]"), d, 0.0, 1.0, "[0, 1]")?;
        }
        for (name, col) in [
            ("consumption", &tables.demand.consumption),
            ("investment", &tables.demand.investment),
            ("government", &tables.demand.government),
            ("total_output", &tables.demand.total_output),
            ("trend", &trend),
        ] {
            if !crate::all_finite(col) {
                return Err(ValidationError::NonFinite(name.into()));
            }
        }
        if capital.entries().any(|(_, _, v)| !v.is_finite()) {
            return Err(ValidationError::NonFinite("capital coefficients".into()));
        }

        let rho = check_productive(&tables.technical)?;
        let capital_inverse = capital
            .inverse()
            .ok_or(ValidationError::SingularCapitalMatrix)?;
        debug!(sectors = n, spectral_radius = rho, "economy validated");

        Ok(Self {
            technical: tables.technical,
            capital,
            capital_inverse,
            value_added: tables.value_added,
            depreciation,
            trend,
            demand: tables.demand,
            spectral_radius: rho,
        })
    }

    /// Number of sectors `n`.
    pub fn sectors(&self) -> usize {
        self.technical.rows()
    }

    /// Ensure the economy matches the configured sector counts.
    pub fn check_config(&self, cfg: &PlanConfig) -> Result<(), ValidationError> {
        if self.sectors() != cfg.n {
            return Err(ValidationError::ConfigMismatch(format!(
                "economy has {} sectors, configuration says n = {}",
                self.sectors(),
                cfg.n
            )));
        }
        Ok(())
    }
}

/// Entries of `A` must be finite and non-negative.
pub fn validate_technical(a: &Matrix) -> Result<(), ValidationError> {
    for (row, col, value) in a.entries() {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite(format!(
                "technical coefficient ({row}, {col})"
            )));
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeCoefficient {
                matrix: "technical coefficients",
                row,
                col,
                value,
            });
        }
    }
    Ok(())
}

/// Productivity check: returns the spectral radius when it is below one.
///
/// Column sums below one are sufficient but not necessary, so the decision
/// is always taken on the spectral radius.
pub fn check_productive(a: &Matrix) -> Result<f64, ValidationError> {
    if !a.is_square() {
        return Err(ValidationError::ConfigMismatch(
            "technical coefficients must be square".into(),
        ));
    }
    let rho = spectral_radius(a);
    if !(rho < 1.0) {
        return Err(ValidationError::NonProductiveMatrix {
            spectral_radius: rho,
        });
    }
    if a.norm_1() >= 1.0 {
        debug!(
            spectral_radius = rho,
            "column sums exceed one but spectral radius is below one"
        );
    }
    Ok(rho)
}
