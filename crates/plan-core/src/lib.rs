#![deny(warnings)]

//! Core domain model for the input-output planning simulator.
//!
//! This crate defines the validated, serializable inputs shared by the
//! engine crates: the dense linear algebra used for Leontief systems, the
//! run configuration, and the immutable [`Economy`] built once before the
//! first period.

mod config;
mod economy;
mod error;
mod linalg;

pub use config::{
    ClassRanges, FiscalRule, InvestmentRule, PlanConfig, PriceAdjustment, ReportConfig,
    SectorClass,
};
pub use economy::{check_productive, validate_technical, Economy, FinalDemandTable, IoTables};
pub use error::ValidationError;
pub use linalg::{
    add, all_finite, axpy, dot, hadamard, norm2, scale, spectral_radius, sub, Matrix,
};
