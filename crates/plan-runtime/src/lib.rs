#![deny(warnings)]

//! Simulation runtime: the monthly planning loop for the input–output model.
//!
//! [`Simulation`] owns the validated economy and the stateless planning
//! components; all cross-period quantities live in an explicit [`SimState`]
//! that each period transition consumes and replaces.

mod error;
mod orchestrator;
mod results;
mod state;

pub use error::RunError;
pub use orchestrator::{period_date, Simulation, SimulationOutput, Transition};
pub use results::{aggregate, compute_results, AggregatePoint, SimulationResults, Summary};
pub use state::{PeriodRecord, RecalibrationRecord, SimState, SimWarning};
