use plan_econ::EconError;
use thiserror::Error;

use crate::{PeriodRecord, SimState};

/// A fatal failure at a given period.
///
/// Carries the last successfully recorded period and the state that period
/// left behind, so the run can be inspected or snapshotted.
#[derive(Debug, Error)]
#[error("simulation failed at period {period}: {source}")]
pub struct RunError {
    pub period: usize,
    #[source]
    pub source: EconError,
    pub last_valid: Option<Box<PeriodRecord>>,
    pub state: Option<Box<SimState>>,
}

impl RunError {
    /// Failure before period zero could be recorded.
    pub(crate) fn at_start(source: EconError) -> Self {
        Self {
            period: 0,
            source,
            last_valid: None,
            state: None,
        }
    }
}
