//! Binary state snapshots.
//!
//! `SimState` is written with `bincode`; a failed run additionally gets a
//! small JSON note naming the period and the error so the binary file can
//! be matched to its cause.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use plan_runtime::{PeriodRecord, RunError, SimState};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{create, write_json};

/// `state_period_0042.bin` inside `dir`.
pub fn snapshot_path(dir: &Path, period: usize) -> PathBuf {
    dir.join(format!("state_period_{period:04}.bin"))
}

pub fn write_snapshot(path: &Path, state: &SimState) -> Result<()> {
    let out = BufWriter::new(create(path)?);
    bincode::serialize_into(out, state)
        .with_context(|| format!("failed to encode state snapshot {}", path.display()))
}

pub fn read_snapshot(path: &Path) -> Result<SimState> {
    let file = File::open(path)
        .with_context(|| format!("failed to open state snapshot {}", path.display()))?;
    bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("failed to decode state snapshot {}", path.display()))
}

/// Sidecar written next to a post-mortem snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub failed_period: usize,
    pub error: String,
    pub written_at: DateTime<Utc>,
    pub snapshot: Option<PathBuf>,
    pub last_valid: Option<PeriodRecord>,
}

/// Persist what a failed run left behind. Returns the snapshot path, or
/// `None` when the run failed before period zero produced a state.
pub fn write_failure(dir: &Path, err: &RunError) -> Result<Option<PathBuf>> {
    let snapshot = match err.state.as_deref() {
        Some(state) => {
            let path = snapshot_path(dir, state.period);
            write_snapshot(&path, state)?;
            Some(path)
        }
        None => {
            warn!(period = err.period, "no valid state to snapshot");
            None
        }
    };
    let note = FailureNote {
        failed_period: err.period,
        error: format!("{err}"),
        written_at: Utc::now(),
        snapshot: snapshot.clone(),
        last_valid: err.last_valid.as_deref().cloned(),
    };
    write_json(&dir.join("failure.json"), &note)?;
    if let Some(path) = &snapshot {
        info!(path = %path.display(), period = err.period, "post-mortem snapshot written");
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use plan_core::InvestmentRule;

    #[test]
    fn snapshot_resumes_the_same_trajectory() {
        let sim = fixtures::simulation(0.05, InvestmentRule::SpareFirst);
        let mut state = sim.initial().unwrap().state;
        for _ in 0..4 {
            state = sim.step(&state).unwrap().state;
        }
        let path = snapshot_path(&fixtures::scratch("snapshot"), state.period);
        write_snapshot(&path, &state).unwrap();
        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored.period, 4);

        let a = sim.step(&state).unwrap();
        let b = sim.step(&restored).unwrap();
        assert_eq!(a.record, b.record);
    }

    #[test]
    fn failed_run_leaves_snapshot_and_note() {
        let dir = fixtures::scratch("failure");
        let err = fixtures::simulation(1e-300, InvestmentRule::SpareFirst)
            .run()
            .unwrap_err();
        let path = write_failure(&dir, &err).unwrap().unwrap();
        assert_eq!(path, snapshot_path(&dir, 0));
        assert_eq!(read_snapshot(&path).unwrap().period, 0);

        let note: FailureNote =
            serde_json::from_str(&std::fs::read_to_string(dir.join("failure.json")).unwrap())
                .unwrap();
        assert_eq!(note.failed_period, 1);
        assert_eq!(note.last_valid.map(|r| r.period), Some(0));
    }

    #[test]
    fn garbage_is_not_a_snapshot() {
        let path = fixtures::scratch("snapshot").join("garbage.bin");
        std::fs::write(&path, b"\x01\x02").unwrap();
        assert!(read_snapshot(&path).is_err());
    }
}
