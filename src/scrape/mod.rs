//! Market scraping pipeline: units are (city, source) pairs, worked by a
//! bounded pool, checkpointed one by one, and exported only when every unit
//! succeeded.

pub mod pipeline;
pub mod unit;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use crate::types::UnitKey;

pub use pipeline::{log_report, Pipeline, RunReport, ScrapeOptions};
pub use unit::{scrape_unit, UnitContext};

/// Terminal state of one scrape run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Success,
    Failed,
    Interrupted,
}

impl RunState {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Interrupted => 2,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Succeeded { count: usize },
    /// Fetch gave up, no parser, a write failed or too few listings survived.
    Failed { count: usize, error: String },
    /// Cancelled mid-unit. Whatever was parsed is saved; nothing is checkpointed.
    Interrupted { count: usize },
    /// Cancelled before a worker picked the unit up.
    NotStarted,
    /// Already recorded in the checkpoint of a resumed run.
    Skipped { success: bool, count: usize },
}

impl UnitStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { success: false, .. })
    }

    pub fn is_unfinished(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::NotStarted)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { count } => write!(f, "OK {count}"),
            Self::Failed { count, error } => write!(f, "FAILED {count} ({error})"),
            Self::Interrupted { count } => write!(f, "INTERRUPTED {count}"),
            Self::NotStarted => write!(f, "NOT STARTED"),
            Self::Skipped { success: true, count } => write!(f, "SKIPPED (checkpoint: OK {count})"),
            Self::Skipped { success: false, count } => {
                write!(f, "SKIPPED (checkpoint: FAILED {count})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: UnitKey,
    pub status: UnitStatus,
}

/// Failed beats interrupted beats success.
pub fn terminal_state(units: &[UnitReport]) -> RunState {
    if units.iter().any(|u| u.status.is_failure()) {
        RunState::Failed
    } else if units.iter().any(|u| u.status.is_unfinished()) {
        RunState::Interrupted
    } else {
        RunState::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: UnitStatus) -> UnitReport {
        UnitReport { unit: UnitKey::new("Варна", "olx.bg"), status }
    }

    #[test]
    fn failure_outranks_interruption() {
        let units = vec![
            report(UnitStatus::Succeeded { count: 12 }),
            report(UnitStatus::Interrupted { count: 3 }),
            report(UnitStatus::Failed { count: 2, error: "Too few listings: 2 < 5 minimum".into() }),
        ];
        assert_eq!(terminal_state(&units), RunState::Failed);
        assert_eq!(terminal_state(&units[..2]), RunState::Interrupted);
        assert_eq!(terminal_state(&units[..1]), RunState::Success);
    }

    #[test]
    fn checkpointed_failures_still_fail_a_resumed_run() {
        let units = vec![
            report(UnitStatus::Skipped { success: false, count: 0 }),
            report(UnitStatus::Succeeded { count: 9 }),
        ];
        assert_eq!(terminal_state(&units), RunState::Failed);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunState::Success.exit_code(), 0);
        assert_eq!(RunState::Failed.exit_code(), 1);
        assert_eq!(RunState::Interrupted.exit_code(), 2);
        assert_eq!(terminal_state(&[]), RunState::Success);
    }
}
