// File: ksbot-core/src/redeem/mod.rs

use std::fmt;
use std::time::Duration;

use ksbot_common::models::Code;

pub mod orchestrator;

pub use orchestrator::Redeemer;

/// Lifecycle of a single run, published while it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Acquiring,
    Running,
    Finalizing,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "Idle",
            RunState::Acquiring => "Acquiring",
            RunState::Running => "Redeeming",
            RunState::Finalizing => "Finalizing",
        };
        f.write_str(s)
    }
}

/// Knobs for pacing and bounding the session driver.
#[derive(Debug, Clone)]
pub struct RedeemerSettings {
    /// Upper bound on each driver step (launch, login, submit, dismiss).
    pub step_timeout: Duration,
    /// Pause after each submission before the next one.
    pub settle_delay: Duration,
}

impl Default for RedeemerSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Codes submitted by at least one player, in first-attempt order.
    pub attempted: Vec<Code>,
    /// Attempted codes that went from not-fully-settled to fully settled.
    pub newly_settled: Vec<Code>,
    /// `newly_settled` restricted to the triggering batch; what the notifier got.
    pub notified: Vec<Code>,
    pub players_processed: usize,
    pub players_skipped: usize,
    pub players_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run holds the lock; nothing was touched.
    AlreadyRunning,
    Completed(RunSummary),
    /// Stopped between players on request.
    Cancelled(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::AlreadyRunning => None,
            RunOutcome::Completed(s) | RunOutcome::Cancelled(s) => Some(s),
        }
    }
}
