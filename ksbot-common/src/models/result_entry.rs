// File: ksbot-common/src/models/result_entry.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Code, Outcome, PlayerId};

/// One row of the append-only results log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub player: PlayerId,
    pub code: Code,
    pub outcome: Outcome,
    /// Local wall-clock time, second precision (the log format has no zone).
    pub timestamp: NaiveDateTime,
}
