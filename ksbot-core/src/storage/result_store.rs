// File: ksbot-core/src/storage/result_store.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::Error;
use crate::storage::{append_line, read_optional, validate_field};
use ksbot_common::models::{Code, Outcome, PlayerId, ResultEntry};

pub const RESULTS_HEADER: &str = "PlayerID,GiftCode,Status,Timestamp";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of every (player, code) attempt, folded into the current
/// status per pair. The latest timestamp wins; ties go to the later row.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    current: HashMap<PlayerId, HashMap<Code, (Outcome, NaiveDateTime)>>,
}

impl ResultStore {
    /// Replays the log at `path`. A missing file is an empty store; malformed
    /// rows are skipped with a warning each.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self {
            path: path.clone(),
            current: HashMap::new(),
        };

        let Some(text) = read_optional(&path).await? else {
            debug!("No results log at {} => starting empty", path.display());
            return Ok(store);
        };

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(RESULTS_HEADER) {
                continue;
            }
            match parse_row(trimmed) {
                Ok(entry) => store.apply(entry),
                Err(reason) => {
                    warn!(
                        line = idx + 1,
                        path = %path.display(),
                        "Skipping malformed results row: {reason}"
                    );
                }
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_status(&self, player: &PlayerId, code: &Code) -> Option<Outcome> {
        self.current
            .get(player)
            .and_then(|codes| codes.get(code))
            .map(|(outcome, _)| *outcome)
    }

    /// True when every listed player has a settled-positive status for `code`.
    /// An empty player list is never "fully settled".
    pub fn is_fully_settled(&self, code: &Code, players: &[PlayerId]) -> bool {
        !players.is_empty()
            && players.iter().all(|p| {
                self.current_status(p, code)
                    .is_some_and(Outcome::is_settled_positive)
            })
    }

    /// True when any player's current status for `code` is expired/invalid.
    pub fn is_dead(&self, code: &Code) -> bool {
        self.current.values().any(|codes| {
            codes
                .get(code)
                .is_some_and(|(outcome, _)| outcome.is_settled_negative())
        })
    }

    /// Durably appends one row, then updates the in-memory status.
    ///
    /// Pairs that are already settled-positive are refused: that status is final.
    /// A `timestamp` older than the pair's current one is raised to it.
    pub async fn record_outcome(
        &mut self,
        player: &PlayerId,
        code: &Code,
        outcome: Outcome,
        timestamp: NaiveDateTime,
    ) -> Result<(), Error> {
        validate_field("player id", player.as_str())?;
        validate_field("code", code.as_str())?;

        if self.current_status(player, code).is_some_and(Outcome::is_settled_positive) {
            return Err(Error::AlreadySettled {
                player: player.to_string(),
                code: code.to_string(),
            });
        }

        // The row written last must win on replay, even if the wall clock
        // stepped backwards since the previous row for this pair.
        let timestamp = match self.current_timestamp(player, code) {
            Some(previous) if previous > timestamp => previous,
            _ => timestamp,
        };
        let entry = ResultEntry {
            player: player.clone(),
            code: code.clone(),
            outcome,
            timestamp,
        };
        append_line(&self.path, Some(RESULTS_HEADER), &format_row(&entry)).await?;
        self.apply(entry);
        Ok(())
    }

    fn current_timestamp(&self, player: &PlayerId, code: &Code) -> Option<NaiveDateTime> {
        self.current
            .get(player)
            .and_then(|codes| codes.get(code))
            .map(|(_, ts)| *ts)
    }

    fn apply(&mut self, entry: ResultEntry) {
        let codes = self.current.entry(entry.player).or_default();
        match codes.get(&entry.code) {
            Some((_, existing_ts)) if *existing_ts > entry.timestamp => {}
            _ => {
                codes.insert(entry.code, (entry.outcome, entry.timestamp));
            }
        }
    }
}

fn format_row(entry: &ResultEntry) -> String {
    format!(
        "{},{},{},{}",
        entry.player,
        entry.code,
        entry.outcome.as_str(),
        entry.timestamp.format(TIMESTAMP_FORMAT)
    )
}

fn parse_row(line: &str) -> Result<ResultEntry, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    }
    if fields[0].is_empty() || fields[1].is_empty() {
        return Err("empty player id or code".into());
    }
    let outcome = fields[2].parse::<Outcome>().map_err(|e| e.to_string())?;
    let timestamp = NaiveDateTime::parse_from_str(fields[3], TIMESTAMP_FORMAT)
        .map_err(|e| format!("bad timestamp '{}': {e}", fields[3]))?;

    Ok(ResultEntry {
        player: PlayerId::from(fields[0]),
        code: Code::from(fields[1]),
        outcome,
        timestamp,
    })
}
