// File: ksbot-core/src/storage/code_ledger.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::Error;
use crate::storage::{append_line, atomic_write, read_optional, validate_field, ResultStore};
use ksbot_common::models::{Code, Outcome, PlayerId};

/// Ordered, duplicate-free list of codes still worth attempting.
#[derive(Debug)]
pub struct CodeLedger {
    path: PathBuf,
    codes: Vec<Code>,
}

impl CodeLedger {
    /// Loads the ledger; a missing file is an empty ledger.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let codes = read_codes(&path).await?;
        debug!("Loaded {} tracked codes from {}", codes.len(), path.display());
        Ok(Self { path, codes })
    }

    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    pub fn contains(&self, code: &Code) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Drops `code` and rewrites the file. Returns `false` (and writes
    /// nothing) when the code is not tracked.
    ///
    /// The file is re-read before the rewrite so codes appended by another
    /// process since `load` survive.
    pub async fn remove(&mut self, code: &Code) -> Result<bool, Error> {
        if !self.contains(code) {
            return Ok(false);
        }
        self.codes.retain(|c| c != code);

        let on_disk: Vec<Code> = read_codes(&self.path)
            .await?
            .into_iter()
            .filter(|c| c != code)
            .collect();
        atomic_write(&self.path, render(&on_disk)).await?;
        info!("Removed code {} from tracking", code);
        Ok(true)
    }

    /// Appends every code not yet tracked, in order, and returns those added.
    pub async fn append(&mut self, new_codes: &[Code]) -> Result<Vec<Code>, Error> {
        let mut added = Vec::new();
        for code in new_codes {
            if self.contains(code) {
                continue;
            }
            validate_field("code", code.as_str())?;
            append_line(&self.path, None, code.as_str()).await?;
            self.codes.push(code.clone());
            added.push(code.clone());
        }
        Ok(added)
    }

    /// Codes this player still needs, in ledger order.
    pub fn pending_for(&self, player: &PlayerId, results: &ResultStore) -> Vec<Code> {
        pending_for(player, &self.codes, results)
    }
}

/// Filters `codes` down to those without a settled-positive status for
/// `player`, preserving order.
pub fn pending_for(player: &PlayerId, codes: &[Code], results: &ResultStore) -> Vec<Code> {
    codes
        .iter()
        .filter(|code| {
            !results
                .current_status(player, code)
                .is_some_and(Outcome::is_settled_positive)
        })
        .cloned()
        .collect()
}

async fn read_codes(path: &Path) -> Result<Vec<Code>, Error> {
    let Some(text) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !seen.insert(trimmed.to_string()) {
            warn!(path = %path.display(), "Duplicate code '{}' in ledger; keeping first", trimmed);
            continue;
        }
        codes.push(Code::from(trimmed));
    }
    Ok(codes)
}

fn render(codes: &[Code]) -> String {
    let mut out = String::new();
    for code in codes {
        out.push_str(code.as_str());
        out.push('\n');
    }
    out
}
