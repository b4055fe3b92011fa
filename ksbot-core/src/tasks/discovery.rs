// File: ksbot-core/src/tasks/discovery.rs

use tracing::{debug, error, info};

use crate::Error;
use crate::storage::{CodeLedger, ResultStore, StoragePaths};
use ksbot_common::models::Code;
use ksbot_common::traits::CodeSource;

/// One discovery pass: asks `source` for the active codes and appends the
/// ones the ledger is not tracking. Returns the newly added codes in listing
/// order. A failing source is logged and treated as "nothing new".
///
/// Codes already pruned as expired/invalid stay pruned even if the listing
/// still shows them.
pub async fn check_new_codes(paths: &StoragePaths, source: &dyn CodeSource) -> Result<Vec<Code>, Error> {
    let mut ledger = CodeLedger::load(&paths.codes).await?;

    let listed = match source.fetch_codes().await {
        Ok(codes) => codes,
        Err(e) => {
            error!("Code source error: {e}");
            return Ok(Vec::new());
        }
    };

    let results = ResultStore::load(&paths.results).await?;
    let mut unseen = Vec::new();
    for code in listed {
        if ledger.contains(&code) {
            continue;
        }
        if results.is_dead(&code) {
            debug!("Listing still shows {} but it was pruned as dead; ignoring", code);
            continue;
        }
        unseen.push(code);
    }

    let added = ledger.append(&unseen).await?;
    for code in &added {
        info!("New code found: {}", code);
    }
    if added.is_empty() {
        info!("No new codes found.");
    }
    Ok(added)
}
