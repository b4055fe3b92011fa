// File: ksbot-core/src/redeem/orchestrator.rs
//
// The redemption run: lock -> load -> per-player pending codes -> submit ->
// record -> prune -> unlock -> notify.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, Timelike};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::classify::OutcomeClassifier;
use crate::redeem::{RedeemerSettings, RunOutcome, RunState, RunSummary};
use crate::storage::{CodeLedger, ResultStore, StoragePaths};
use ksbot_common::models::{Code, PlayerId};
use ksbot_common::traits::{Notifier, PlayerSource, SessionDriver, SessionEngine};

/// Drives redemption runs against the durable stores under `paths`.
///
/// A `Redeemer` holds no run state between calls: every run reloads the
/// ledger and results from disk, so edits made between runs (new codes from
/// discovery, a cleared history) are always picked up.
pub struct Redeemer {
    paths: StoragePaths,
    players: Arc<dyn PlayerSource>,
    driver: Arc<dyn SessionDriver>,
    notifier: Arc<dyn Notifier>,
    classifier: OutcomeClassifier,
    settings: RedeemerSettings,
    state: watch::Sender<RunState>,
}

impl Redeemer {
    pub fn new(
        paths: StoragePaths,
        players: Arc<dyn PlayerSource>,
        driver: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            paths,
            players,
            driver,
            notifier,
            classifier: OutcomeClassifier::default(),
            settings: RedeemerSettings::default(),
            state,
        }
    }

    pub fn with_classifier(mut self, classifier: OutcomeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_settings(mut self, settings: RedeemerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: RunState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("Redeemer state {} -> {}", prev, next);
        }
    }

    /// Performs one run. `trigger` is the batch of codes whose full settlement
    /// should be announced; `cancel` is checked before each player.
    ///
    /// Only a failure to start the session engine (or to read the stores at
    /// all) comes back as `Err`; per-player problems are logged and skipped.
    pub async fn run(&self, trigger: &[Code], cancel: &CancellationToken) -> Result<RunOutcome, Error> {
        self.set_state(RunState::Acquiring);
        let lock = self.paths.run_lock();
        let acquired = tokio::task::spawn_blocking(move || lock.try_acquire())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
            .and_then(|r| r);
        let mut guard = match acquired {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!("Redeemer is already running.");
                self.set_state(RunState::Idle);
                return Ok(RunOutcome::AlreadyRunning);
            }
            Err(e) => {
                self.set_state(RunState::Idle);
                return Err(e);
            }
        };

        info!("Running redeemer...");
        self.set_state(RunState::Running);
        let pass = self.drive(cancel).await;

        self.set_state(RunState::Finalizing);
        let finished = pass.map(|pass| pass.finish(trigger));
        match tokio::task::spawn_blocking(move || guard.release()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to release run lock: {e}"),
            // The guard was dropped with the task, which releases it too.
            Err(e) => warn!("Run lock release task failed: {e}"),
        }

        let (summary, cancelled) = match finished {
            Ok(done) => done,
            Err(e) => {
                error!("Redemption run aborted: {e}");
                self.set_state(RunState::Idle);
                return Err(e);
            }
        };

        info!(
            processed = summary.players_processed,
            skipped = summary.players_skipped,
            failed = summary.players_failed,
            "Redemption run finished; newly settled: {:?}",
            summary.newly_settled.iter().map(Code::as_str).collect::<Vec<_>>()
        );
        if let Err(e) = self.notifier.notify_settled(&summary.notified).await {
            warn!("Failed to deliver settlement notification: {e}");
        }

        self.set_state(RunState::Idle);
        Ok(if cancelled {
            RunOutcome::Cancelled(summary)
        } else {
            RunOutcome::Completed(summary)
        })
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<RunPass, Error> {
        let mut pass = RunPass::default();

        let players = match self.players.load_players().await {
            Ok(players) => players,
            Err(e) => {
                error!("Error loading players: {e}");
                Vec::new()
            }
        };
        if players.is_empty() {
            info!("No players found.");
            return Ok(pass);
        }

        let mut ledger = CodeLedger::load(&self.paths.codes).await?;
        if ledger.is_empty() {
            info!("No codes found.");
            return Ok(pass);
        }
        let mut results = ResultStore::load(&self.paths.results).await?;

        pass.settled_before = ledger
            .codes()
            .iter()
            .filter(|code| results.is_fully_settled(code, &players))
            .cloned()
            .collect();

        let mut engine: Option<Box<dyn SessionEngine>> = None;
        for player in &players {
            if cancel.is_cancelled() {
                info!("Stop requested; not continuing with player {}", player);
                pass.cancelled = true;
                break;
            }

            // Snapshot: removals made while this player runs do not shrink
            // this list, but later players will not see the removed codes.
            let pending = ledger.pending_for(player, &results);
            if pending.is_empty() {
                info!("⏩ Skip {} (All codes done)", player);
                pass.players_skipped += 1;
                continue;
            }

            if engine.is_none() {
                engine = Some(self.launch_engine().await?);
            }
            let Some(session) = engine.as_mut() else {
                continue;
            };

            let result = self
                .redeem_for_player(&mut **session, player, &pending, &mut ledger, &mut results, &mut pass)
                .await;
            match result {
                Ok(()) => pass.players_processed += 1,
                Err(e @ Error::EngineStalled(_)) => {
                    error!("❌ Error for {}: {} => relaunching engine for the next player", player, e);
                    pass.players_failed += 1;
                    if let Some(stalled) = engine.take() {
                        self.close_engine(stalled).await;
                    }
                }
                Err(e) => {
                    error!("❌ Error for {}: {}", player, e);
                    pass.players_failed += 1;
                }
            }
        }

        if let Some(session) = engine {
            self.close_engine(session).await;
        }

        pass.players = players;
        pass.results = Some(results);
        Ok(pass)
    }

    async fn close_engine(&self, mut engine: Box<dyn SessionEngine>) {
        match timeout(self.settings.step_timeout, engine.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Session engine did not shut down cleanly: {e}"),
            Err(_) => warn!("Session engine shutdown timed out"),
        }
    }

    async fn launch_engine(&self) -> Result<Box<dyn SessionEngine>, Error> {
        let step = self.settings.step_timeout;
        match timeout(step, self.driver.launch()).await {
            Ok(Ok(engine)) => Ok(engine),
            Ok(Err(Error::EngineUnavailable(reason))) => Err(Error::EngineUnavailable(reason)),
            Ok(Err(e)) => Err(Error::EngineUnavailable(e.to_string())),
            Err(_) => Err(Error::EngineUnavailable(format!(
                "launch timed out after {}s",
                step.as_secs()
            ))),
        }
    }

    async fn redeem_for_player(
        &self,
        engine: &mut dyn SessionEngine,
        player: &PlayerId,
        pending: &[Code],
        ledger: &mut CodeLedger,
        results: &mut ResultStore,
        pass: &mut RunPass,
    ) -> Result<(), Error> {
        let step = self.settings.step_timeout;
        info!("▶ Processing Player: {}", player);

        match timeout(step, engine.open_session(player)).await {
            Ok(Ok(())) => {}
            Ok(Err(e @ (Error::SessionOpen { .. } | Error::EngineStalled(_)))) => return Err(e),
            Ok(Err(e)) => {
                return Err(Error::SessionOpen {
                    player: player.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(Error::EngineStalled(format!(
                    "login for {} timed out after {:?}",
                    player, step
                )));
            }
        }

        for code in pending {
            pass.mark_attempted(code);
            info!("  Redeeming {}...", code);

            // A timed-out submit was sent but never answered: it is recorded
            // as Unknown, then the engine is abandoned. A stalled engine never
            // sent the code at all, so nothing is recorded.
            let (response, stalled) = match timeout(step, engine.submit(code)).await {
                Ok(Err(e @ Error::EngineStalled(_))) => return Err(e),
                Ok(response) => (response, None),
                Err(elapsed) => (
                    Err(Error::Timeout(elapsed)),
                    Some(Error::EngineStalled(format!("submitting {} timed out after {:?}", code, step))),
                ),
            };
            let outcome = self.classifier.classify_response(response);

            // Recorded before anything else touches the session.
            let now = Local::now().naive_local();
            let now = now.with_nanosecond(0).unwrap_or(now);
            results.record_outcome(player, code, outcome, now).await?;
            info!("  {} => {}", code, outcome);

            if outcome.is_settled_negative() {
                ledger.remove(code).await?;
            }
            if let Some(e) = stalled {
                return Err(e);
            }

            match timeout(step, engine.dismiss_prompt()).await {
                Ok(Ok(())) => {}
                Ok(Err(e @ Error::EngineStalled(_))) => return Err(e),
                Ok(Err(e)) => warn!("Could not dismiss prompt after {} for {}: {}", code, player, e),
                Err(_) => {
                    return Err(Error::EngineStalled(format!(
                        "dismissing prompt after {} for {} timed out",
                        code, player
                    )));
                }
            }

            if !self.settings.settle_delay.is_zero() {
                sleep(self.settings.settle_delay).await;
            }
        }
        Ok(())
    }
}

/// Bookkeeping for one pass over the players.
#[derive(Default)]
struct RunPass {
    players: Vec<PlayerId>,
    results: Option<ResultStore>,
    settled_before: HashSet<Code>,
    attempted: Vec<Code>,
    attempted_set: HashSet<Code>,
    players_processed: usize,
    players_skipped: usize,
    players_failed: usize,
    cancelled: bool,
}

impl RunPass {
    fn mark_attempted(&mut self, code: &Code) {
        if self.attempted_set.insert(code.clone()) {
            self.attempted.push(code.clone());
        }
    }

    fn finish(self, trigger: &[Code]) -> (RunSummary, bool) {
        let newly_settled: Vec<Code> = match &self.results {
            Some(results) => self
                .attempted
                .iter()
                .filter(|code| !self.settled_before.contains(*code))
                .filter(|code| results.is_fully_settled(code, &self.players))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let notified = newly_settled
            .iter()
            .filter(|code| trigger.contains(code))
            .cloned()
            .collect();

        let summary = RunSummary {
            attempted: self.attempted,
            newly_settled,
            notified,
            players_processed: self.players_processed,
            players_skipped: self.players_skipped,
            players_failed: self.players_failed,
        };
        (summary, self.cancelled)
    }
}
