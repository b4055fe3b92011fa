// File: ksbot-core/src/tasks/auto_check.rs
//
// Periodic "look for new codes, redeem them" loop with an explicit
// start/stop/status lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Error;
use crate::redeem::{Redeemer, RunOutcome};
use crate::tasks::discovery::check_new_codes;
use ksbot_common::models::Code;
use ksbot_common::traits::CodeSource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoCheckStatus {
    pub running: bool,
    pub last_check: Option<DateTime<Local>>,
    pub last_redeem: Option<DateTime<Local>>,
}

struct Inner {
    redeemer: Arc<Redeemer>,
    source: Arc<dyn CodeSource>,
    status: RwLock<AutoCheckStatus>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AutoCheckTask {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl AutoCheckTask {
    pub fn new(redeemer: Arc<Redeemer>, source: Arc<dyn CodeSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                redeemer,
                source,
                status: RwLock::new(AutoCheckStatus::default()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawns the loop; the first pass happens immediately. Returns `false`
    /// if the loop is already running.
    pub async fn start(&self, every: Duration) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.run_loop(every, loop_cancel).await;
        });

        self.inner.status.write().await.running = true;
        *running = Some(Running { cancel, handle });
        info!("Auto-check started (every {}s).", every.as_secs());
        true
    }

    /// Cancels the loop (and any run in progress, between players) and waits
    /// for it to wind down.
    pub async fn stop(&self) {
        let taken = self.running.lock().await.take();
        if let Some(Running { cancel, handle }) = taken {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Auto-check task ended abnormally: {e}");
            }
            info!("Auto-check stopped.");
        }
        self.inner.status.write().await.running = false;
    }

    pub async fn status(&self) -> AutoCheckStatus {
        self.inner.status.read().await.clone()
    }

    /// One discovery pass, redeeming any new codes right away.
    pub async fn check_now(&self, cancel: &CancellationToken) -> Result<Vec<Code>, Error> {
        self.inner.check_once(cancel).await
    }

    /// A manual run outside the schedule; `trigger` selects what to announce.
    pub async fn redeem_now(&self, trigger: &[Code], cancel: &CancellationToken) -> Result<RunOutcome, Error> {
        self.inner.redeem(trigger, cancel).await
    }
}

impl Inner {
    async fn run_loop(&self, every: Duration, cancel: CancellationToken) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once(&cancel).await {
                        error!("Auto-check pass failed: {e}");
                    }
                }
            }
        }
        self.status.write().await.running = false;
    }

    async fn check_once(&self, cancel: &CancellationToken) -> Result<Vec<Code>, Error> {
        let added = check_new_codes(self.redeemer.paths(), self.source.as_ref()).await;
        self.status.write().await.last_check = Some(Local::now());
        let added = added?;

        if !added.is_empty() {
            info!("New codes detected, starting redeemer automatically.");
            self.redeem(&added, cancel).await?;
        }
        Ok(added)
    }

    async fn redeem(&self, trigger: &[Code], cancel: &CancellationToken) -> Result<RunOutcome, Error> {
        let outcome = self.redeemer.run(trigger, cancel).await?;
        if !matches!(outcome, RunOutcome::AlreadyRunning) {
            self.status.write().await.last_redeem = Some(Local::now());
        }
        Ok(outcome)
    }
}
