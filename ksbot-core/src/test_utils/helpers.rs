// File: ksbot-core/src/test_utils/helpers.rs
//
// In-process stand-ins for the external collaborators, used by the
// integration tests. The fake driver records every call so tests can assert
// on ordering and on what was never called.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::Error;
use crate::storage::StoragePaths;
use ksbot_common::models::{Code, PlayerId};
use ksbot_common::traits::{Notifier, PlayerSource, SessionDriver, SessionEngine};

/// Every interaction the fake driver saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Launch,
    Open(PlayerId),
    Submit(PlayerId, Code),
    Dismiss(PlayerId),
    Close,
}

#[derive(Default)]
struct Script {
    responses: HashMap<(String, String), String>,
    default_response: String,
    failing_sessions: HashSet<String>,
    failing_submits: HashSet<(String, String)>,
    stalled_submits: HashSet<(String, String)>,
    launch_fails: bool,
    dismiss_fails: bool,
}

pub type CallHook = Arc<dyn Fn(&DriverCall) + Send + Sync>;

/// Scripted session driver. Responses are keyed by (player, code); anything
/// unscripted gets the default response.
#[derive(Clone, Default)]
pub struct FakeDriver {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<DriverCall>>>,
    hook: Arc<Mutex<Option<CallHook>>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.set_default_response("Redeemed, please claim the rewards in your mail!");
        driver
    }

    pub fn set_default_response(&self, text: &str) {
        self.script.lock().expect("fake driver poisoned").default_response = text.to_string();
    }

    pub fn respond(&self, player: &str, code: &str, text: &str) {
        self.script
            .lock()
            .expect("fake driver poisoned")
            .responses
            .insert((player.to_string(), code.to_string()), text.to_string());
    }

    pub fn fail_session(&self, player: &str) {
        self.script
            .lock()
            .expect("fake driver poisoned")
            .failing_sessions
            .insert(player.to_string());
    }

    pub fn fail_submit(&self, player: &str, code: &str) {
        self.script
            .lock()
            .expect("fake driver poisoned")
            .failing_submits
            .insert((player.to_string(), code.to_string()));
    }

    /// The submit for this pair never answers.
    pub fn stall_submit(&self, player: &str, code: &str) {
        self.script
            .lock()
            .expect("fake driver poisoned")
            .stalled_submits
            .insert((player.to_string(), code.to_string()));
    }

    /// Runs `hook` after each call is recorded, e.g. to tamper with files
    /// at a precise point of a run.
    pub fn on_call(&self, hook: impl Fn(&DriverCall) + Send + Sync + 'static) {
        *self.hook.lock().expect("fake driver poisoned") = Some(Arc::new(hook));
    }

    pub fn launches(&self) -> usize {
        self.calls().iter().filter(|c| **c == DriverCall::Launch).count()
    }

    pub fn fail_launch(&self) {
        self.script.lock().expect("fake driver poisoned").launch_fails = true;
    }

    pub fn fail_dismiss(&self) {
        self.script.lock().expect("fake driver poisoned").dismiss_fails = true;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().expect("fake driver poisoned").clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("fake driver poisoned").clear();
    }

    /// (player, code) pairs submitted, in order.
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Submit(p, code) => Some((p.to_string(), code.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn opened_sessions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Open(p) => Some(p.to_string()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().expect("fake driver poisoned").push(call.clone());
        let hook = self.hook.lock().expect("fake driver poisoned").clone();
        if let Some(hook) = hook {
            hook(&call);
        }
    }
}

#[async_trait]
impl SessionDriver for FakeDriver {
    async fn launch(&self) -> Result<Box<dyn SessionEngine>, Error> {
        self.record(DriverCall::Launch);
        if self.script.lock().expect("fake driver poisoned").launch_fails {
            return Err(Error::EngineUnavailable("fake engine refused to start".into()));
        }
        Ok(Box::new(FakeEngine {
            driver: self.clone(),
            player: None,
        }))
    }
}

struct FakeEngine {
    driver: FakeDriver,
    player: Option<PlayerId>,
}

#[async_trait]
impl SessionEngine for FakeEngine {
    async fn open_session(&mut self, player: &PlayerId) -> Result<(), Error> {
        self.driver.record(DriverCall::Open(player.clone()));
        let fails = self
            .driver
            .script
            .lock()
            .expect("fake driver poisoned")
            .failing_sessions
            .contains(player.as_str());
        if fails {
            self.player = None;
            return Err(Error::Driver("login field never appeared".into()));
        }
        self.player = Some(player.clone());
        Ok(())
    }

    async fn submit(&mut self, code: &Code) -> Result<String, Error> {
        let player = self
            .player
            .clone()
            .ok_or_else(|| Error::Driver("submit without a session".into()))?;
        self.driver.record(DriverCall::Submit(player.clone(), code.clone()));

        let key = (player.to_string(), code.to_string());
        let stalls = self
            .driver
            .script
            .lock()
            .expect("fake driver poisoned")
            .stalled_submits
            .contains(&key);
        if stalls {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let script = self.driver.script.lock().expect("fake driver poisoned");
        if script.failing_submits.contains(&key) {
            return Err(Error::Driver("message element never appeared".into()));
        }
        Ok(script
            .responses
            .get(&key)
            .cloned()
            .unwrap_or_else(|| script.default_response.clone()))
    }

    async fn dismiss_prompt(&mut self) -> Result<(), Error> {
        let player = self.player.clone().unwrap_or_else(|| PlayerId::from(""));
        self.driver.record(DriverCall::Dismiss(player));
        if self.driver.script.lock().expect("fake driver poisoned").dismiss_fails {
            return Err(Error::Driver("no confirm button".into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.driver.record(DriverCall::Close);
        Ok(())
    }
}

/// Fixed player list.
#[derive(Debug, Clone, Default)]
pub struct StaticPlayers(pub Vec<PlayerId>);

impl StaticPlayers {
    pub fn of(ids: &[&str]) -> Self {
        Self(ids.iter().map(|id| PlayerId::from(*id)).collect())
    }
}

#[async_trait]
impl PlayerSource for StaticPlayers {
    async fn load_players(&self) -> Result<Vec<PlayerId>, Error> {
        Ok(self.0.clone())
    }
}

/// Notifier that remembers every batch it was handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    batches: Arc<Mutex<Vec<Vec<Code>>>>,
}

impl RecordingNotifier {
    pub fn batches(&self) -> Vec<Vec<Code>> {
        self.batches.lock().expect("notifier poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_settled(&self, codes: &[Code]) -> Result<(), Error> {
        self.batches.lock().expect("notifier poisoned").push(codes.to_vec());
        Ok(())
    }
}

pub fn codes(list: &[&str]) -> Vec<Code> {
    list.iter().map(|c| Code::from(*c)).collect()
}

/// Writes `codes` as the ledger file under `paths`.
pub async fn seed_ledger(paths: &StoragePaths, list: &[&str]) -> Result<(), Error> {
    tokio::fs::create_dir_all(&paths.base_dir).await?;
    let mut text = list.join("\n");
    text.push('\n');
    tokio::fs::write(&paths.codes, text).await?;
    Ok(())
}

/// Writes raw rows (without header) as the results log under `paths`.
pub async fn seed_results(paths: &StoragePaths, rows: &[&str]) -> Result<(), Error> {
    tokio::fs::create_dir_all(&paths.base_dir).await?;
    let mut text = String::from(crate::storage::result_store::RESULTS_HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    tokio::fs::write(&paths.results, text).await?;
    Ok(())
}
