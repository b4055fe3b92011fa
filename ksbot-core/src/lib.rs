// src/lib.rs

pub mod config;
pub mod storage;
pub mod guard;
pub mod classify;
pub mod redeem;
pub mod http;
pub mod notify;
pub mod drivers;
pub mod sources;
pub mod tasks;
pub mod test_utils;

pub use ksbot_common::error::Error;
pub use ksbot_common::models::{Code, Outcome, PlayerId, ResultEntry};
pub use config::BotConfig;
pub use guard::{RunGuard, RunLock};
pub use classify::{OutcomeClassifier, OutcomeRule};
pub use redeem::{Redeemer, RedeemerSettings, RunOutcome, RunState, RunSummary};
pub use storage::{CodeLedger, CsvPlayerSource, ResultStore, StoragePaths};
pub use http::{DefaultHttpClient, HttpClient};
