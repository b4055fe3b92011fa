// File: ksbot-core/src/config.rs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Error;
use crate::classify::OutcomeRule;
use crate::redeem::RedeemerSettings;

pub const DEFAULT_TARGET_URL: &str = "https://kingshot.net/gift-codes";
pub const WEBHOOK_ENV: &str = "KSBOT_WEBHOOK_URL";

/// Contents of `config.json`. Every key is optional; missing keys take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between discovery passes.
    #[serde(rename = "CHECK_INTERVAL")]
    pub check_interval: u64,

    /// Listing page handed to the code source helper.
    #[serde(rename = "TARGET_URL")]
    pub target_url: String,

    #[serde(rename = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// argv of the session helper process.
    #[serde(rename = "DRIVER_COMMAND")]
    pub driver_command: Vec<String>,

    /// argv of the code listing helper process.
    #[serde(rename = "SOURCE_COMMAND")]
    pub source_command: Vec<String>,

    #[serde(rename = "STEP_TIMEOUT_SECS")]
    pub step_timeout_secs: u64,

    #[serde(rename = "SETTLE_DELAY_MS")]
    pub settle_delay_ms: u64,

    /// Extra response phrases, consulted before the built-in table.
    #[serde(rename = "OUTCOME_PHRASES")]
    pub outcome_phrases: Vec<OutcomeRule>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            check_interval: 3600,
            target_url: DEFAULT_TARGET_URL.to_string(),
            webhook_url: None,
            driver_command: Vec::new(),
            source_command: Vec::new(),
            step_timeout_secs: 15,
            settle_delay_ms: 500,
            outcome_phrases: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Reads `path`. A missing file gives the defaults; so does an unparseable
    /// one, with a warning, so a typo never stops the bot from starting.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_json(&text).unwrap_or_else(|e| {
                warn!("Ignoring unreadable config {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {} => using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Could not read config {}: {e} => using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Lets `KSBOT_WEBHOOK_URL` (environment or `.env`) override the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(WEBHOOK_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.webhook_url = Some(url.to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.check_interval == 0 {
            return Err(Error::Config("CHECK_INTERVAL must be at least 1 second".into()));
        }
        if self.step_timeout_secs == 0 {
            return Err(Error::Config("STEP_TIMEOUT_SECS must be at least 1 second".into()));
        }
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!("WEBHOOK_URL is not an http(s) URL: {url}")));
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn redeemer_settings(&self) -> RedeemerSettings {
        RedeemerSettings {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}
