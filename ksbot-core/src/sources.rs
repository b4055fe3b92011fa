// File: ksbot-core/src/sources.rs

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::Error;
use ksbot_common::models::Code;
use ksbot_common::traits::CodeSource;

/// Runs an external listing helper and reads one code per stdout line.
///
/// The listing URL is passed as the helper's last argument.
#[derive(Debug, Clone)]
pub struct CommandCodeSource {
    program: String,
    args: Vec<String>,
    target_url: String,
    timeout: Duration,
}

impl CommandCodeSource {
    pub fn new(argv: Vec<String>, target_url: impl Into<String>) -> Result<Self, Error> {
        let mut iter = argv.into_iter();
        let program = iter
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("source command is empty".into()))?;
        Ok(Self {
            program,
            args: iter.collect(),
            target_url: target_url.into(),
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CodeSource for CommandCodeSource {
    async fn fetch_codes(&self) -> Result<Vec<Code>, Error> {
        let output = timeout(
            self.timeout,
            Command::new(&self.program)
                .args(&self.args)
                .arg(&self.target_url)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await??;

        if !output.status.success() {
            return Err(Error::Driver(format!(
                "code source '{}' exited with {}",
                self.program, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let codes = extract_codes(&stdout);
        debug!("Code source listed {} codes", codes.len());
        Ok(codes)
    }
}

/// Used when no listing helper is configured: nothing is ever discovered.
#[derive(Debug, Clone, Default)]
pub struct NullCodeSource;

#[async_trait]
impl CodeSource for NullCodeSource {
    async fn fetch_codes(&self) -> Result<Vec<Code>, Error> {
        warn!("No SOURCE_COMMAND configured => skipping code discovery");
        Ok(Vec::new())
    }
}

/// Gift codes are 4–20 alphanumeric characters; the bare word "active"
/// shows up in listings as a label and is not a code.
pub fn is_plausible_code(s: &str) -> bool {
    (4..=20).contains(&s.chars().count())
        && s.chars().all(char::is_alphanumeric)
        && !s.eq_ignore_ascii_case("active")
}

/// Plausible codes from `text`, one candidate per line, first occurrence wins.
pub fn extract_codes(text: &str) -> Vec<Code> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| is_plausible_code(line))
        .filter(|line| seen.insert(line.to_string()))
        .map(Code::from)
        .collect()
}
