// File: ksbot-core/src/drivers/mod.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;
use ksbot_common::traits::{SessionDriver, SessionEngine};

pub mod line;

pub use line::LineSessionDriver;

/// Stand-in used when no helper command is configured; every launch fails,
/// which aborts the run as "engine unavailable".
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredDriver;

#[async_trait]
impl SessionDriver for UnconfiguredDriver {
    async fn launch(&self) -> Result<Box<dyn SessionEngine>, Error> {
        Err(Error::EngineUnavailable(
            "no DRIVER_COMMAND configured in config.json".into(),
        ))
    }
}

/// Picks the line-protocol helper when `argv` is non-empty.
pub fn driver_from_command(argv: &[String]) -> Arc<dyn SessionDriver> {
    match LineSessionDriver::new(argv.to_vec()) {
        Ok(driver) => Arc::new(driver),
        Err(_) => Arc::new(UnconfiguredDriver),
    }
}
