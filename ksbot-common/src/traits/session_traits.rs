use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Code, PlayerId};

/// Factory for the automation engine that talks to the redemption form.
///
/// One engine is launched per run and driven strictly sequentially.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Starts the engine. An error here is fatal to the whole run.
    async fn launch(&self) -> Result<Box<dyn SessionEngine>, Error>;
}

/// A running engine holding at most one authenticated player session.
#[async_trait]
pub trait SessionEngine: Send {
    /// Logs `player` in, replacing any previous session.
    async fn open_session(&mut self, player: &PlayerId) -> Result<(), Error>;

    /// Submits one code in the current session and returns the raw response text.
    async fn submit(&mut self, code: &Code) -> Result<String, Error>;

    /// Closes any confirmation prompt left over from the last submission.
    async fn dismiss_prompt(&mut self) -> Result<(), Error>;

    /// Shuts the engine down.
    async fn close(&mut self) -> Result<(), Error>;
}
