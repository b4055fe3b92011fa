// ================================================================
// File: ksbot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// A durable artifact exists but could not be read at all.
    #[error("Storage unreadable ({path}): {reason}")]
    StorageUnreadable { path: String, reason: String },

    /// A durable write (append, rewrite, fsync) failed.
    #[error("Storage write failed ({path}): {source}")]
    StorageWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The automation engine behind the session driver could not be started.
    #[error("Automation engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A driver step did not answer in time; the engine can no longer be
    /// trusted to pair replies with requests and must be relaunched.
    #[error("Session engine stalled: {0}")]
    EngineStalled(String),

    #[error("Could not open session for player '{player}': {reason}")]
    SessionOpen { player: String, reason: String },

    #[error("Session driver error: {0}")]
    Driver(String),

    /// Refusal to write a new record for a pair that is already settled-positive.
    #[error("Pair already settled: player='{player}', code='{code}'")]
    AlreadySettled { player: String, code: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notify(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
