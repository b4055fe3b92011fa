// File: ksbot-common/src/models/outcome.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Classified result of one (player, code) submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Successful,
    AlreadyClaimed,
    Expired,
    Invalid,
    Unknown,
}

impl Outcome {
    /// The pair never needs another attempt.
    pub fn is_settled_positive(self) -> bool {
        matches!(self, Outcome::Successful | Outcome::AlreadyClaimed)
    }

    /// The code is dead for everyone and gets pruned from the ledger.
    pub fn is_settled_negative(self) -> bool {
        matches!(self, Outcome::Expired | Outcome::Invalid)
    }

    /// Status text as written to the results log.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Successful => "Successful",
            Outcome::AlreadyClaimed => "Already claimed",
            Outcome::Expired => "Expired",
            Outcome::Invalid => "Invalid",
            Outcome::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "successful" => Ok(Outcome::Successful),
            "already claimed" | "alreadyclaimed" => Ok(Outcome::AlreadyClaimed),
            "expired" => Ok(Outcome::Expired),
            "invalid" => Ok(Outcome::Invalid),
            "unknown" => Ok(Outcome::Unknown),
            other => Err(Error::Parse(format!("Unrecognized outcome: {other}"))),
        }
    }
}
