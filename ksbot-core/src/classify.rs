// File: ksbot-core/src/classify.rs

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;
use ksbot_common::models::Outcome;

/// One "response contains this phrase => outcome" rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRule {
    pub phrase: String,
    pub outcome: Outcome,
}

impl OutcomeRule {
    pub fn new(phrase: &str, outcome: Outcome) -> Self {
        Self {
            phrase: phrase.to_lowercase(),
            outcome,
        }
    }
}

/// Ordered substring table mapping raw response text to an [`Outcome`].
///
/// First matching rule wins; the match is case-insensitive containment and
/// anything unmatched is `Unknown`.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    rules: Vec<OutcomeRule>,
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                OutcomeRule::new("redeemed", Outcome::Successful),
                OutcomeRule::new("already claimed", Outcome::AlreadyClaimed),
                OutcomeRule::new("expired", Outcome::Expired),
                OutcomeRule::new("not found", Outcome::Invalid),
                OutcomeRule::new("claim limit", Outcome::Invalid),
            ],
        }
    }
}

impl OutcomeClassifier {
    /// Built-in table with `extra` rules consulted first.
    pub fn with_rules(extra: impl IntoIterator<Item = OutcomeRule>) -> Self {
        let mut rules: Vec<OutcomeRule> = extra
            .into_iter()
            .filter(|r| !r.phrase.trim().is_empty())
            .map(|r| OutcomeRule::new(&r.phrase, r.outcome))
            .collect();
        rules.extend(Self::default().rules);
        Self { rules }
    }

    pub fn rules(&self) -> &[OutcomeRule] {
        &self.rules
    }

    pub fn classify(&self, raw: &str) -> Outcome {
        let lowered = raw.to_lowercase();
        self.rules
            .iter()
            .find(|rule| lowered.contains(&rule.phrase))
            .map(|rule| rule.outcome)
            .unwrap_or(Outcome::Unknown)
    }

    /// Like [`classify`](Self::classify), but a failed or timed-out read of
    /// the response is `Unknown` too.
    pub fn classify_response(&self, response: Result<String, Error>) -> Outcome {
        match response {
            Ok(text) => self.classify(&text),
            Err(e) => {
                debug!("No readable response ({e}) => Unknown");
                Outcome::Unknown
            }
        }
    }
}
