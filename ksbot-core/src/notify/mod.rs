// File: ksbot-core/src/notify/mod.rs

use async_trait::async_trait;
use tracing::info;

use crate::Error;
use ksbot_common::models::Code;
use ksbot_common::traits::Notifier;

pub mod discord;

pub use discord::DiscordWebhookNotifier;

/// Human-readable announcement for a batch of fully settled codes.
pub fn settled_message(codes: &[Code]) -> String {
    let joined = codes.iter().map(Code::as_str).collect::<Vec<_>>().join(", ");
    format!("{joined} Gift Code(s) redeemed successfully for the list.")
}

/// Fallback when no webhook is configured: the announcement only goes to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_settled(&self, codes: &[Code]) -> Result<(), Error> {
        if !codes.is_empty() {
            info!("{}", settled_message(codes));
        }
        Ok(())
    }
}
