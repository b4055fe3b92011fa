// File: ksbot-core/src/notify/discord.rs

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::Error;
use crate::http::{DefaultHttpClient, HttpClient};
use crate::notify::settled_message;
use ksbot_common::models::Code;
use ksbot_common::traits::Notifier;

/// Posts settlement announcements to a Discord channel webhook.
pub struct DiscordWebhookNotifier {
    webhook_url: String,
    http: Arc<dyn HttpClient>,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self::with_client(webhook_url, Arc::new(DefaultHttpClient::new()))
    }

    pub fn with_client(webhook_url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http,
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhookNotifier {
    async fn notify_settled(&self, codes: &[Code]) -> Result<(), Error> {
        if codes.is_empty() {
            debug!("Nothing newly settled => no Discord message");
            return Ok(());
        }
        let message = settled_message(codes);
        let status = self
            .http
            .post_json(&self.webhook_url, &json!({ "content": message }))
            .await?;
        if !(200..300).contains(&status) {
            return Err(Error::Notify(format!("Discord webhook returned HTTP {status}")));
        }
        info!("Sent Discord notification: {}", message);
        Ok(())
    }
}
