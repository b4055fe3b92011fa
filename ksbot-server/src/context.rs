//! ksbot-server/src/context.rs
//!
//! Everything the subcommands share, built once from the data directory and
//! its `config.json`.

use std::sync::Arc;

use tracing::{info, warn};

use ksbot_common::traits::{CodeSource, Notifier};
use ksbot_core::drivers::driver_from_command;
use ksbot_core::notify::{DiscordWebhookNotifier, LogNotifier};
use ksbot_core::sources::{CommandCodeSource, NullCodeSource};
use ksbot_core::tasks::AutoCheckTask;
use ksbot_core::{BotConfig, CsvPlayerSource, Error, OutcomeClassifier, Redeemer, StoragePaths};

pub struct BotContext {
    pub paths: StoragePaths,
    pub config: BotConfig,
    pub players: Arc<CsvPlayerSource>,
    pub auto_check: AutoCheckTask,
}

impl BotContext {
    pub async fn new(paths: StoragePaths) -> Result<Self, Error> {
        let mut config = BotConfig::load(&paths.config).await;
        config.apply_env();
        config.validate()?;

        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => {
                info!("Discord notifications enabled.");
                Arc::new(DiscordWebhookNotifier::new(url.clone()))
            }
            None => {
                warn!("No WEBHOOK_URL configured => notifications go to the log only");
                Arc::new(LogNotifier)
            }
        };

        let source: Arc<dyn CodeSource> = if config.source_command.is_empty() {
            Arc::new(NullCodeSource)
        } else {
            Arc::new(CommandCodeSource::new(
                config.source_command.clone(),
                config.target_url.clone(),
            )?)
        };

        let players = Arc::new(CsvPlayerSource::new(&paths.players));
        let redeemer = Arc::new(
            Redeemer::new(
                paths.clone(),
                players.clone(),
                driver_from_command(&config.driver_command),
                notifier,
            )
            .with_classifier(OutcomeClassifier::with_rules(config.outcome_phrases.clone()))
            .with_settings(config.redeemer_settings()),
        );
        let auto_check = AutoCheckTask::new(redeemer, source);

        Ok(Self {
            paths,
            config,
            players,
            auto_check,
        })
    }
}
