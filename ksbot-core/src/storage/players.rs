// File: ksbot-core/src/storage/players.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::Error;
use crate::storage::{append_line, read_optional, validate_field};
use ksbot_common::models::PlayerId;
use ksbot_common::traits::PlayerSource;

/// Player list kept as a one-column CSV; row order is redemption order.
#[derive(Debug, Clone)]
pub struct CsvPlayerSource {
    path: PathBuf,
}

impl CsvPlayerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a player. Returns `Ok(false)` for blanks and duplicates.
    pub async fn add_player(&self, player_id: &str) -> Result<bool, Error> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            warn!("Refusing to add an empty player id");
            return Ok(false);
        }
        validate_field("player id", player_id)?;

        let existing = self.load_players().await?;
        if existing.iter().any(|p| p.as_str() == player_id) {
            warn!("Duplicate: Player ID {} already exists.", player_id);
            return Ok(false);
        }

        append_line(&self.path, None, player_id).await?;
        info!("Added Player ID: {}", player_id);
        Ok(true)
    }
}

#[async_trait]
impl PlayerSource for CsvPlayerSource {
    async fn load_players(&self) -> Result<Vec<PlayerId>, Error> {
        let Some(text) = read_optional(&self.path).await? else {
            return Ok(Vec::new());
        };
        Ok(text
            .lines()
            .filter_map(|line| line.split(',').next())
            .map(|first| first.trim().trim_matches('"').trim())
            .filter(|id| !id.is_empty())
            .map(PlayerId::from)
            .collect())
    }
}
