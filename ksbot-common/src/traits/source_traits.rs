use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Code, PlayerId};

/// Ordered list of players to redeem for, loaded once per run.
#[async_trait]
pub trait PlayerSource: Send + Sync {
    async fn load_players(&self) -> Result<Vec<PlayerId>, Error>;
}

/// Where newly published gift codes come from.
#[async_trait]
pub trait CodeSource: Send + Sync {
    /// Returns the currently active codes in listing order.
    async fn fetch_codes(&self) -> Result<Vec<Code>, Error>;
}
