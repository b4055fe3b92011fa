use async_trait::async_trait;

use crate::error::Error;
use crate::models::Code;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Receives the codes that became settled for every player during a run.
    /// The list may be empty.
    async fn notify_settled(&self, codes: &[Code]) -> Result<(), Error>;
}
