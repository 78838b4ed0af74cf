use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::retry_ledger::NewRetryLedgerEntity;

#[automock]
#[async_trait]
pub trait RetryLedgerRepository {
    /// Append-only; callers log and continue if even this fails, the
    /// webhook acknowledgment must never wait on it.
    async fn record(&self, entry: NewRetryLedgerEntity) -> Result<Uuid>;
}
