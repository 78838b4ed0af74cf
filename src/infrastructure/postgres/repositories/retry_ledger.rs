use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into};
use uuid::Uuid;

use crate::{
    domain::{
        entities::retry_ledger::NewRetryLedgerEntity,
        repositories::retry_ledger::RetryLedgerRepository,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::retry_ledger},
};

pub struct RetryLedgerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl RetryLedgerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RetryLedgerRepository for RetryLedgerPostgres {
    async fn record(&self, entry: NewRetryLedgerEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let id = insert_into(retry_ledger::table)
            .values(&entry)
            .returning(retry_ledger::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(id)
    }
}
