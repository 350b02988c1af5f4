// File: relaybot-core/src/repositories/postgres/transactions.rs

use std::any::Any;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};
use relaybot_common::error::Error;
use relaybot_common::traits::transaction_traits::{CommandTransaction, TransactionProvider};

/// A Postgres transaction handed to a `rollback` command. Command bodies get
/// at it through [`CommandTransaction::as_any_mut`].
pub struct PgCommandTransaction {
    pub tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CommandTransaction for PgCommandTransaction {
    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        self.tx.rollback().await?;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct PgTransactionProvider {
    pub pool: Pool<Postgres>,
}

impl PgTransactionProvider {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionProvider for PgTransactionProvider {
    async fn begin(&self) -> Result<Box<dyn CommandTransaction>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCommandTransaction { tx }))
    }
}
