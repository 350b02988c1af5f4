use std::any::Any;
use async_trait::async_trait;
use crate::error::Error;

/// A database transaction owned by exactly one command invocation.
#[async_trait]
pub trait CommandTransaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), Error>;
    async fn rollback(self: Box<Self>) -> Result<(), Error>;

    /// Lets a command body reach the concrete transaction type it expects.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CommandTransaction>, Error>;
}
